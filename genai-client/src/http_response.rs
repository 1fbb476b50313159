//! Mapping non-success HTTP responses onto [`Error`].

use reqwest::StatusCode;
use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// 成功响应原样返回；否则读取响应体并转换为错误。
pub(crate) async fn ensure_success(
    response: reqwest::Response,
    resource: &str,
) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    Err(error_from_response(response, resource).await)
}

pub(crate) async fn error_from_response(response: reqwest::Response, resource: &str) -> Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    error_from_parts(status, &body, resource)
}

pub(crate) fn error_from_parts(status: StatusCode, body: &str, resource: &str) -> Error {
    let message = extract_message(body);
    if status == StatusCode::NOT_FOUND {
        return Error::NotFound {
            resource: resource.to_string(),
            message,
        };
    }
    Error::ApiError {
        status: status.as_u16(),
        message,
    }
}

fn extract_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error.message)
        .unwrap_or_else(|| body.to_string())
}
