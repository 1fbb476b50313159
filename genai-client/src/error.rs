//! Error definitions for the client.

use genai_client_types::content::FunctionCall;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("HTTP client error: {source}")]
    HttpClient {
        #[from]
        source: reqwest::Error,
    },

    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("{resource} not found: {message}")]
    NotFound { resource: String, message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("File {name} failed processing: {message}")]
    ProcessingFailed { name: String, message: String },

    #[error("Response does not match schema: {message}")]
    SchemaMismatch { message: String },

    /// 模型请求调用函数；调用方需执行后回传 `FunctionResponse`。
    #[error("Model requested {} function call(s)", calls.len())]
    FunctionCallPending { calls: Vec<FunctionCall> },

    #[error("Stream ended without a terminal marker: {message}")]
    IncompleteStream { message: String },

    #[error("Timeout: {message}")]
    Timeout { message: String },

    #[error("Cancelled: {message}")]
    Cancelled { message: String },

    #[error("Parse error: {message}")]
    Parse { message: String },

    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },

    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl Error {
    /// 传输层错误或可重试状态码（408/429/5xx）。
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::HttpClient { source } => !source.is_builder() && !source.is_decode(),
            Self::ApiError { status, .. } => {
                matches!(status, 408 | 429) || (500..600).contains(status)
            }
            _ => false,
        }
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// 函数调用挂起不是失败，而是等待调用方回传结果。
    #[must_use]
    pub fn pending_calls(&self) -> Option<&[FunctionCall]> {
        match self {
            Self::FunctionCallPending { calls } => Some(calls),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
