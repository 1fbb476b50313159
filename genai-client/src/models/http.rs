use crate::client::ClientInner;
use crate::error::{Error, Result};
use genai_client_types::models::ListModelsConfig;

/// 规范化模型资源名：`m1` → `models/m1`；`models/`、`tunedModels/` 前缀保持不变。
pub(crate) fn model_resource_name(model: &str) -> Result<String> {
    let model = model.trim();
    if model.is_empty() || model == "models/" {
        return Err(Error::Validation {
            message: "model name must not be empty".into(),
        });
    }
    if model.starts_with("models/") || model.starts_with("tunedModels/") {
        Ok(model.to_string())
    } else {
        Ok(format!("models/{model}"))
    }
}

pub(super) fn build_model_method_url(
    inner: &ClientInner,
    model: &str,
    method: &str,
) -> Result<String> {
    let model = model_resource_name(model)?;
    Ok(inner.url(&format!("{model}:{method}")))
}

pub(super) fn build_model_get_url(inner: &ClientInner, model: &str) -> Result<String> {
    let model = model_resource_name(model)?;
    Ok(inner.url(&model))
}

pub(super) fn build_models_list_url(inner: &ClientInner, config: &ListModelsConfig) -> Result<String> {
    let mut url = reqwest::Url::parse(&inner.url("models")).map_err(|err| Error::InvalidConfig {
        message: err.to_string(),
    })?;
    {
        let mut pairs = url.query_pairs_mut();
        if let Some(page_size) = config.page_size {
            pairs.append_pair("pageSize", &page_size.to_string());
        }
        if let Some(page_token) = &config.page_token {
            pairs.append_pair("pageToken", page_token);
        }
    }
    Ok(url.to_string())
}
