//! Models API surface: stateless generation, token counting and embeddings.

use std::pin::Pin;
use std::sync::Arc;

use futures_util::Stream;
use genai_client_types::content::Content;
use genai_client_types::models::{
    CountTokensConfig, CountTokensResponse, EmbedContentConfig, EmbedContentResponse,
    GenerateContentConfig, GenerateContentRequest, ListModelsConfig, ListModelsResponse, Model,
};
use genai_client_types::response::GenerateContentResponse;
use reqwest::StatusCode;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::client::ClientInner;
use crate::error::{Error, Result};
use crate::http_response::{ensure_success, error_from_parts};
use crate::retry::send_idempotent;
use crate::sse::parse_sse_stream;

mod http;
mod validation;

use http::{build_model_get_url, build_model_method_url, build_models_list_url};
pub(crate) use http::model_resource_name;
use validation::validate_generate_request;

/// 生成内容的流。
pub type GenerateContentStream =
    Pin<Box<dyn Stream<Item = Result<GenerateContentResponse>> + Send>>;

#[derive(Clone)]
pub struct Models {
    pub(crate) inner: Arc<ClientInner>,
}

impl Models {
    pub(crate) fn new(inner: Arc<ClientInner>) -> Self {
        Self { inner }
    }

    /// 生成内容（默认配置）。
    pub async fn generate_content(
        &self,
        model: impl Into<String>,
        contents: Vec<Content>,
    ) -> Result<GenerateContentResponse> {
        self.generate_content_with_config(model, contents, GenerateContentConfig::default())
            .await
    }

    /// 生成内容（自定义配置）。
    ///
    /// 引用的缓存不存在或已过期时返回 [`Error::NotFound`]。
    pub async fn generate_content_with_config(
        &self,
        model: impl Into<String>,
        contents: Vec<Content>,
        config: GenerateContentConfig,
    ) -> Result<GenerateContentResponse> {
        let model = model.into();
        validate_generate_request(&contents, &config)?;
        let cached_content = config.cached_content.clone();

        let url = build_model_method_url(&self.inner, &model, "generateContent")?;
        let request = GenerateContentRequest::new(contents, config);
        let request = self.inner.http.post(url).json(&request);
        let response = self.inner.send(request).await?;
        let response = ensure_generation_success(response, &model, cached_content.as_deref()).await?;
        Ok(response.json::<GenerateContentResponse>().await?)
    }

    /// 流式生成内容。只有收到结束标记的流才会正常结束，否则以
    /// [`Error::IncompleteStream`] 收尾。
    pub async fn generate_content_stream(
        &self,
        model: impl Into<String>,
        contents: Vec<Content>,
        config: GenerateContentConfig,
    ) -> Result<GenerateContentStream> {
        let model = model.into();
        validate_generate_request(&contents, &config)?;
        let cached_content = config.cached_content.clone();

        let mut url = build_model_method_url(&self.inner, &model, "streamGenerateContent")?;
        url.push_str("?alt=sse");

        let request = GenerateContentRequest::new(contents, config);
        let request = self.inner.http.post(url).json(&request);
        let response = self.inner.send(request).await?;
        let response = ensure_generation_success(response, &model, cached_content.as_deref()).await?;

        Ok(Box::pin(parse_sse_stream(response)))
    }

    /// 计数 tokens（默认配置）。
    pub async fn count_tokens(
        &self,
        model: impl Into<String>,
        contents: Vec<Content>,
    ) -> Result<CountTokensResponse> {
        self.count_tokens_with_config(model, contents, CountTokensConfig::default())
            .await
    }

    /// 计数 tokens（自定义配置）。带系统指令、工具或缓存时按完整生成请求计数。
    pub async fn count_tokens_with_config(
        &self,
        model: impl Into<String>,
        contents: Vec<Content>,
        config: CountTokensConfig,
    ) -> Result<CountTokensResponse> {
        let model = model_resource_name(&model.into())?;
        validation::validate_contents(&contents)?;
        let cached_content = config.cached_content.clone();

        let url = build_model_method_url(&self.inner, &model, "countTokens")?;
        let body = build_count_tokens_body(&model, contents, config)?;
        let request = self.inner.http.post(url).json(&body);
        let response = self.inner.send(request).await?;
        let response = ensure_generation_success(response, &model, cached_content.as_deref()).await?;
        Ok(response.json::<CountTokensResponse>().await?)
    }

    /// 生成嵌入向量（默认配置）。
    pub async fn embed_content(
        &self,
        model: impl Into<String>,
        contents: Vec<Content>,
    ) -> Result<EmbedContentResponse> {
        self.embed_content_with_config(model, contents, EmbedContentConfig::default())
            .await
    }

    /// 生成嵌入向量（自定义配置）。每段内容对应一个向量，顺序与输入一致。
    pub async fn embed_content_with_config(
        &self,
        model: impl Into<String>,
        contents: Vec<Content>,
        config: EmbedContentConfig,
    ) -> Result<EmbedContentResponse> {
        let model = model_resource_name(&model.into())?;
        validation::validate_contents(&contents)?;
        let expected = contents.len();

        let url = build_model_method_url(&self.inner, &model, "batchEmbedContents")?;
        let body = build_embed_body(&model, &contents, &config)?;
        let request = self.inner.http.post(url).json(&body);
        let response = self.inner.send(request).await?;
        let response = ensure_success(response, &model).await?;
        let result = response.json::<EmbedContentResponse>().await?;
        if result.embeddings.len() != expected {
            return Err(Error::Parse {
                message: format!(
                    "expected {expected} embedding(s), got {}",
                    result.embeddings.len()
                ),
            });
        }
        Ok(result)
    }

    /// 列出模型（基础列表）。
    pub async fn list(&self) -> Result<ListModelsResponse> {
        self.list_with_config(ListModelsConfig::default()).await
    }

    /// 列出模型（带配置）。
    pub async fn list_with_config(&self, config: ListModelsConfig) -> Result<ListModelsResponse> {
        let url = build_models_list_url(&self.inner, &config)?;
        let request = self.inner.http.get(url);
        let response = send_idempotent(&self.inner, request, "models").await?;
        Ok(response.json::<ListModelsResponse>().await?)
    }

    /// 列出所有模型（自动翻页）。
    pub async fn all(&self) -> Result<Vec<Model>> {
        self.all_with_config(ListModelsConfig::default()).await
    }

    /// 列出所有模型（带配置，自动翻页）。
    pub async fn all_with_config(&self, mut config: ListModelsConfig) -> Result<Vec<Model>> {
        let mut models = Vec::new();
        loop {
            let response = self.list_with_config(config.clone()).await?;
            if let Some(items) = response.models {
                models.extend(items);
            }
            match response.next_page_token {
                Some(token) if !token.is_empty() => {
                    config.page_token = Some(token);
                }
                _ => break,
            }
        }
        Ok(models)
    }

    /// 获取单个模型信息（包括输入/输出 token 上限）。
    pub async fn get(&self, model: impl Into<String>) -> Result<Model> {
        let model = model_resource_name(&model.into())?;
        let url = build_model_get_url(&self.inner, &model)?;
        let request = self.inner.http.get(url);
        let response = send_idempotent(&self.inner, request, &model).await?;
        Ok(response.json::<Model>().await?)
    }
}

/// 引用缓存的请求失败（403/404）且错误信息指向该缓存时，归因到缓存本身。
async fn ensure_generation_success(
    response: reqwest::Response,
    model: &str,
    cached_content: Option<&str>,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if let Some(cache) = cached_content {
        if matches!(status, StatusCode::NOT_FOUND | StatusCode::FORBIDDEN)
            && mentions_cache(&body, cache)
        {
            debug!(cache, status = status.as_u16(), "generation referenced a missing cache");
            return Err(error_from_parts(StatusCode::NOT_FOUND, &body, cache));
        }
    }
    Err(error_from_parts(status, &body, model))
}

fn mentions_cache(body: &str, cache: &str) -> bool {
    let body = body.to_ascii_lowercase();
    let id = cache.rsplit('/').next().unwrap_or(cache).to_ascii_lowercase();
    body.contains("cachedcontent") || (!id.is_empty() && body.contains(&id))
}

fn build_count_tokens_body(
    model: &str,
    contents: Vec<Content>,
    config: CountTokensConfig,
) -> Result<Value> {
    let CountTokensConfig {
        system_instruction,
        tools,
        cached_content,
    } = config;
    if system_instruction.is_none() && tools.is_none() && cached_content.is_none() {
        return Ok(json!({ "contents": contents }));
    }

    let mut request = serde_json::to_value(GenerateContentRequest::new(
        contents,
        GenerateContentConfig {
            system_instruction,
            tools,
            cached_content,
            ..GenerateContentConfig::default()
        },
    ))?;
    if let Value::Object(map) = &mut request {
        map.insert("model".to_string(), Value::String(model.to_string()));
    }
    Ok(json!({ "generateContentRequest": request }))
}

fn build_embed_body(
    model: &str,
    contents: &[Content],
    config: &EmbedContentConfig,
) -> Result<Value> {
    let mut requests: Vec<Value> = Vec::with_capacity(contents.len());
    for content in contents {
        let mut obj = Map::new();
        obj.insert("model".to_string(), Value::String(model.to_string()));
        obj.insert("content".to_string(), serde_json::to_value(content)?);
        if let Value::Object(extra) = serde_json::to_value(config)? {
            obj.extend(extra);
        }
        requests.push(Value::Object(obj));
    }
    Ok(json!({ "requests": requests }))
}
