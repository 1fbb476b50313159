//! Caches API surface.
//!
//! A cached content pins a prefix of contents (plus optional system
//! instruction and tools) to one model so later generation calls can refer to
//! it by name.

use std::sync::Arc;

use genai_client_types::caches::{
    CachedContent, CreateCachedContentConfig, ListCachedContentsConfig, ListCachedContentsResponse,
    UpdateCachedContentConfig,
};
use serde_json::Value;
use tracing::debug;

use crate::client::ClientInner;
use crate::error::{Error, Result};
use crate::http_response::ensure_success;
use crate::models::model_resource_name;
use crate::retry::send_idempotent;

#[derive(Clone)]
pub struct Caches {
    pub(crate) inner: Arc<ClientInner>,
}

impl Caches {
    pub(crate) fn new(inner: Arc<ClientInner>) -> Self {
        Self { inner }
    }

    /// 创建缓存。`ttl` 与 `expire_time` 不能同时设置。
    pub async fn create(
        &self,
        model: impl Into<String>,
        config: CreateCachedContentConfig,
    ) -> Result<CachedContent> {
        if config.ttl.is_some() && config.expire_time.is_some() {
            return Err(Error::Validation {
                message: "ttl and expire_time are mutually exclusive".into(),
            });
        }
        let model = model_resource_name(&model.into())?;

        let mut body = serde_json::to_value(&config)?;
        let body_map = body.as_object_mut().ok_or_else(|| Error::Parse {
            message: "CreateCachedContentConfig must be object".into(),
        })?;
        body_map.insert("model".to_string(), Value::String(model));

        let url = build_cached_contents_url(&self.inner);
        let request = self.inner.http.post(url).json(&body);
        let response = self.inner.send(request).await?;
        let response = ensure_success(response, "cachedContents").await?;
        let cached = response.json::<CachedContent>().await?;
        debug!(name = ?cached.name, model = ?cached.model, "cached content created");
        Ok(cached)
    }

    /// 获取缓存。缓存不存在或已过期时返回 [`Error::NotFound`]。
    pub async fn get(&self, name: impl AsRef<str>) -> Result<CachedContent> {
        let name = normalize_cached_content_name(name.as_ref())?;
        let url = build_cached_content_url(&self.inner, &name);
        let request = self.inner.http.get(url);
        let response = send_idempotent(&self.inner, request, &name).await?;
        Ok(response.json::<CachedContent>().await?)
    }

    /// 更新缓存过期策略。`ttl` 与 `expire_time` 必须且只能设置一个。
    pub async fn update(
        &self,
        name: impl AsRef<str>,
        config: UpdateCachedContentConfig,
    ) -> Result<CachedContent> {
        let update_mask = match (&config.ttl, &config.expire_time) {
            (Some(_), None) => "ttl",
            (None, Some(_)) => "expireTime",
            (Some(_), Some(_)) => {
                return Err(Error::Validation {
                    message: "set either ttl or expire_time, not both".into(),
                })
            }
            (None, None) => {
                return Err(Error::Validation {
                    message: "one of ttl or expire_time is required".into(),
                })
            }
        };
        let name = normalize_cached_content_name(name.as_ref())?;
        let mut url = reqwest::Url::parse(&build_cached_content_url(&self.inner, &name))
            .map_err(|err| Error::InvalidConfig {
                message: err.to_string(),
            })?;
        url.query_pairs_mut().append_pair("updateMask", update_mask);

        let request = self.inner.http.patch(url).json(&config);
        let response = self.inner.send(request).await?;
        let response = ensure_success(response, &name).await?;
        Ok(response.json::<CachedContent>().await?)
    }

    /// 删除缓存。不重试。
    pub async fn delete(&self, name: impl AsRef<str>) -> Result<()> {
        let name = normalize_cached_content_name(name.as_ref())?;
        let url = build_cached_content_url(&self.inner, &name);
        let request = self.inner.http.delete(url);
        let response = self.inner.send(request).await?;
        ensure_success(response, &name).await?;
        debug!(name = %name, "cached content deleted");
        Ok(())
    }

    /// 列出缓存。顺序由服务端决定。
    pub async fn list(&self) -> Result<ListCachedContentsResponse> {
        self.list_with_config(ListCachedContentsConfig::default())
            .await
    }

    /// 列出缓存（带配置）。
    pub async fn list_with_config(
        &self,
        config: ListCachedContentsConfig,
    ) -> Result<ListCachedContentsResponse> {
        let url = add_list_query_params(build_cached_contents_url(&self.inner), &config)?;
        let request = self.inner.http.get(url);
        let response = send_idempotent(&self.inner, request, "cachedContents").await?;
        Ok(response.json::<ListCachedContentsResponse>().await?)
    }

    /// 列出所有缓存（自动翻页）。
    pub async fn all(&self) -> Result<Vec<CachedContent>> {
        self.all_with_config(ListCachedContentsConfig::default())
            .await
    }

    /// 列出所有缓存（带配置，自动翻页）。
    pub async fn all_with_config(
        &self,
        mut config: ListCachedContentsConfig,
    ) -> Result<Vec<CachedContent>> {
        let mut contents = Vec::new();
        loop {
            let response = self.list_with_config(config.clone()).await?;
            if let Some(items) = response.cached_contents {
                contents.extend(items);
            }
            match response.next_page_token {
                Some(token) if !token.is_empty() => {
                    config.page_token = Some(token);
                }
                _ => break,
            }
        }
        Ok(contents)
    }
}

pub(crate) fn normalize_cached_content_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() || name == "cachedContents/" {
        return Err(Error::Validation {
            message: "cached content name must not be empty".into(),
        });
    }
    if name.starts_with("cachedContents/") {
        Ok(name.to_string())
    } else {
        Ok(format!("cachedContents/{name}"))
    }
}

fn build_cached_contents_url(inner: &ClientInner) -> String {
    inner.url("cachedContents")
}

fn build_cached_content_url(inner: &ClientInner, name: &str) -> String {
    inner.url(name)
}

fn add_list_query_params(url: String, config: &ListCachedContentsConfig) -> Result<String> {
    let mut url = reqwest::Url::parse(&url).map_err(|err| Error::InvalidConfig {
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
