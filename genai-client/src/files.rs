//! Files API surface.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use genai_client_types::content::Part;
use genai_client_types::enums::FileState;
use genai_client_types::files::{File, ListFilesConfig, ListFilesResponse, UploadFileConfig};
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::client::ClientInner;
use crate::error::{Error, Result};
use crate::http_response::ensure_success;
use crate::retry::send_idempotent;
use crate::upload::{upload_chunks, ChunkOutcome, CHUNK_SIZE};

#[derive(Clone)]
pub struct Files {
    pub(crate) inner: Arc<ClientInner>,
}

impl Files {
    pub(crate) fn new(inner: Arc<ClientInner>) -> Self {
        Self { inner }
    }

    /// 上传文件（直接上传字节数据）。返回的文件可能仍处于 PROCESSING。
    pub async fn upload(&self, data: Vec<u8>, mime_type: impl Into<String>) -> Result<File> {
        let config = UploadFileConfig {
            mime_type: Some(mime_type.into()),
            ..UploadFileConfig::default()
        };
        self.upload_with_config(data, config).await
    }

    /// 上传文件（自定义配置）。
    pub async fn upload_with_config(
        &self,
        data: Vec<u8>,
        config: UploadFileConfig,
    ) -> Result<File> {
        let mime_type = config
            .mime_type
            .clone()
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| Error::Validation {
                message: "mime_type is required when uploading raw bytes".into(),
            })?;
        let size_bytes = data.len() as u64;
        let file = build_upload_file(config, size_bytes, &mime_type);
        let upload_url = self
            .start_resumable_upload(&file, size_bytes, &mime_type, None)
            .await?;
        let mut reader = data.as_slice();
        self.upload_from_reader(&upload_url, &mut reader, size_bytes)
            .await
    }

    /// 从文件路径上传，MIME 类型按扩展名推断。
    pub async fn upload_from_path(&self, path: impl AsRef<Path>) -> Result<File> {
        self.upload_from_path_with_config(path, UploadFileConfig::default())
            .await
    }

    /// 从文件路径上传（自定义配置）。
    pub async fn upload_from_path_with_config(
        &self,
        path: impl AsRef<Path>,
        mut config: UploadFileConfig,
    ) -> Result<File> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(Error::Validation {
                message: format!("{} is not a valid file path", path.display()),
            });
        }

        let size_bytes = metadata.len();
        let mime_type = match config.mime_type.take() {
            Some(value) => value,
            None => mime_guess::from_path(path)
                .first_or_octet_stream()
                .essence_str()
                .to_string(),
        };

        let file_name = path.file_name().and_then(|name| name.to_str());
        let file = build_upload_file(config, size_bytes, &mime_type);
        let upload_url = self
            .start_resumable_upload(&file, size_bytes, &mime_type, file_name)
            .await?;
        let mut handle = tokio::fs::File::open(path).await?;
        self.upload_from_reader(&upload_url, &mut handle, size_bytes)
            .await
    }

    /// 下载文件（返回字节内容）。
    pub async fn download(&self, name_or_uri: impl AsRef<str>) -> Result<Vec<u8>> {
        let file_name = normalize_file_name(name_or_uri.as_ref())?;
        let url = build_file_download_url(&self.inner, &file_name);
        let request = self.inner.http.get(url);
        let response =
            send_idempotent(&self.inner, request, &format!("files/{file_name}")).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// 列出文件。
    pub async fn list(&self) -> Result<ListFilesResponse> {
        self.list_with_config(ListFilesConfig::default()).await
    }

    /// 列出文件（自定义配置）。
    pub async fn list_with_config(&self, config: ListFilesConfig) -> Result<ListFilesResponse> {
        let url = build_files_list_url(&self.inner, &config)?;
        let request = self.inner.http.get(url);
        let response = send_idempotent(&self.inner, request, "files").await?;
        Ok(response.json::<ListFilesResponse>().await?)
    }

    /// 列出所有文件（自动翻页）。
    pub async fn all(&self) -> Result<Vec<File>> {
        self.all_with_config(ListFilesConfig::default()).await
    }

    /// 列出所有文件（带配置，自动翻页）。
    pub async fn all_with_config(&self, mut config: ListFilesConfig) -> Result<Vec<File>> {
        let mut files = Vec::new();
        loop {
            let response = self.list_with_config(config.clone()).await?;
            if let Some(items) = response.files {
                files.extend(items);
            }
            match response.next_page_token {
                Some(token) if !token.is_empty() => {
                    config.page_token = Some(token);
                }
                _ => break,
            }
        }
        Ok(files)
    }

    /// 获取文件元数据（状态轮询）。幂等，会按重试策略重试。
    pub async fn get(&self, name_or_uri: impl AsRef<str>) -> Result<File> {
        let file_name = normalize_file_name(name_or_uri.as_ref())?;
        let url = build_file_url(&self.inner, &file_name);
        let request = self.inner.http.get(url);
        let response =
            send_idempotent(&self.inner, request, &format!("files/{file_name}")).await?;
        Ok(response.json::<File>().await?)
    }

    /// 删除文件。不重试。
    pub async fn delete(&self, name_or_uri: impl AsRef<str>) -> Result<()> {
        let file_name = normalize_file_name(name_or_uri.as_ref())?;
        let url = build_file_url(&self.inner, &file_name);
        let request = self.inner.http.delete(url);
        let response = self.inner.send(request).await?;
        ensure_success(response, &format!("files/{file_name}")).await?;
        Ok(())
    }

    /// 以固定间隔轮询，直到文件变为 ACTIVE。
    ///
    /// FAILED 返回 [`Error::ProcessingFailed`]；超过 `timeout` 返回
    /// [`Error::Timeout`]；`cancellation` 被触发时返回 [`Error::Cancelled`]。
    pub async fn wait_for_active(
        &self,
        name_or_uri: impl AsRef<str>,
        config: WaitForFileConfig,
    ) -> Result<File> {
        let file_name = normalize_file_name(name_or_uri.as_ref())?;
        let deadline = config.timeout.map(|timeout| Instant::now() + timeout);
        let cancellation = config.cancellation.as_ref();
        let mut polls: u32 = 0;

        loop {
            if cancellation.is_some_and(CancellationToken::is_cancelled) {
                return Err(cancelled(&file_name));
            }

            // 单次查询（含重试退避）同样受截止时间与取消约束。
            let file = bounded(&file_name, polls, deadline, cancellation, self.get(&file_name))
                .await?;
            polls += 1;
            debug!(file = %file_name, state = ?file.state, polls, "polled file state");
            match file.state {
                Some(FileState::Failed) => {
                    return Err(Error::ProcessingFailed {
                        name: format!("files/{file_name}"),
                        message: file
                            .error_message()
                            .unwrap_or("file processing failed")
                            .to_string(),
                    });
                }
                Some(state) if state.is_terminal() => return Ok(file),
                _ => {}
            }

            let wait = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(timed_out(&file_name, polls));
                    }
                    config.poll_interval.min(remaining)
                }
                None => config.poll_interval,
            };

            match cancellation {
                Some(token) => {
                    tokio::select! {
                        () = token.cancelled() => return Err(cancelled(&file_name)),
                        () = tokio::time::sleep(wait) => {}
                    }
                }
                None => tokio::time::sleep(wait).await,
            }
        }
    }

    async fn start_resumable_upload(
        &self,
        file: &File,
        size_bytes: u64,
        mime_type: &str,
        file_name: Option<&str>,
    ) -> Result<String> {
        let url = build_files_upload_url(&self.inner);
        let mut request = self
            .inner
            .http
            .post(url)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header(
                "X-Goog-Upload-Header-Content-Length",
                size_bytes.to_string(),
            )
            .header("X-Goog-Upload-Header-Content-Type", mime_type);

        if let Some(file_name) = file_name {
            request = request.header("X-Goog-Upload-File-Name", file_name);
        }

        let body = serde_json::json!({ "file": file });
        let response = self.inner.send(request.json(&body)).await?;
        let response = ensure_success(response, "files").await?;

        let upload_url = response
            .headers()
            .get("x-goog-upload-url")
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| Error::Parse {
                message: "Missing x-goog-upload-url header".into(),
            })?;

        Ok(upload_url.to_string())
    }

    async fn upload_from_reader<R>(
        &self,
        upload_url: &str,
        reader: &mut R,
        total_size: u64,
    ) -> Result<File>
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        let files = self;
        let file = upload_chunks(reader, total_size, CHUNK_SIZE, move |chunk, offset, finalize| {
            files.send_upload_chunk(upload_url, chunk, offset, finalize)
        })
        .await?;
        debug!(file = ?file.name, state = ?file.state, "upload finished");
        Ok(file)
    }

    async fn send_upload_chunk(
        &self,
        upload_url: &str,
        chunk: Vec<u8>,
        offset: u64,
        finalize: bool,
    ) -> Result<ChunkOutcome<File>> {
        let command = if finalize {
            "upload, finalize"
        } else {
            "upload"
        };
        let request = self
            .inner
            .http
            .post(upload_url)
            .header("X-Goog-Upload-Command", command)
            .header("X-Goog-Upload-Offset", offset.to_string())
            .header("Content-Length", chunk.len().to_string())
            .body(chunk);
        let response = self.inner.send(request).await?;
        let response = ensure_success(response, "files").await?;

        let upload_status = response
            .headers()
            .get("x-goog-upload-status")
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| Error::Parse {
                message: "Missing x-goog-upload-status header".into(),
            })?
            .to_string();

        let body = response.bytes().await?;
        if body.is_empty() {
            return Ok((upload_status, None));
        }

        let value: Value = serde_json::from_slice(&body)?;
        let file_value = value.get("file").cloned().unwrap_or(value);
        let file: File = serde_json::from_value(file_value)?;

        Ok((upload_status, Some(file)))
    }
}

/// 轮询配置。
#[derive(Debug, Clone)]
pub struct WaitForFileConfig {
    pub poll_interval: Duration,
    /// `None` 表示不设截止时间。
    pub timeout: Option<Duration>,
    pub cancellation: Option<CancellationToken>,
}

impl Default for WaitForFileConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            timeout: Some(Duration::from_secs(300)),
            cancellation: None,
        }
    }
}

impl WaitForFileConfig {
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

/// 从已上传文件构建 `fileData` part。
///
/// 文件缺少 `uri`/`mime_type`，或尚未处理完成（PROCESSING/FAILED）时返回
/// [`Error::Validation`]。
pub fn file_part(file: &File) -> Result<Part> {
    let name = file.name.as_deref().unwrap_or("<unnamed>");
    match file.state {
        Some(FileState::Processing) => {
            return Err(Error::Validation {
                message: format!("{name} is still PROCESSING; wait for ACTIVE first"),
            })
        }
        Some(FileState::Failed) => {
            return Err(Error::Validation {
                message: format!("{name} FAILED processing and cannot be referenced"),
            })
        }
        Some(FileState::Active | FileState::StateUnspecified) | None => {}
    }
    Part::from_file(file).ok_or_else(|| Error::Validation {
        message: format!("{name} has no uri or mime_type"),
    })
}

fn cancelled(file_name: &str) -> Error {
    Error::Cancelled {
        message: format!("wait for files/{file_name} cancelled"),
    }
}

fn timed_out(file_name: &str, polls: u32) -> Error {
    Error::Timeout {
        message: format!("files/{file_name} not ACTIVE after {polls} poll(s)"),
    }
}

/// 在截止时间与取消令牌约束下执行一次轮询请求。
async fn bounded<T>(
    file_name: &str,
    polls: u32,
    deadline: Option<Instant>,
    cancellation: Option<&CancellationToken>,
    work: impl Future<Output = Result<T>>,
) -> Result<T> {
    let timed = async {
        match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, work)
                .await
                .unwrap_or_else(|_| Err(timed_out(file_name, polls))),
            None => work.await,
        }
    };
    match cancellation {
        Some(token) => {
            tokio::select! {
                biased;
                () = token.cancelled() => Err(cancelled(file_name)),
                result = timed => result,
            }
        }
        None => timed.await,
    }
}

fn build_upload_file(config: UploadFileConfig, size_bytes: u64, mime_type: &str) -> File {
    File {
        name: config.name.as_deref().map(normalize_upload_name),
        display_name: config.display_name,
        mime_type: Some(mime_type.to_string()),
        size_bytes: Some(size_bytes.to_string()),
        ..File::default()
    }
}

fn normalize_upload_name(name: &str) -> String {
    if name.starts_with("files/") {
        name.to_string()
    } else {
        format!("files/{name}")
    }
}

fn normalize_file_name(value: &str) -> Result<String> {
    if value.starts_with("http://") || value.starts_with("https://") {
        let marker = "files/";
        let start = value.find(marker).ok_or_else(|| Error::Validation {
            message: format!("Could not find 'files/' in URI: {value}"),
        })?;
        let suffix = &value[start + marker.len()..];
        let name: String = suffix
            .chars()
            .take_while(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
            .collect();
        if name.is_empty() {
            return Err(Error::Validation {
                message: format!("Could not extract file name from URI: {value}"),
            });
        }
        Ok(name)
    } else if let Some(name) = value.strip_prefix("files/") {
        Ok(name.to_string())
    } else if value.is_empty() {
        Err(Error::Validation {
            message: "file name must not be empty".into(),
        })
    } else {
        Ok(value.to_string())
    }
}

fn build_files_upload_url(inner: &ClientInner) -> String {
    let base = &inner.api_client.base_url;
    let version = &inner.api_client.api_version;
    format!("{base}upload/{version}/files")
}

fn build_files_list_url(inner: &ClientInner, config: &ListFilesConfig) -> Result<String> {
    let mut url = reqwest::Url::parse(&inner.url("files")).map_err(|err| Error::InvalidConfig {
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

fn build_file_url(inner: &ClientInner, name: &str) -> String {
    inner.url(&format!("files/{name}"))
}

fn build_file_download_url(inner: &ClientInner, name: &str) -> String {
    inner.url(&format!("files/{name}:download?alt=media"))
}
