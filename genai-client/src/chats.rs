//! Chats API surface.
//!
//! A [`ChatSession`] owns an ordered transcript. Exchanges on one session are
//! serialized by a turn lock held from request to transcript append; a
//! streaming exchange holds it until its stream is drained or dropped.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;

use genai_client_types::content::{Content, FunctionResponse, Part, Role};
use genai_client_types::models::GenerateContentConfig;
use genai_client_types::response::GenerateContentResponse;

use crate::client::ClientInner;
use crate::error::{Error, Result};
use crate::models::{GenerateContentStream, Models};

#[derive(Clone)]
pub struct Chats {
    pub(crate) inner: Arc<ClientInner>,
}

impl Chats {
    pub(crate) fn new(inner: Arc<ClientInner>) -> Self {
        Self { inner }
    }

    /// 创建新会话。
    pub fn create(&self, model: impl Into<String>) -> ChatSession {
        self.create_with_config(model, GenerateContentConfig::default())
    }

    /// 带配置创建会话。
    pub fn create_with_config(
        &self,
        model: impl Into<String>,
        config: GenerateContentConfig,
    ) -> ChatSession {
        self.create_with_history(model, Vec::new(), config)
    }

    /// 以已有历史创建会话。
    pub fn create_with_history(
        &self,
        model: impl Into<String>,
        history: Vec<Content>,
        config: GenerateContentConfig,
    ) -> ChatSession {
        ChatSession {
            client: self.inner.clone(),
            model: model.into(),
            config,
            history: Arc::new(RwLock::new(history)),
            turn_lock: Arc::new(Mutex::new(())),
        }
    }
}

/// Chat 会话。克隆出的句柄共享同一份历史与轮次锁。
#[derive(Clone)]
pub struct ChatSession {
    client: Arc<ClientInner>,
    model: String,
    config: GenerateContentConfig,
    history: Arc<RwLock<Vec<Content>>>,
    turn_lock: Arc<Mutex<()>>,
}

impl ChatSession {
    pub fn model(&self) -> &str {
        &self.model
    }

    /// 发送文本消息。
    pub async fn send_message(
        &self,
        message: impl Into<String>,
    ) -> Result<GenerateContentResponse> {
        self.send_parts(vec![Part::text(message)]).await
    }

    /// 发送任意 parts 组成的用户消息。
    ///
    /// 成功后追加 (用户轮, 模型轮)；失败时历史不变。
    pub async fn send_parts(&self, parts: Vec<Part>) -> Result<GenerateContentResponse> {
        let user = Content::from_parts(parts, Role::User);
        let _turn = self.turn_lock.lock().await;

        let contents = self.request_contents(&user).await;
        let response = Models::new(self.client.clone())
            .generate_content_with_config(&self.model, contents, self.config.clone())
            .await?;

        // MAX_TOKENS / SAFETY 可能返回没有 parts 的模型轮，不能写入历史。
        if let Some(content) = response.first_content().filter(|c| !c.parts.is_empty()) {
            append_exchange(&self.history, user, content.clone(), &self.model).await;
        }
        Ok(response)
    }

    /// 回传本地执行的函数结果。
    pub async fn send_function_responses(
        &self,
        responses: Vec<FunctionResponse>,
    ) -> Result<GenerateContentResponse> {
        if responses.is_empty() {
            return Err(Error::Validation {
                message: "at least one function response is required".into(),
            });
        }
        self.send_parts(responses.into_iter().map(Part::function_response).collect())
            .await
    }

    /// 流式发送文本消息。
    pub async fn send_message_stream(
        &self,
        message: impl Into<String>,
    ) -> Result<GenerateContentStream> {
        self.send_parts_stream(vec![Part::text(message)]).await
    }

    /// 流式发送消息。
    ///
    /// 只有流被完整读完且没有错误时才写入历史，模型轮取最后一个带内容的
    /// chunk。提前丢弃流或中途出错都不会改动历史。
    pub async fn send_parts_stream(&self, parts: Vec<Part>) -> Result<GenerateContentStream> {
        let user = Content::from_parts(parts, Role::User);
        let turn = self.turn_lock.clone().lock_owned().await;

        let contents = self.request_contents(&user).await;
        let stream = Models::new(self.client.clone())
            .generate_content_stream(&self.model, contents, self.config.clone())
            .await?;

        let state = TurnStream {
            stream,
            history: self.history.clone(),
            model: self.model.clone(),
            user: Some(user),
            last: None,
            done: false,
            _turn: turn,
        };
        Ok(Box::pin(futures_util::stream::unfold(state, TurnStream::advance)))
    }

    /// 获取历史快照。
    pub async fn history(&self) -> Vec<Content> {
        self.history.read().await.clone()
    }

    /// 清空历史。
    pub async fn clear_history(&self) {
        let _turn = self.turn_lock.lock().await;
        self.history.write().await.clear();
    }

    async fn request_contents(&self, user: &Content) -> Vec<Content> {
        let mut contents = self.history.read().await.clone();
        contents.push(user.clone());
        contents
    }
}

struct TurnStream {
    stream: GenerateContentStream,
    history: Arc<RwLock<Vec<Content>>>,
    model: String,
    user: Option<Content>,
    last: Option<Content>,
    done: bool,
    _turn: OwnedMutexGuard<()>,
}

impl TurnStream {
    async fn advance(mut self) -> Option<(Result<GenerateContentResponse>, Self)> {
        if self.done {
            return None;
        }
        match self.stream.next().await {
            Some(Ok(chunk)) => {
                if let Some(content) = chunk.first_content().filter(|c| !c.parts.is_empty()) {
                    self.last = Some(content.clone());
                }
                Some((Ok(chunk), self))
            }
            Some(Err(err)) => {
                self.done = true;
                Some((Err(err), self))
            }
            None => {
                if let (Some(user), Some(model_turn)) = (self.user.take(), self.last.take()) {
                    append_exchange(&self.history, user, model_turn, &self.model).await;
                }
                None
            }
        }
    }
}

async fn append_exchange(
    history: &RwLock<Vec<Content>>,
    user: Content,
    model_turn: Content,
    model: &str,
) {
    let mut history = history.write().await;
    history.push(user);
    history.push(model_turn);
    debug!(model, turns = history.len(), "chat history updated");
}
