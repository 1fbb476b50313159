#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use wiremock::{Request, Respond, ResponseTemplate};

use genai_client::{Client, RetryOptions};

pub fn build_gemini_client(base_url: &str) -> Client {
    build_gemini_client_with_version(base_url, "v1beta")
}

pub fn build_gemini_client_with_version(base_url: &str, api_version: &str) -> Client {
    Client::builder()
        .api_key("test-key")
        .base_url(base_url)
        .api_version(api_version)
        .retry_options(RetryOptions::immediate(3))
        .build()
        .unwrap()
}

/// 依次返回预设响应，用完后重复最后一个。
#[derive(Clone)]
pub struct SequenceResponder {
    calls: Arc<AtomicUsize>,
    responses: Vec<ResponseTemplate>,
}

impl SequenceResponder {
    pub fn new(responses: Vec<ResponseTemplate>) -> Self {
        assert!(!responses.is_empty());
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            responses,
        }
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl Respond for SequenceResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let idx = self.calls.fetch_add(1, Ordering::SeqCst);
        let idx = idx.min(self.responses.len() - 1);
        self.responses[idx].clone()
    }
}

pub fn file_json(name: &str, state: &str) -> Value {
    json!({
        "name": name,
        "mimeType": "video/mp4",
        "uri": format!("https://generativelanguage.googleapis.com/v1beta/{name}"),
        "state": state
    })
}

pub fn text_response(text: &str) -> Value {
    json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "finishReason": "STOP"
        }],
        "usageMetadata": {"promptTokenCount": 2, "candidatesTokenCount": 3, "totalTokenCount": 5}
    })
}

/// 组装 SSE 响应体：每个 JSON 值一个 `data:` 事件。
pub fn sse_body(chunks: &[Value]) -> String {
    chunks
        .iter()
        .map(|chunk| format!("data: {chunk}\n\n"))
        .collect()
}

pub fn text_chunk(text: &str, finish: bool) -> Value {
    let mut candidate = json!({
        "content": {"role": "model", "parts": [{"text": text}]}
    });
    if finish {
        candidate["finishReason"] = json!("STOP");
    }
    json!({ "candidates": [candidate] })
}

pub fn sse_response(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(body)
}

pub fn not_found(message: &str) -> ResponseTemplate {
    ResponseTemplate::new(404).set_body_json(json!({
        "error": {"code": 404, "message": message, "status": "NOT_FOUND"}
    }))
}
