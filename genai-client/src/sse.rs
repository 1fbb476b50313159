//! SSE (Server-Sent Events) stream decoding utilities.
//!
//! A JSON stream only ends cleanly after a terminal marker: a `[DONE]` event
//! or a chunk that reports itself terminal (see [`TerminalChunk`]). A byte
//! stream that closes before that yields one [`Error::IncompleteStream`].

use std::collections::VecDeque;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, Bytes, BytesMut};
use futures_util::Stream;
use memchr::memmem::Finder;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{Error, Result};
use genai_client_types::response::GenerateContentResponse;

/// SSE 事件。
#[derive(Debug, Clone)]
pub struct ServerSentEvent {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

/// 能判断自身是否为流的最后一个 chunk。
pub trait TerminalChunk {
    fn is_terminal(&self) -> bool;
}

impl TerminalChunk for GenerateContentResponse {
    fn is_terminal(&self) -> bool {
        Self::is_terminal(self)
    }
}

/// SSE 解码器。
pub struct SseDecoder {
    buffer: BytesMut,
    finder_lf: Finder<'static>,
    finder_cr: Finder<'static>,
    finder_crlf: Finder<'static>,
}

impl SseDecoder {
    /// 创建新的 SSE 解码器。
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
            finder_lf: Finder::new(b"\n\n"),
            finder_cr: Finder::new(b"\r\r"),
            finder_crlf: Finder::new(b"\r\n\r\n"),
        }
    }

    /// 解码一个 chunk，返回完整的 SSE 事件。
    pub fn decode(&mut self, chunk: &[u8]) -> Vec<Result<ServerSentEvent>> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::with_capacity(4);

        while let Some((pos, len)) = self.find_delimiter(&self.buffer) {
            let event_bytes = self.buffer.split_to(pos);
            self.buffer.advance(len);

            match parse_lines(&event_bytes) {
                Ok(Some(event)) => events.push(Ok(event)),
                Ok(None) => {}
                Err(err) => events.push(Err(err)),
            }
        }

        events
    }

    /// 连接关闭时解析缓冲区中没有以空行结尾的最后一个事件。
    pub fn finish(&mut self) -> Option<Result<ServerSentEvent>> {
        let rest = self.buffer.split();
        parse_lines(&rest).transpose()
    }

    fn find_delimiter(&self, buf: &[u8]) -> Option<(usize, usize)> {
        [
            (self.finder_crlf.find(buf), 4),
            (self.finder_lf.find(buf), 2),
            (self.finder_cr.find(buf), 2),
        ]
        .into_iter()
        .filter_map(|(pos, len)| pos.map(|pos| (pos, len)))
        .min_by_key(|(pos, _)| *pos)
    }
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_lines(data: &[u8]) -> Result<Option<ServerSentEvent>> {
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    let text = std::str::from_utf8(data).map_err(|err| Error::Parse {
        message: err.to_string(),
    })?;

    let mut event: Option<String> = None;
    let mut id: Option<String> = None;
    let mut data_lines: Vec<&str> = Vec::with_capacity(4);
    let mut has_field = false;

    for line in text.split('\n') {
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with(':') {
            continue;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => {
                has_field = true;
                if !value.is_empty() {
                    event = Some(value.to_string());
                }
            }
            "data" => {
                has_field = true;
                data_lines.push(value);
            }
            "id" => {
                has_field = true;
                if !value.is_empty() {
                    id = Some(value.to_string());
                }
            }
            _ => {}
        }
    }

    if !has_field {
        return Ok(None);
    }

    Ok(Some(ServerSentEvent {
        event,
        data: data_lines.join("\n"),
        id,
    }))
}

type ByteStream = Pin<Box<dyn Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send>>;

/// SSE JSON Stream 包装器（泛型）。
pub struct SseJsonStream<T> {
    stream: ByteStream,
    decoder: SseDecoder,
    pending: VecDeque<Result<ServerSentEvent>>,
    /// 已收到结束标记。
    terminated: bool,
    /// 底层字节流已结束。
    exhausted: bool,
    /// 已向调用方返回 `None` 或截断错误。
    finished: bool,
    chunks: usize,
    _marker: PhantomData<T>,
}

impl<T> Unpin for SseJsonStream<T> {}

impl<T> SseJsonStream<T> {
    /// 从 HTTP 响应创建 SSE 流。
    pub fn new(response: reqwest::Response) -> Self {
        Self::from_byte_stream(Box::pin(response.bytes_stream()))
    }

    fn from_byte_stream(stream: ByteStream) -> Self {
        Self {
            stream,
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
            terminated: false,
            exhausted: false,
            finished: false,
            chunks: 0,
            _marker: PhantomData,
        }
    }
}

impl<T> Stream for SseJsonStream<T>
where
    T: DeserializeOwned + TerminalChunk,
{
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if this.finished {
                return Poll::Ready(None);
            }

            if let Some(item) = this.pending.pop_front() {
                let event = match item {
                    Ok(event) => event,
                    Err(err) => return Poll::Ready(Some(Err(err))),
                };
                if event.data == "[DONE]" {
                    this.terminated = true;
                    continue;
                }
                let parsed = serde_json::from_str::<T>(&event.data).map_err(Error::from)?;
                this.chunks += 1;
                if parsed.is_terminal() {
                    this.terminated = true;
                }
                return Poll::Ready(Some(Ok(parsed)));
            }

            if this.exhausted {
                this.finished = true;
                debug!(chunks = this.chunks, terminated = this.terminated, "sse stream ended");
                if this.terminated {
                    return Poll::Ready(None);
                }
                return Poll::Ready(Some(Err(Error::IncompleteStream {
                    message: format!("connection closed after {} chunk(s)", this.chunks),
                })));
            }

            match this.stream.as_mut().poll_next(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(None) => {
                    this.exhausted = true;
                    if let Some(event) = this.decoder.finish() {
                        this.pending.push_back(event);
                    }
                }
                Poll::Ready(Some(Err(err))) => return Poll::Ready(Some(Err(err.into()))),
                Poll::Ready(Some(Ok(bytes))) => {
                    this.pending.extend(this.decoder.decode(&bytes));
                }
            }
        }
    }
}

/// 便捷函数：从 reqwest Response 创建生成内容的 SSE 流。
pub fn parse_sse_stream(response: reqwest::Response) -> SseJsonStream<GenerateContentResponse> {
    parse_sse_stream_with::<GenerateContentResponse>(response)
}

/// 泛型 SSE JSON 流解析器。
pub fn parse_sse_stream_with<T>(response: reqwest::Response) -> SseJsonStream<T>
where
    T: DeserializeOwned + TerminalChunk,
{
    SseJsonStream::new(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{stream, StreamExt};

    fn json_stream(parts: &[&'static str]) -> SseJsonStream<GenerateContentResponse> {
        let chunks: Vec<std::result::Result<Bytes, reqwest::Error>> = parts
            .iter()
            .map(|part| Ok(Bytes::from_static(part.as_bytes())))
            .collect();
        SseJsonStream::from_byte_stream(Box::pin(stream::iter(chunks)))
    }

    #[test]
    fn test_sse_decoder_basic() {
        let mut decoder = SseDecoder::new();
        let chunk = b"data: {\"text\":\"Hello\"}\n\ndata: {\"text\":\"World\"}\n\n";
        let events = decoder.decode(chunk);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].as_ref().unwrap().data, r#"{"text":"Hello"}"#);
        assert_eq!(events[1].as_ref().unwrap().data, r#"{"text":"World"}"#);
    }

    #[test]
    fn test_sse_decoder_crlf_and_double_cr() {
        let mut decoder = SseDecoder::new();
        let events = decoder.decode(b"data: {\"a\":1}\r\n\r\ndata: {\"b\":2}\r\r");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].as_ref().unwrap().data, r#"{"a":1}"#);
        assert_eq!(events[1].as_ref().unwrap().data, r#"{"b":2}"#);
    }

    #[test]
    fn test_sse_decoder_joins_multiline_data_and_skips_comments() {
        let mut decoder = SseDecoder::new();
        let events = decoder.decode(b": keep-alive\n\nevent: chunk\ndata: line1\ndata: line2\nid: 7\n\n");
        assert_eq!(events.len(), 1);
        let event = events[0].as_ref().unwrap();
        assert_eq!(event.data, "line1\nline2");
        assert_eq!(event.event.as_deref(), Some("chunk"));
        assert_eq!(event.id.as_deref(), Some("7"));
    }

    #[test]
    fn test_sse_decoder_split_across_chunks_and_finish() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.decode(b"data: [DO").is_empty());
        assert!(decoder.decode(b"NE]").is_empty());
        let event = decoder.finish().unwrap().unwrap();
        assert_eq!(event.data, "[DONE]");
        assert!(decoder.finish().is_none());
    }

    #[tokio::test]
    async fn stream_with_finish_reason_ends_cleanly() {
        let stream = json_stream(&[
            "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"Hel\"}]}}]}\n\n",
            "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"lo\"}]},\"finishReason\":\"STOP\"}]}\n\n",
        ]);
        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(Result::is_ok));
    }

    #[tokio::test]
    async fn stream_with_done_marker_ends_cleanly() {
        let stream = json_stream(&[
            "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"ok\"}]}}]}\n\n",
            "data: [DONE]\n\n",
        ]);
        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 1);
        assert!(items[0].is_ok());
    }

    #[tokio::test]
    async fn truncated_stream_yields_incomplete_error_once() {
        let stream = json_stream(&[
            "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"par\"}]}}]}\n\n",
        ]);
        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(Error::IncompleteStream { .. })));
    }

    #[tokio::test]
    async fn final_event_without_blank_line_is_not_lost() {
        let stream = json_stream(&[
            "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"ok\"}]},\"finishReason\":\"STOP\"}]}",
        ]);
        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 1);
        assert!(items[0].is_ok());
    }
}
