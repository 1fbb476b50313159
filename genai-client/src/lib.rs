//! Core client crate for the Gemini generative API.
//!
//! Entry point is [`Client`]; resources hang off it as `files()`, `caches()`,
//! `chats()` and `models()`.

pub mod caches;
pub mod chats;
pub mod client;
pub mod error;
pub mod files;
mod http_response;
pub mod models;
pub mod retry;
pub mod sse;
pub mod structured;
mod upload;

#[cfg(test)]
mod test_support;

pub use genai_client_types as types;

pub use chats::ChatSession;
pub use client::{Client, ClientBuilder, ClientConfig, HttpOptions};
pub use error::{Error, Result};
pub use files::{file_part, WaitForFileConfig};
pub use models::GenerateContentStream;
pub use retry::RetryOptions;
