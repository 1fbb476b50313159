//! Shared wire types for `genai-client`.

mod base64_serde;
pub mod duration_serde;

pub mod caches;
pub mod config;
pub mod content;
pub mod enums;
pub mod files;
pub mod models;
pub mod response;
pub mod tool;
