//! Request checks performed before anything is sent.

use genai_client_types::config::{GenerationConfig, ENUM_MIME_TYPE, JSON_MIME_TYPE};
use genai_client_types::content::Content;
use genai_client_types::models::GenerateContentConfig;

use crate::error::{Error, Result};

pub(crate) fn validate_generate_request(
    contents: &[Content],
    config: &GenerateContentConfig,
) -> Result<()> {
    validate_contents(contents)?;
    if let Some(generation_config) = &config.generation_config {
        validate_generation_config(generation_config)?;
    }
    if config
        .cached_content
        .as_deref()
        .is_some_and(|name| name.trim().is_empty())
    {
        return Err(invalid("cached_content must not be empty"));
    }
    Ok(())
}

pub(crate) fn validate_contents(contents: &[Content]) -> Result<()> {
    if contents.is_empty() {
        return Err(invalid("contents must not be empty"));
    }
    if let Some(index) = contents.iter().position(|content| content.parts.is_empty()) {
        return Err(Error::Validation {
            message: format!("contents[{index}] has no parts"),
        });
    }
    Ok(())
}

fn validate_generation_config(config: &GenerationConfig) -> Result<()> {
    if let Some(temperature) = config.temperature {
        if !(0.0..=2.0).contains(&temperature) {
            return Err(Error::Validation {
                message: format!("temperature must be within [0, 2], got {temperature}"),
            });
        }
    }
    if let Some(top_p) = config.top_p {
        if !(0.0..=1.0).contains(&top_p) {
            return Err(Error::Validation {
                message: format!("top_p must be within [0, 1], got {top_p}"),
            });
        }
    }
    if config.top_k.is_some_and(|top_k| top_k < 1.0) {
        return Err(invalid("top_k must be >= 1"));
    }
    if config.candidate_count.is_some_and(|count| count < 1) {
        return Err(invalid("candidate_count must be >= 1"));
    }
    if config.max_output_tokens.is_some_and(|tokens| tokens < 1) {
        return Err(invalid("max_output_tokens must be >= 1"));
    }
    if config.response_schema.is_some() {
        match config.response_mime_type.as_deref() {
            Some(JSON_MIME_TYPE | ENUM_MIME_TYPE) => {}
            other => {
                return Err(Error::Validation {
                    message: format!(
                        "response_schema requires response_mime_type {JSON_MIME_TYPE} or {ENUM_MIME_TYPE}, got {}",
                        other.unwrap_or("none")
                    ),
                });
            }
        }
    }
    Ok(())
}

fn invalid(message: &str) -> Error {
    Error::Validation {
        message: message.to_string(),
    }
}
