use serde::{Deserialize, Serialize};

use crate::enums::{HarmBlockThreshold, HarmCategory};
use crate::tool::Schema;

/// 结构化 JSON 输出的 MIME 类型。
pub const JSON_MIME_TYPE: &str = "application/json";
/// 单个枚举值输出的 MIME 类型。
pub const ENUM_MIME_TYPE: &str = "text/x.enum";

/// 生成配置。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_count: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<Schema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_config: Option<ThinkingConfig>,
}

impl GenerationConfig {
    /// 要求 JSON 输出并符合给定 Schema。
    #[must_use]
    pub fn json(schema: Schema) -> Self {
        Self {
            response_mime_type: Some(JSON_MIME_TYPE.into()),
            response_schema: Some(schema),
            ..Self::default()
        }
    }

    /// 要求输出为枚举值之一（`text/x.enum`）。
    #[must_use]
    pub fn enumeration(schema: Schema) -> Self {
        Self {
            response_mime_type: Some(ENUM_MIME_TYPE.into()),
            response_schema: Some(schema),
            ..Self::default()
        }
    }
}

/// 安全设置。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SafetySetting {
    pub category: HarmCategory,
    pub threshold: HarmBlockThreshold,
}

/// Thinking 配置。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ThinkingConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_budget: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_thoughts: Option<bool>,
}
