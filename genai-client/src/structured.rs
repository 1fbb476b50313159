//! Structured output: replies constrained by a response schema.
//!
//! The API accepts an OpenAPI subset ([`Schema`]). It is lowered to a
//! JSON Schema document and replies are checked with `jsonschema`. Every
//! violation is collected with its path before failing.

use futures_util::StreamExt;
use genai_client_types::config::{ENUM_MIME_TYPE, JSON_MIME_TYPE};
use genai_client_types::content::{Content, FunctionCall};
use genai_client_types::enums::Type;
use genai_client_types::models::GenerateContentConfig;
use genai_client_types::response::GenerateContentResponse;
use genai_client_types::tool::Schema;
use jsonschema::Draft;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

use crate::error::{Error, Result};
use crate::models::Models;

/// 校验失败的单条记录。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    /// 形如 `$.items[0].name` 的路径。
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// 按 Schema 校验 JSON 值，返回所有违例。
pub fn violations(schema: &Schema, value: &Value) -> Result<Vec<SchemaViolation>> {
    let document = to_json_schema(schema);
    let validator = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&document)
        .map_err(|err| Error::Validation {
            message: format!("invalid response_schema: {err}"),
        })?;
    Ok(validator
        .iter_errors(value)
        .map(|err| SchemaViolation {
            path: pointer_to_path(&err.instance_path.to_string()),
            message: err.to_string(),
        })
        .collect())
}

/// 按 Schema 校验 JSON 值。
pub fn validate(schema: &Schema, value: &Value) -> Result<()> {
    let found = violations(schema, value)?;
    if found.is_empty() {
        return Ok(());
    }
    Err(Error::SchemaMismatch {
        message: found
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; "),
    })
}

/// 按输出 MIME 类型解析并校验回复文本。
pub fn parse_reply(mime_type: &str, schema: &Schema, text: &str) -> Result<Value> {
    match mime_type {
        ENUM_MIME_TYPE => {
            let choice = text.trim();
            let allowed = schema.enum_values.as_deref().unwrap_or_default();
            if allowed.iter().any(|value| value == choice) {
                Ok(Value::String(choice.to_string()))
            } else {
                Err(Error::SchemaMismatch {
                    message: format!("{choice:?} is not one of {allowed:?}"),
                })
            }
        }
        JSON_MIME_TYPE => {
            let value: Value = serde_json::from_str(text).map_err(|err| Error::SchemaMismatch {
                message: format!("reply is not valid JSON: {err}"),
            })?;
            validate(schema, &value)?;
            Ok(value)
        }
        other => Err(Error::Validation {
            message: format!("structured output does not support response_mime_type {other}"),
        }),
    }
}

/// 把 OpenAPI 子集的 Schema 转换为 JSON Schema 文档。
///
/// `nullable` 展开为 `["T", "null"]`，枚举同时放行 `null`。
fn to_json_schema(schema: &Schema) -> Value {
    let nullable = schema.nullable == Some(true);
    let mut out = Map::new();

    if let Some(ty) = schema.ty.and_then(type_name) {
        let ty = if nullable && ty != "null" {
            json!([ty, "null"])
        } else {
            json!(ty)
        };
        out.insert("type".into(), ty);
    }
    if let Some(values) = &schema.enum_values {
        let mut allowed: Vec<Value> = values.iter().cloned().map(Value::String).collect();
        if nullable {
            allowed.push(Value::Null);
        }
        out.insert("enum".into(), Value::Array(allowed));
    }
    if let Some(any_of) = &schema.any_of {
        let mut options: Vec<Value> = any_of.iter().map(to_json_schema).collect();
        if nullable {
            options.push(json!({"type": "null"}));
        }
        out.insert("anyOf".into(), Value::Array(options));
    }
    if let Some(properties) = &schema.properties {
        let properties = properties
            .iter()
            .map(|(name, property)| (name.clone(), to_json_schema(property)))
            .collect();
        out.insert("properties".into(), Value::Object(properties));
    }
    if let Some(required) = &schema.required {
        out.insert("required".into(), json!(required));
    }
    if let Some(items) = &schema.items {
        out.insert("items".into(), to_json_schema(items));
    }
    if let Some(min) = schema.min_items {
        out.insert("minItems".into(), json!(min.max(0)));
    }
    if let Some(max) = schema.max_items {
        out.insert("maxItems".into(), json!(max.max(0)));
    }
    if let Some(minimum) = schema.minimum {
        out.insert("minimum".into(), json!(minimum));
    }
    if let Some(maximum) = schema.maximum {
        out.insert("maximum".into(), json!(maximum));
    }
    Value::Object(out)
}

const fn type_name(ty: Type) -> Option<&'static str> {
    match ty {
        Type::String => Some("string"),
        Type::Number => Some("number"),
        Type::Integer => Some("integer"),
        Type::Boolean => Some("boolean"),
        Type::Array => Some("array"),
        Type::Object => Some("object"),
        Type::Null => Some("null"),
        Type::TypeUnspecified => None,
    }
}

/// `/0/ingredients/1` → `$[0].ingredients[1]`
fn pointer_to_path(pointer: &str) -> String {
    let mut path = String::from("$");
    for segment in pointer.split('/').skip(1) {
        let segment = segment.replace("~1", "/").replace("~0", "~");
        if segment.parse::<usize>().is_ok() {
            path.push('[');
            path.push_str(&segment);
            path.push(']');
        } else {
            path.push('.');
            path.push_str(&segment);
        }
    }
    path
}

/// 取出 Schema 与输出类型；未指定 MIME 类型时默认为 JSON。
fn structured_target(config: &mut GenerateContentConfig) -> Result<(String, Schema)> {
    let generation = config.generation_config.as_mut().ok_or_else(|| Error::Validation {
        message: "structured output requires generation_config.response_schema".into(),
    })?;
    let schema = generation.response_schema.clone().ok_or_else(|| Error::Validation {
        message: "structured output requires generation_config.response_schema".into(),
    })?;
    let mime_type = generation
        .response_mime_type
        .get_or_insert_with(|| JSON_MIME_TYPE.to_string())
        .clone();
    Ok((mime_type, schema))
}

fn pending(calls: Vec<&FunctionCall>) -> Error {
    Error::FunctionCallPending {
        calls: calls.into_iter().cloned().collect(),
    }
}

fn reply_text(response: &GenerateContentResponse) -> Result<String> {
    let calls = response.function_calls();
    if !calls.is_empty() {
        return Err(pending(calls));
    }
    response.text().ok_or_else(|| Error::SchemaMismatch {
        message: match response.finish_reason() {
            Some(reason) => format!("reply has no text (finish reason {reason:?})"),
            None => "reply has no text".into(),
        },
    })
}

impl Models {
    /// 生成结构化输出并按 `response_schema` 校验。
    ///
    /// 不符合 Schema 时返回 [`Error::SchemaMismatch`]；模型请求函数调用时返回
    /// [`Error::FunctionCallPending`]。
    pub async fn generate_structured(
        &self,
        model: impl Into<String>,
        contents: Vec<Content>,
        mut config: GenerateContentConfig,
    ) -> Result<Value> {
        let (mime_type, schema) = structured_target(&mut config)?;
        let response = self
            .generate_content_with_config(model, contents, config)
            .await?;
        let text = reply_text(&response)?;
        parse_reply(&mime_type, &schema, &text)
    }

    /// 流式生成结构化输出：读完整个流、拼接文本后校验。
    pub async fn generate_structured_stream(
        &self,
        model: impl Into<String>,
        contents: Vec<Content>,
        mut config: GenerateContentConfig,
    ) -> Result<Value> {
        let (mime_type, schema) = structured_target(&mut config)?;
        let mut stream = self
            .generate_content_stream(model, contents, config)
            .await?;

        let mut text = String::new();
        let mut calls: Vec<FunctionCall> = Vec::new();
        let mut last_finish = None;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            calls.extend(chunk.function_calls().into_iter().cloned());
            if let Some(piece) = chunk.text() {
                text.push_str(&piece);
            }
            if let Some(reason) = chunk.finish_reason() {
                last_finish = Some(reason);
            }
        }

        if !calls.is_empty() {
            return Err(Error::FunctionCallPending { calls });
        }
        if text.is_empty() {
            return Err(Error::SchemaMismatch {
                message: match last_finish {
                    Some(reason) => format!("reply has no text (finish reason {reason:?})"),
                    None => "reply has no text".into(),
                },
            });
        }
        parse_reply(&mime_type, &schema, &text)
    }

    /// 生成结构化输出并反序列化为 `T`。
    pub async fn generate_json<T: DeserializeOwned>(
        &self,
        model: impl Into<String>,
        contents: Vec<Content>,
        config: GenerateContentConfig,
    ) -> Result<T> {
        let value = self.generate_structured(model, contents, config).await?;
        serde_json::from_value(value).map_err(|err| Error::SchemaMismatch {
            message: err.to_string(),
        })
    }
}
