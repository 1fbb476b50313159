use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::enums::{FunctionCallingMode, Type};

/// 工具定义。每个 Tool 通常仅设置一种工具字段。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Tool {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_execution: Option<CodeExecution>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_declarations: Option<Vec<FunctionDeclaration>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google_search: Option<GoogleSearch>,
}

impl Tool {
    /// 内置代码执行工具。
    #[must_use]
    pub fn code_execution() -> Self {
        Self {
            code_execution: Some(CodeExecution {}),
            ..Self::default()
        }
    }

    /// 内置 Google Search 工具。
    #[must_use]
    pub fn google_search() -> Self {
        Self {
            google_search: Some(GoogleSearch::default()),
            ..Self::default()
        }
    }

    /// 用户函数声明。
    #[must_use]
    pub fn functions(declarations: Vec<FunctionDeclaration>) -> Self {
        Self {
            function_declarations: Some(declarations),
            ..Self::default()
        }
    }
}

/// 函数声明。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FunctionDeclaration {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Schema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Schema>,
}

impl FunctionDeclaration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            parameters: None,
            response: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_parameters(mut self, parameters: Schema) -> Self {
        self.parameters = Some(parameters);
        self
    }
}

/// Google Search 工具。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GoogleSearch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude_domains: Option<Vec<String>>,
}

/// 代码执行工具（无参数）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CodeExecution {}

/// Tool config（共享配置）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ToolConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_calling_config: Option<FunctionCallingConfig>,
}

/// Function calling config。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FunctionCallingConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_function_names: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<FunctionCallingMode>,
}

/// OpenAPI Schema（精简实现）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Schema {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub any_of: Option<Vec<Schema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "enum")]
    pub enum_values: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_items: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_items: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<HashMap<String, Box<Schema>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_ordering: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub ty: Option<Type>,
}

impl Schema {
    /// 创建对象 Schema builder。
    pub fn object() -> SchemaBuilder {
        SchemaBuilder::new(Type::Object)
    }

    /// 创建数组 Schema builder。
    pub fn array() -> SchemaBuilder {
        SchemaBuilder::new(Type::Array)
    }

    /// 创建字符串 Schema。
    pub fn string() -> Self {
        Self::of_type(Type::String)
    }

    /// 创建整数 Schema。
    pub fn integer() -> Self {
        Self::of_type(Type::Integer)
    }

    /// 创建数字 Schema。
    pub fn number() -> Self {
        Self::of_type(Type::Number)
    }

    /// 创建布尔 Schema。
    pub fn boolean() -> Self {
        Self::of_type(Type::Boolean)
    }

    /// 字符串枚举 Schema（配合 `text/x.enum` 或 JSON 输出）。
    pub fn enumeration<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ty: Some(Type::String),
            format: Some("enum".into()),
            enum_values: Some(values.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    fn of_type(ty: Type) -> Self {
        Self {
            ty: Some(ty),
            ..Default::default()
        }
    }
}

pub struct SchemaBuilder {
    schema: Schema,
}

impl SchemaBuilder {
    /// 创建 Schema builder。
    pub fn new(ty: Type) -> Self {
        Self {
            schema: Schema::of_type(ty),
        }
    }

    /// 设置描述。
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.schema.description = Some(description.into());
        self
    }

    /// 添加字段，同时记录字段顺序。
    pub fn property(mut self, name: impl Into<String>, schema: Schema) -> Self {
        let name = name.into();
        self.schema
            .property_ordering
            .get_or_insert_with(Vec::new)
            .push(name.clone());
        self.schema
            .properties
            .get_or_insert_with(HashMap::new)
            .insert(name, Box::new(schema));
        self
    }

    /// 标记必填字段。
    pub fn required(mut self, name: impl Into<String>) -> Self {
        let required = self.schema.required.get_or_insert_with(Vec::new);
        required.push(name.into());
        self
    }

    /// 设置数组元素 Schema。
    pub fn items(mut self, schema: Schema) -> Self {
        self.schema.items = Some(Box::new(schema));
        self
    }

    /// 构建 Schema。
    pub fn build(self) -> Schema {
        self.schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn schema_builder_object() {
        let schema = Schema::object()
            .property("name", Schema::string())
            .property("count", Schema::integer())
            .required("name")
            .build();
        assert_eq!(schema.ty, Some(Type::Object));
        assert!(schema.properties.as_ref().unwrap().contains_key("name"));
        assert_eq!(
            schema.property_ordering,
            Some(vec!["name".to_string(), "count".to_string()])
        );
    }

    #[test]
    fn enumeration_serializes_enum_keyword() {
        let schema = Schema::enumeration(["Percussion", "String", "Woodwind"]);
        let value = serde_json::to_value(&schema).unwrap();
        assert_eq!(value["type"], "STRING");
        assert_eq!(value["format"], "enum");
        assert_eq!(value["enum"], json!(["Percussion", "String", "Woodwind"]));
    }

    #[test]
    fn tool_constructors_set_one_field() {
        let value = serde_json::to_value(Tool::code_execution()).unwrap();
        assert_eq!(value, json!({"codeExecution": {}}));
        let value = serde_json::to_value(Tool::google_search()).unwrap();
        assert_eq!(value, json!({"googleSearch": {}}));
    }
}
