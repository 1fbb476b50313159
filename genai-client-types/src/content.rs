use crate::base64_serde;
use crate::enums::{Language, Outcome};
use crate::files::File;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 对话内容（一个 turn）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    /// 角色：user/model/function。
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// 消息内容片段，按顺序排列。
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    /// 创建用户文本消息。
    pub fn user(text: impl Into<String>) -> Self {
        Self::from_parts(vec![Part::text(text)], Role::User)
    }

    /// 创建模型文本消息。
    pub fn model(text: impl Into<String>) -> Self {
        Self::from_parts(vec![Part::text(text)], Role::Model)
    }

    /// 从 parts 构建内容。
    #[must_use]
    pub const fn from_parts(parts: Vec<Part>, role: Role) -> Self {
        Self {
            role: Some(role),
            parts,
        }
    }

    /// 提取第一段文本。
    #[must_use]
    pub fn first_text(&self) -> Option<&str> {
        self.parts.iter().find_map(Part::text_value)
    }

    /// 拼接所有非思考文本 part。没有文本时返回 `None`。
    #[must_use]
    pub fn joined_text(&self) -> Option<String> {
        let mut texts = self
            .parts
            .iter()
            .filter(|part| part.thought != Some(true))
            .filter_map(Part::text_value)
            .peekable();
        texts.peek()?;
        Some(texts.collect())
    }

    /// 所有函数调用 part。
    pub fn function_calls(&self) -> impl Iterator<Item = &FunctionCall> {
        self.parts.iter().filter_map(Part::function_call_ref)
    }
}

/// 内容角色。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
    Function,
}

/// 内容部分。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    /// 具体内容变体。
    #[serde(flatten)]
    pub kind: PartKind,
    /// 是否为思考内容。
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thought: Option<bool>,
    /// 思考签名（base64 编码）。
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "base64_serde::option"
    )]
    pub thought_signature: Option<Vec<u8>>,
}

impl Part {
    /// 从变体构建 Part。
    #[must_use]
    pub const fn new(kind: PartKind) -> Self {
        Self {
            kind,
            thought: None,
            thought_signature: None,
        }
    }

    /// 创建文本 Part。
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(PartKind::Text { text: text.into() })
    }

    /// 创建内联二进制数据 Part。
    pub fn inline_data(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self::new(PartKind::InlineData {
            inline_data: Blob {
                mime_type: mime_type.into(),
                data,
            },
        })
    }

    /// 创建文件 URI Part。
    pub fn file_data(file_uri: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self::new(PartKind::FileData {
            file_data: FileData {
                file_uri: file_uri.into(),
                mime_type: mime_type.into(),
            },
        })
    }

    /// 从已上传文件构建 Part，缺少 `uri` 或 `mime_type` 时返回 `None`。
    #[must_use]
    pub fn from_file(file: &File) -> Option<Self> {
        let uri = file.uri.as_ref()?;
        let mime_type = file.mime_type.as_ref()?;
        Some(Self::file_data(uri.clone(), mime_type.clone()))
    }

    /// 创建函数调用 Part。
    #[must_use]
    pub const fn function_call(function_call: FunctionCall) -> Self {
        Self::new(PartKind::FunctionCall { function_call })
    }

    /// 创建函数响应 Part。
    #[must_use]
    pub const fn function_response(function_response: FunctionResponse) -> Self {
        Self::new(PartKind::FunctionResponse { function_response })
    }

    /// 创建可执行代码 Part。
    pub fn executable_code(code: impl Into<String>, language: Language) -> Self {
        Self::new(PartKind::ExecutableCode {
            executable_code: ExecutableCode {
                code: code.into(),
                language,
            },
        })
    }

    /// 创建代码执行结果 Part。
    pub fn code_execution_result(outcome: Outcome, output: impl Into<String>) -> Self {
        Self::new(PartKind::CodeExecutionResult {
            code_execution_result: CodeExecutionResult {
                outcome,
                output: Some(output.into()),
            },
        })
    }

    /// 设置是否为思考内容。
    #[must_use]
    pub const fn with_thought(mut self, thought: bool) -> Self {
        self.thought = Some(thought);
        self
    }

    /// 获取文本内容（仅当为 Text Part）。
    #[must_use]
    pub const fn text_value(&self) -> Option<&str> {
        match &self.kind {
            PartKind::Text { text } => Some(text.as_str()),
            _ => None,
        }
    }

    /// 获取函数调用引用（仅当为 `FunctionCall` Part）。
    #[must_use]
    pub const fn function_call_ref(&self) -> Option<&FunctionCall> {
        match &self.kind {
            PartKind::FunctionCall { function_call } => Some(function_call),
            _ => None,
        }
    }
}

/// 内容部分的具体变体。线上格式是只带一个键的对象，键名即变体。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", untagged)]
pub enum PartKind {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: Blob,
    },
    FileData {
        #[serde(rename = "fileData")]
        file_data: FileData,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: FunctionCall,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: FunctionResponse,
    },
    ExecutableCode {
        #[serde(rename = "executableCode")]
        executable_code: ExecutableCode,
    },
    CodeExecutionResult {
        #[serde(rename = "codeExecutionResult")]
        code_execution_result: CodeExecutionResult,
    },
}

/// 二进制数据。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    #[serde(with = "base64_serde")]
    pub data: Vec<u8>,
}

/// URI 文件数据。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
    pub file_uri: String,
    pub mime_type: String,
}

/// 函数调用。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCall {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
}

/// 函数响应。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
}

impl FunctionResponse {
    /// 针对某次函数调用构造响应，沿用调用的 id 与名称。
    #[must_use]
    pub fn for_call(call: &FunctionCall, response: Value) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            response: Some(response),
        }
    }
}

/// 可执行代码。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutableCode {
    pub code: String,
    pub language: Language,
}

/// 代码执行结果。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeExecutionResult {
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}
