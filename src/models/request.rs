//! 中性请求模型
//!
//! 各客户端格式的请求先读入 `ChatRequest`，再由目标格式的 writer 输出。
//! 对话被展开为有序的条目序列（消息 / 工具调用 / 工具结果），
//! 与 Responses API 的 `input` 粒度一致。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 中性聊天请求
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// 顶层系统指令（Claude `system` / Responses `instructions` / Gemini `systemInstruction`）
    pub instructions: Option<String>,
    pub items: Vec<ConversationItem>,
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: Option<ToolChoice>,
    pub params: GenerationParams,
}

impl ChatRequest {
    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name.clone()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// 对话条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConversationItem {
    Message { role: Role, parts: Vec<ContentPart> },
    ToolCall {
        id: String,
        name: String,
        /// 参数 JSON 文本
        arguments: String,
    },
    ToolResult { call_id: String, output: String },
}

impl ConversationItem {
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self::Message {
            role,
            parts: vec![ContentPart::Text(text.into())],
        }
    }
}

/// 消息内容片段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ContentPart {
    Text(String),
    Image(ImageSource),
}

/// 图片来源
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ImageSource {
    Url(String),
    Base64 { media_type: String, data: String },
}

impl ImageSource {
    /// 解析 URL，`data:` URL 转为 base64 来源
    pub fn from_url(url: &str) -> Self {
        if let Some(rest) = url.strip_prefix("data:") {
            if let Some((media_type, data)) = rest.split_once(";base64,") {
                return Self::Base64 {
                    media_type: media_type.to_string(),
                    data: data.to_string(),
                };
            }
        }
        Self::Url(url.to_string())
    }

    /// 输出为 URL（base64 来源输出 `data:` URL）
    pub fn to_url(&self) -> String {
        match self {
            Self::Url(url) => url.clone(),
            Self::Base64 { media_type, data } => format!("data:{media_type};base64,{data}"),
        }
    }
}

/// 工具定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: Option<String>,
    /// 参数 JSON Schema
    pub parameters: Option<Value>,
}

/// 工具选择策略
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolChoice {
    Auto,
    None,
    Required,
    Function(String),
}

/// 生成参数
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub max_tokens: Option<u64>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub top_k: Option<u64>,
    pub stop: Vec<String>,
    pub parallel_tool_calls: Option<bool>,
    /// low / medium / high
    pub reasoning_effort: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_source_data_url() {
        let src = ImageSource::from_url("data:image/png;base64,AAAA");
        assert_eq!(
            src,
            ImageSource::Base64 {
                media_type: "image/png".to_string(),
                data: "AAAA".to_string()
            }
        );
        assert_eq!(src.to_url(), "data:image/png;base64,AAAA");

        let src = ImageSource::from_url("https://example.com/a.png");
        assert_eq!(src.to_url(), "https://example.com/a.png");
    }
}
