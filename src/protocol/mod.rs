//! 线协议编解码
//!
//! 每种协议一个编解码器（零大小类型），实现客户端侧或上游侧的 trait：
//!
//! - `ClientProtocol`：读取客户端请求、渲染非流式响应
//! - `ProviderProtocol`：写出上游请求、解析上游非流式响应
//!
//! 请求转换 = 客户端 reader → `ChatRequest` → 上游 writer；
//! 非流式响应转换 = 上游 parser → `ResponseMessage` → 客户端 renderer。

pub mod catalog;
pub mod claude;
pub mod codex;
pub mod field;
pub mod gemini;
pub mod openai;
pub mod responses;

pub use catalog::{build_short_name_map, ToolCatalog};
pub use claude::Claude;
pub use codex::Codex;
pub use gemini::{Gemini, GeminiCli};
pub use openai::OpenAiChat;
pub use responses::Responses;

use crate::models::{ChatRequest, Format, ResponseMessage};
use crate::stream::UpstreamParser;
use crate::translator::TranslateError;
use serde_json::Value;

/// 客户端侧协议
pub trait ClientProtocol {
    const FORMAT: Format;

    /// 读取客户端请求（顶层结构已校验为 JSON 对象）
    fn read_request(root: &Value) -> ChatRequest;

    /// 渲染非流式响应
    fn render_response(message: &ResponseMessage) -> Value;

    /// 客户端请求声明的工具目录，请求无法解析时为空
    fn catalog(original_request: &[u8]) -> ToolCatalog {
        match parse_document(original_request) {
            Ok(root) => ToolCatalog::new(Self::read_request(&root).tool_names()),
            Err(_) => ToolCatalog::default(),
        }
    }
}

/// 上游侧协议
pub trait ProviderProtocol {
    const FORMAT: Format;
    const STREAM: UpstreamParser;

    /// 写出上游请求
    fn write_request(request: &ChatRequest, model: &str, stream: bool) -> Value;

    /// 解析上游非流式响应
    fn parse_response(raw: &[u8]) -> Result<ResponseMessage, TranslateError>;
}

/// 解析顶层 JSON 文档，必须是对象
pub fn parse_document(raw: &[u8]) -> Result<Value, TranslateError> {
    let value: Value = serde_json::from_slice(raw)
        .map_err(|e| TranslateError::malformed(format!("请求体不是有效的 JSON: {e}")))?;
    if !value.is_object() {
        return Err(TranslateError::malformed("请求体不是 JSON 对象"));
    }
    Ok(value)
}

/// 按格式读取客户端请求
pub fn read_request(format: Format, raw: &[u8]) -> Result<ChatRequest, TranslateError> {
    let root = parse_document(raw)?;
    Ok(match format {
        Format::OpenAI => OpenAiChat::read_request(&root),
        Format::OpenAIResponses | Format::Codex => Responses::read_request(&root),
        Format::Claude => Claude::read_request(&root),
        Format::Gemini => Gemini::read_request(&root),
        Format::GeminiCli => GeminiCli::read_request(&root),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_document_rejects_non_objects() {
        assert!(matches!(
            parse_document(b"not json").unwrap_err(),
            TranslateError::MalformedInput(_)
        ));
        assert!(matches!(
            parse_document(b"[1]").unwrap_err(),
            TranslateError::MalformedInput(_)
        ));
        assert!(parse_document(b"{}").is_ok());
    }

    #[test]
    fn test_catalog_from_each_client_format() {
        let claude = br#"{"tools":[{"name":"Read","input_schema":{}}]}"#;
        assert_eq!(Claude::catalog(claude).names(), ["Read".to_string()]);

        let openai = br#"{"tools":[{"type":"function","function":{"name":"Read"}}]}"#;
        assert_eq!(OpenAiChat::catalog(openai).names(), ["Read".to_string()]);

        let responses = br#"{"tools":[{"type":"function","name":"Read"}]}"#;
        assert_eq!(Responses::catalog(responses).names(), ["Read".to_string()]);

        let gemini = br#"{"tools":[{"functionDeclarations":[{"name":"Read"}]}]}"#;
        assert_eq!(Gemini::catalog(gemini).names(), ["Read".to_string()]);

        assert!(Claude::catalog(b"garbage").names().is_empty());
    }
}
