//! 上游流式数据解析器
//!
//! 解析不同上游的 SSE 事件负载，输出统一的 `StreamEvent`。
//! 解析器本身无状态，事件之间的关联由 `StreamState` 完成。
//!
//! # 支持的格式
//!
//! - Codex / Responses 事件 (`response.*`)
//! - Anthropic Messages SSE
//! - OpenAI Chat Completions chunk

pub mod claude;
pub mod codex;
pub mod openai;

use crate::models::Format;
use crate::stream::events::StreamEvent;
use crate::translator::TranslateError;
use serde_json::Value;

/// 上游流格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamParser {
    Codex,
    Claude,
    OpenAi,
}

impl UpstreamParser {
    /// 上游格式对应的解析器
    pub fn for_provider(format: Format) -> Option<Self> {
        match format {
            Format::Codex | Format::OpenAIResponses => Some(Self::Codex),
            Format::Claude => Some(Self::Claude),
            Format::OpenAI => Some(Self::OpenAi),
            Format::Gemini | Format::GeminiCli => None,
        }
    }

    /// 解析一个 `data:` 负载
    pub fn parse(&self, data: &str) -> Result<Vec<StreamEvent>, TranslateError> {
        match self {
            Self::Codex => codex::parse_event(data),
            Self::Claude => claude::parse_event(data),
            Self::OpenAi => openai::parse_chunk(data),
        }
    }
}

/// 解析事件负载为 JSON 对象
pub(crate) fn parse_payload(data: &str) -> Result<Value, TranslateError> {
    let value: Value = serde_json::from_str(data)
        .map_err(|e| TranslateError::malformed(format!("上游事件不是有效的 JSON: {e}")))?;
    if !value.is_object() {
        return Err(TranslateError::malformed("上游事件不是 JSON 对象"));
    }
    Ok(value)
}

/// 读取事件类型字段
pub(crate) fn event_type(value: &Value) -> Result<&str, TranslateError> {
    value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| TranslateError::malformed("上游事件缺少 type 字段"))
}
