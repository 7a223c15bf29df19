//! 统一流事件类型
//!
//! 定义流式传输的两层中间表示：
//!
//! - `StreamEvent`：上游 parser 的输出，保留上游的关联键（位置 / call id），
//!   尚未经过过滤和索引分配
//! - `BlockEvent`：经过 `StreamState` 过滤、分配下游索引后的事件，
//!   由各前端 generator 渲染为目标 SSE
//!
//! ```text
//! 上游 chunk ──> [Parser] ──> StreamEvent ──> [StreamState] ──> BlockEvent ──> [Generator] ──> 客户端 SSE
//! ```

use serde::{Deserialize, Serialize};

/// 上游工具调用的关联键
///
/// 不同上游用不同方式关联参数增量：Codex 用 `output_index`，
/// Claude 用内容块 `index`，OpenAI 用 `tool_calls[].index`。
/// 带有 call id 时优先按 id 关联。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolKey {
    /// 上游位置（output_index / index）
    pub position: Option<u64>,
    /// 上游调用 ID
    pub call_id: Option<String>,
}

impl ToolKey {
    pub fn at(position: u64) -> Self {
        Self {
            position: Some(position),
            call_id: None,
        }
    }

    pub fn with_call_id(position: Option<u64>, call_id: impl Into<String>) -> Self {
        let call_id = call_id.into();
        Self {
            position,
            call_id: if call_id.is_empty() { None } else { Some(call_id) },
        }
    }
}

/// 上游流事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StreamEvent {
    /// 消息开始（上游给出响应 ID 和模型）
    MessageStart { id: String, model: String },

    /// 文本增量，没有打开的文本块时隐式打开
    TextDelta { text: String },

    /// 结束当前文本块
    TextStop,

    /// 推理/思考内容增量
    ThinkingDelta { text: String },

    /// 结束当前思考块
    ThinkingStop,

    /// 工具调用开始
    ToolUseStart { key: ToolKey, id: String, name: String },

    /// 工具调用参数增量（部分 JSON）
    ToolUseInputDelta { key: ToolKey, partial_json: String },

    /// 工具调用结束，上游可能附带完整参数
    ToolUseStop {
        key: ToolKey,
        arguments: Option<String>,
    },

    /// 只带位置的内容块结束（Claude `content_block_stop`）
    ContentStop { position: u64 },

    /// 使用量更新（后到的值覆盖先到的值）
    Usage(Usage),

    /// 上游提前给出的停止原因
    StopHint(StopReason),

    /// 消息结束
    MessageStop {
        stop_reason: Option<StopReason>,
        usage: Option<Usage>,
    },

    /// 上游错误事件（不终止流）
    Error { error_type: String, message: String },
}

/// 下游内容块类型
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockType {
    /// 文本内容
    Text,
    /// 思考内容
    Thinking,
    /// 工具调用
    ToolUse { id: String, name: String },
}

/// 下游内容块增量
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockDelta {
    Text(String),
    Thinking(String),
    InputJson(String),
}

/// 过滤和索引分配之后的下游事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BlockEvent {
    MessageStart { id: String, model: String },
    BlockStart { index: u32, block: BlockType },
    BlockDelta { index: u32, delta: BlockDelta },
    /// `content` 为块的累积内容（文本或完整参数 JSON）
    BlockStop {
        index: u32,
        block: BlockType,
        content: String,
    },
    Error { error_type: String, message: String },
    /// 完成事件，每个流恰好一次且为最后一个事件
    Completed { stop_reason: StopReason, usage: Usage },
}

/// 停止原因
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// 正常结束
    EndTurn,
    /// 达到最大 token 数
    MaxTokens,
    /// 需要工具调用
    ToolUse,
    /// 命中停止序列
    StopSequence,
    /// 其他原因（如 error、content_filter），原样透传
    Other(String),
}

impl Default for StopReason {
    fn default() -> Self {
        Self::EndTurn
    }
}

impl StopReason {
    /// 从字符串解析停止原因
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "end_turn" | "stop" | "completed" => Self::EndTurn,
            "max_tokens" | "length" | "max_output_tokens" => Self::MaxTokens,
            "tool_use" | "tool_calls" | "function_call" => Self::ToolUse,
            "stop_sequence" => Self::StopSequence,
            other => Self::Other(other.to_string()),
        }
    }

    /// 上游区分的额外终止状态（长度、错误等）原样透传，
    /// `EndTurn` / `ToolUse` 则根据未过滤的工具调用重新推导
    pub fn is_passthrough(&self) -> bool {
        !matches!(self, Self::EndTurn | Self::ToolUse)
    }

    /// 转换为 OpenAI 格式的字符串
    pub fn to_openai_str(&self) -> &str {
        match self {
            Self::EndTurn => "stop",
            Self::MaxTokens => "length",
            Self::ToolUse => "tool_calls",
            Self::StopSequence => "stop",
            Self::Other(s) => s,
        }
    }

    /// 转换为 Anthropic 格式的字符串
    pub fn to_anthropic_str(&self) -> &str {
        match self {
            Self::EndTurn => "end_turn",
            Self::MaxTokens => "max_tokens",
            Self::ToolUse => "tool_use",
            Self::StopSequence => "stop_sequence",
            Self::Other(s) => s,
        }
    }

    /// 转换为 Gemini `finishReason`
    pub fn to_gemini_str(&self) -> String {
        match self {
            Self::EndTurn | Self::ToolUse | Self::StopSequence => "STOP".to_string(),
            Self::MaxTokens => "MAX_TOKENS".to_string(),
            Self::Other(s) => s.to_uppercase(),
        }
    }

    /// Responses API 的 `incomplete_details.reason`，完成状态返回 `None`
    pub fn to_responses_incomplete(&self) -> Option<&str> {
        match self {
            Self::MaxTokens => Some("max_output_tokens"),
            Self::Other(s) if s != "error" => Some(s),
            _ => None,
        }
    }
}

/// Token 使用量
///
/// 字段为 `None` 表示上游没有给出该值；`merge` 只覆盖上游给出的字段，
/// 所以重复的使用量事件不会重复累加。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub cached_tokens: Option<u64>,
    pub reasoning_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

impl Usage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens: Some(input_tokens),
            output_tokens: Some(output_tokens),
            ..Default::default()
        }
    }

    /// 用较新的值覆盖
    pub fn merge(&mut self, newer: &Usage) {
        if newer.input_tokens.is_some() {
            self.input_tokens = newer.input_tokens;
        }
        if newer.output_tokens.is_some() {
            self.output_tokens = newer.output_tokens;
        }
        if newer.cached_tokens.is_some() {
            self.cached_tokens = newer.cached_tokens;
        }
        if newer.reasoning_tokens.is_some() {
            self.reasoning_tokens = newer.reasoning_tokens;
        }
        if newer.total_tokens.is_some() {
            self.total_tokens = newer.total_tokens;
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Usage::default()
    }

    pub fn input(&self) -> u64 {
        self.input_tokens.unwrap_or(0)
    }

    pub fn output(&self) -> u64 {
        self.output_tokens.unwrap_or(0)
    }

    /// 上游给出的总量优先，否则为输入 + 输出
    pub fn total(&self) -> u64 {
        self.total_tokens
            .unwrap_or_else(|| self.input() + self.output())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_reason_from_str() {
        assert_eq!(StopReason::from_str("end_turn"), StopReason::EndTurn);
        assert_eq!(StopReason::from_str("stop"), StopReason::EndTurn);
        assert_eq!(StopReason::from_str("STOP"), StopReason::EndTurn);
        assert_eq!(StopReason::from_str("max_tokens"), StopReason::MaxTokens);
        assert_eq!(StopReason::from_str("length"), StopReason::MaxTokens);
        assert_eq!(
            StopReason::from_str("max_output_tokens"),
            StopReason::MaxTokens
        );
        assert_eq!(StopReason::from_str("tool_use"), StopReason::ToolUse);
        assert_eq!(StopReason::from_str("tool_calls"), StopReason::ToolUse);
        assert_eq!(
            StopReason::from_str("SAFETY"),
            StopReason::Other("safety".to_string())
        );
    }

    #[test]
    fn test_stop_reason_to_openai() {
        assert_eq!(StopReason::EndTurn.to_openai_str(), "stop");
        assert_eq!(StopReason::MaxTokens.to_openai_str(), "length");
        assert_eq!(StopReason::ToolUse.to_openai_str(), "tool_calls");
    }

    #[test]
    fn test_stop_reason_to_anthropic() {
        assert_eq!(StopReason::EndTurn.to_anthropic_str(), "end_turn");
        assert_eq!(StopReason::MaxTokens.to_anthropic_str(), "max_tokens");
        assert_eq!(StopReason::ToolUse.to_anthropic_str(), "tool_use");
        assert_eq!(
            StopReason::Other("error".to_string()).to_anthropic_str(),
            "error"
        );
    }

    #[test]
    fn test_stop_reason_to_gemini() {
        assert_eq!(StopReason::ToolUse.to_gemini_str(), "STOP");
        assert_eq!(StopReason::MaxTokens.to_gemini_str(), "MAX_TOKENS");
        assert_eq!(
            StopReason::Other("safety".to_string()).to_gemini_str(),
            "SAFETY"
        );
    }

    #[test]
    fn test_passthrough_reasons() {
        assert!(!StopReason::EndTurn.is_passthrough());
        assert!(!StopReason::ToolUse.is_passthrough());
        assert!(StopReason::MaxTokens.is_passthrough());
        assert!(StopReason::Other("error".to_string()).is_passthrough());
    }

    #[test]
    fn test_usage_merge_last_value_wins() {
        let mut usage = Usage::new(10, 0);
        usage.merge(&Usage {
            output_tokens: Some(5),
            ..Default::default()
        });
        usage.merge(&Usage {
            output_tokens: Some(7),
            ..Default::default()
        });

        assert_eq!(usage.input(), 10);
        assert_eq!(usage.output(), 7);
        assert_eq!(usage.total(), 17);
    }

    #[test]
    fn test_tool_key_empty_call_id() {
        let key = ToolKey::with_call_id(Some(1), "");
        assert_eq!(key.call_id, None);
        assert_eq!(key.position, Some(1));
    }
}
