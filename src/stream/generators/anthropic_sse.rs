//! Anthropic SSE 生成器
//!
//! 将 `BlockEvent` 转换为 Anthropic Messages API SSE 格式。
//!
//! # 格式说明
//!
//! ```text
//! event: message_start
//! data: {"type":"message_start","message":{...}}
//!
//! event: content_block_start
//! data: {"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}
//!
//! event: content_block_delta
//! data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hello"}}
//!
//! event: content_block_stop
//! data: {"type":"content_block_stop","index":0}
//!
//! event: message_delta
//! data: {"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{...}}
//!
//! event: message_stop
//! data: {"type":"message_stop"}
//! ```
//!
//! `message_start` 只在上游给出消息开始时发送；完成事件渲染为
//! `message_delta` + `message_stop` 两帧组成的单个字符串。

use crate::stream::events::{BlockDelta, BlockEvent, BlockType, StopReason, Usage};
use crate::stream::sse::frame;
use serde_json::{json, Value};
use uuid::Uuid;

/// Anthropic SSE 生成器
#[derive(Debug)]
pub struct AnthropicSseGenerator {
    /// 消息 ID
    message_id: String,
    /// 模型名称
    model: String,
}

impl Default for AnthropicSseGenerator {
    fn default() -> Self {
        Self::new("unknown".to_string())
    }
}

impl AnthropicSseGenerator {
    /// 创建新的生成器
    pub fn new(model: String) -> Self {
        Self {
            message_id: format!("msg_{}", Uuid::new_v4().simple()),
            model,
        }
    }

    /// 将下游事件转换为 Anthropic SSE 字符串列表
    pub fn generate(&mut self, event: &BlockEvent) -> Vec<String> {
        match event {
            BlockEvent::MessageStart { id, model } => {
                if !id.is_empty() {
                    self.message_id = id.clone();
                }
                if !model.is_empty() {
                    self.model = model.clone();
                }
                vec![self.create_message_start()]
            }

            BlockEvent::BlockStart { index, block } => {
                let content_block = match block {
                    BlockType::Text => json!({"type": "text", "text": ""}),
                    BlockType::Thinking => json!({"type": "thinking", "thinking": ""}),
                    BlockType::ToolUse { id, name } => json!({
                        "type": "tool_use",
                        "id": id,
                        "name": name,
                        "input": {}
                    }),
                };
                vec![frame(
                    Some("content_block_start"),
                    &json!({
                        "type": "content_block_start",
                        "index": index,
                        "content_block": content_block
                    }),
                )]
            }

            BlockEvent::BlockDelta { index, delta } => {
                let delta = match delta {
                    BlockDelta::Text(text) => json!({"type": "text_delta", "text": text}),
                    BlockDelta::Thinking(text) => {
                        json!({"type": "thinking_delta", "thinking": text})
                    }
                    BlockDelta::InputJson(partial) => {
                        json!({"type": "input_json_delta", "partial_json": partial})
                    }
                };
                vec![frame(
                    Some("content_block_delta"),
                    &json!({
                        "type": "content_block_delta",
                        "index": index,
                        "delta": delta
                    }),
                )]
            }

            BlockEvent::BlockStop { index, .. } => vec![frame(
                Some("content_block_stop"),
                &json!({"type": "content_block_stop", "index": index}),
            )],

            BlockEvent::Error {
                error_type,
                message,
            } => vec![self.create_error(error_type, message)],

            BlockEvent::Completed { stop_reason, usage } => {
                vec![format!(
                    "{}{}",
                    self.create_message_delta(stop_reason, usage),
                    frame(Some("message_stop"), &json!({"type": "message_stop"}))
                )]
            }
        }
    }

    /// 获取消息 ID
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    fn create_message_start(&self) -> String {
        frame(
            Some("message_start"),
            &json!({
                "type": "message_start",
                "message": {
                    "id": self.message_id,
                    "type": "message",
                    "role": "assistant",
                    "model": self.model,
                    "content": [],
                    "stop_reason": Value::Null,
                    "stop_sequence": Value::Null,
                    "usage": {
                        "input_tokens": 0,
                        "output_tokens": 0
                    }
                }
            }),
        )
    }

    fn create_message_delta(&self, stop_reason: &StopReason, usage: &Usage) -> String {
        frame(
            Some("message_delta"),
            &json!({
                "type": "message_delta",
                "delta": {
                    "stop_reason": stop_reason.to_anthropic_str(),
                    "stop_sequence": Value::Null
                },
                "usage": render_usage(usage)
            }),
        )
    }

    fn create_error(&self, error_type: &str, message: &str) -> String {
        frame(
            Some("error"),
            &json!({
                "type": "error",
                "error": {
                    "type": error_type,
                    "message": message
                }
            }),
        )
    }
}

/// Anthropic 使用量对象
pub(crate) fn render_usage(usage: &Usage) -> Value {
    let mut out = json!({
        "input_tokens": usage.input(),
        "output_tokens": usage.output()
    });
    if let Some(cached) = usage.cached_tokens {
        out["cache_read_input_tokens"] = json!(cached);
    }
    out
}
