//! OpenAI SSE 生成器
//!
//! 将 `BlockEvent` 转换为 OpenAI Chat Completions SSE 格式。
//!
//! # 格式说明
//!
//! ```text
//! data: {"id":"chatcmpl-xxx","object":"chat.completion.chunk","created":1234567890,"model":"gpt-4","choices":[{"index":0,"delta":{"content":"Hello"},"finish_reason":null}]}
//!
//! data: [DONE]
//! ```

use crate::stream::events::{BlockDelta, BlockEvent, BlockType, StopReason, Usage};
use crate::stream::sse::done_frame;
use serde::Serialize;
use std::collections::HashMap;

/// OpenAI SSE 生成器
#[derive(Debug)]
pub struct OpenAiSseGenerator {
    /// 响应 ID
    response_id: String,
    /// 模型名称
    model: String,
    /// 创建时间戳
    created: i64,
    /// 是否已发送 role
    role_sent: bool,
    /// 下游块索引 -> tool_calls 数组索引
    tool_indices: HashMap<u32, usize>,
    /// 下一个工具调用索引
    next_tool_index: usize,
}

impl Default for OpenAiSseGenerator {
    fn default() -> Self {
        Self::new("unknown".to_string())
    }
}

impl OpenAiSseGenerator {
    /// 创建新的生成器
    pub fn new(model: String) -> Self {
        Self {
            response_id: format!("chatcmpl-{}", uuid::Uuid::new_v4().simple()),
            model,
            created: chrono::Utc::now().timestamp(),
            role_sent: false,
            tool_indices: HashMap::new(),
            next_tool_index: 0,
        }
    }

    /// 将下游事件转换为 OpenAI SSE 字符串
    pub fn generate(&mut self, event: &BlockEvent) -> Vec<String> {
        match event {
            BlockEvent::MessageStart { id, model } => {
                if !id.is_empty() {
                    self.response_id = id.clone();
                }
                if !model.is_empty() {
                    self.model = model.clone();
                }
                // OpenAI 格式不需要单独的 message_start 事件
                Vec::new()
            }

            BlockEvent::BlockStart { index, block } => match block {
                BlockType::ToolUse { id, name } => {
                    let tool_index = self.next_tool_index;
                    self.next_tool_index += 1;
                    self.tool_indices.insert(*index, tool_index);

                    let delta = OpenAiDelta {
                        tool_calls: Some(vec![OpenAiToolCallDelta {
                            index: tool_index,
                            id: Some(id.as_str()),
                            r#type: Some("function"),
                            function: OpenAiFunctionDelta {
                                name: Some(name.as_str()),
                                arguments: Some(""),
                            },
                        }]),
                        ..self.delta_base()
                    };
                    self.role_sent = true;
                    self.chunk(delta, None, None).into_iter().collect()
                }
                // 文本和思考块在第一个增量时输出
                BlockType::Text | BlockType::Thinking => Vec::new(),
            },

            BlockEvent::BlockDelta { index, delta } => {
                let delta = match delta {
                    BlockDelta::Text(text) => OpenAiDelta {
                        content: Some(text.as_str()),
                        ..self.delta_base()
                    },
                    BlockDelta::Thinking(text) => OpenAiDelta {
                        reasoning_content: Some(text.as_str()),
                        ..self.delta_base()
                    },
                    BlockDelta::InputJson(partial) => {
                        let Some(tool_index) = self.tool_indices.get(index).copied() else {
                            return Vec::new();
                        };
                        OpenAiDelta {
                            tool_calls: Some(vec![OpenAiToolCallDelta {
                                index: tool_index,
                                id: None,
                                r#type: None,
                                function: OpenAiFunctionDelta {
                                    name: None,
                                    arguments: Some(partial.as_str()),
                                },
                            }]),
                            ..OpenAiDelta::default()
                        }
                    }
                };
                self.role_sent = true;
                self.chunk(delta, None, None).into_iter().collect()
            }

            // OpenAI 格式不需要单独的 content_block_stop 事件
            BlockEvent::BlockStop { .. } => Vec::new(),

            BlockEvent::Error {
                error_type,
                message,
            } => {
                let error_obj = serde_json::json!({
                    "error": {
                        "type": error_type,
                        "message": message,
                    }
                });
                vec![format!("data: {}\n\n", error_obj)]
            }

            BlockEvent::Completed { stop_reason, usage } => {
                let chunk = self
                    .chunk(OpenAiDelta::default(), Some(stop_reason), Some(usage))
                    .unwrap_or_default();
                vec![format!("{}{}", chunk, done_frame())]
            }
        }
    }

    /// 获取响应 ID
    pub fn response_id(&self) -> &str {
        &self.response_id
    }

    fn delta_base(&self) -> OpenAiDelta<'static> {
        OpenAiDelta {
            role: (!self.role_sent).then_some("assistant"),
            ..OpenAiDelta::default()
        }
    }

    fn chunk(
        &self,
        delta: OpenAiDelta<'_>,
        stop_reason: Option<&StopReason>,
        usage: Option<&Usage>,
    ) -> Option<String> {
        let chunk = OpenAiStreamChunk {
            id: &self.response_id,
            object: "chat.completion.chunk",
            created: self.created,
            model: &self.model,
            choices: vec![OpenAiChoice {
                index: 0,
                delta,
                finish_reason: stop_reason.map(StopReason::to_openai_str),
            }],
            usage: usage.map(OpenAiUsage::from),
        };
        match serde_json::to_string(&chunk) {
            Ok(json) => Some(format!("data: {}\n\n", json)),
            Err(e) => {
                tracing::warn!("[STREAM] OpenAI chunk 序列化失败: {}", e);
                None
            }
        }
    }
}

// ============================================================================
// OpenAI SSE 数据结构
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAiStreamChunk<'a> {
    id: &'a str,
    object: &'a str,
    created: i64,
    model: &'a str,
    choices: Vec<OpenAiChoice<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Serialize)]
struct OpenAiChoice<'a> {
    index: usize,
    delta: OpenAiDelta<'a>,
    finish_reason: Option<&'a str>,
}

#[derive(Debug, Default, Serialize)]
struct OpenAiDelta<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAiToolCallDelta<'a>>>,
}

#[derive(Debug, Serialize)]
struct OpenAiToolCallDelta<'a> {
    index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    r#type: Option<&'a str>,
    function: OpenAiFunctionDelta<'a>,
}

#[derive(Debug, Serialize)]
struct OpenAiFunctionDelta<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    arguments: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub(crate) struct OpenAiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    prompt_tokens_details: Option<CachedTokens>,
    #[serde(skip_serializing_if = "Option::is_none")]
    completion_tokens_details: Option<ReasoningTokens>,
}

#[derive(Debug, Serialize)]
struct CachedTokens {
    cached_tokens: u64,
}

#[derive(Debug, Serialize)]
struct ReasoningTokens {
    reasoning_tokens: u64,
}

impl From<&Usage> for OpenAiUsage {
    fn from(usage: &Usage) -> Self {
        Self {
            prompt_tokens: usage.input(),
            completion_tokens: usage.output(),
            total_tokens: usage.total(),
            prompt_tokens_details: usage
                .cached_tokens
                .map(|cached_tokens| CachedTokens { cached_tokens }),
            completion_tokens_details: usage
                .reasoning_tokens
                .map(|reasoning_tokens| ReasoningTokens { reasoning_tokens }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_text_delta() {
        let mut generator = OpenAiSseGenerator::new("gpt-4".to_string());
        let sse = generator.generate(&BlockEvent::BlockDelta {
            index: 0,
            delta: BlockDelta::Text("Hello".to_string()),
        });

        assert_eq!(sse.len(), 1);
        assert!(sse[0].starts_with("data: "));
        assert!(sse[0].contains("\"role\":\"assistant\""));
        assert!(sse[0].contains("\"content\":\"Hello\""));

        // role 只在第一个增量中出现
        let sse = generator.generate(&BlockEvent::BlockDelta {
            index: 0,
            delta: BlockDelta::Text("!".to_string()),
        });
        assert!(!sse[0].contains("\"role\""));
    }

    #[test]
    fn test_generate_tool_call() {
        let mut generator = OpenAiSseGenerator::new("gpt-4".to_string());

        let sse = generator.generate(&BlockEvent::BlockStart {
            index: 2,
            block: BlockType::ToolUse {
                id: "call_123".to_string(),
                name: "read_file".to_string(),
            },
        });
        assert!(sse[0].contains("\"tool_calls\":[{\"index\":0"));
        assert!(sse[0].contains("\"name\":\"read_file\""));

        let sse = generator.generate(&BlockEvent::BlockDelta {
            index: 2,
            delta: BlockDelta::InputJson("{\"path\":".to_string()),
        });
        assert!(sse[0].contains("\"arguments\":\"{\\\"path\\\":\""));
    }

    #[test]
    fn test_generate_completion() {
        let mut generator = OpenAiSseGenerator::new("gpt-4".to_string());
        let sse = generator.generate(&BlockEvent::Completed {
            stop_reason: StopReason::EndTurn,
            usage: Usage::new(3, 4),
        });

        assert_eq!(sse.len(), 1);
        assert!(sse[0].contains("\"finish_reason\":\"stop\""));
        assert!(sse[0].contains("\"prompt_tokens\":3"));
        assert!(sse[0].contains("\"total_tokens\":7"));
        assert!(sse[0].ends_with("data: [DONE]\n\n"));
    }
}
