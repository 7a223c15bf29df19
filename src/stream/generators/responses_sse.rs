//! OpenAI Responses SSE 生成器
//!
//! ```text
//! event: response.output_item.added
//! data: {"type":"response.output_item.added","sequence_number":3,"output_index":0,"item":{...}}
//!
//! event: response.output_text.delta
//! data: {"type":"response.output_text.delta","sequence_number":4,"item_id":"msg_x","output_index":0,"content_index":0,"delta":"Hi"}
//! ```
//!
//! 下游块索引直接作为 `output_index`（被过滤的调用不占用索引，所以连续）。

use crate::stream::events::{BlockDelta, BlockEvent, BlockType, StopReason, Usage};
use crate::stream::sse::frame;
use serde_json::{json, Value};
use std::collections::HashMap;
use uuid::Uuid;

/// Responses SSE 生成器
#[derive(Debug)]
pub struct ResponsesSseGenerator {
    response_id: String,
    model: String,
    created_at: i64,
    sequence: u64,
    /// 下游块索引 -> 输出项 ID
    item_ids: HashMap<u32, String>,
    /// 已完成的输出项，用于 response.completed
    output: Vec<Value>,
}

impl Default for ResponsesSseGenerator {
    fn default() -> Self {
        Self::new("unknown".to_string())
    }
}

impl ResponsesSseGenerator {
    pub fn new(model: String) -> Self {
        Self {
            response_id: format!("resp_{}", Uuid::new_v4().simple()),
            model,
            created_at: chrono::Utc::now().timestamp(),
            sequence: 0,
            item_ids: HashMap::new(),
            output: Vec::new(),
        }
    }

    pub fn generate(&mut self, event: &BlockEvent) -> Vec<String> {
        match event {
            BlockEvent::MessageStart { id, model } => {
                if !id.is_empty() {
                    self.response_id = id.clone();
                }
                if !model.is_empty() {
                    self.model = model.clone();
                }
                let response = self.response_object("in_progress", Vec::new(), None, None);
                vec![
                    self.event("response.created", json!({ "response": response.clone() })),
                    self.event("response.in_progress", json!({ "response": response })),
                ]
            }

            BlockEvent::BlockStart { index, block } => self.block_start(*index, block),

            BlockEvent::BlockDelta { index, delta } => {
                let item_id = self.item_id(*index);
                match delta {
                    BlockDelta::Text(text) => vec![self.event(
                        "response.output_text.delta",
                        json!({
                            "item_id": item_id,
                            "output_index": index,
                            "content_index": 0,
                            "delta": text
                        }),
                    )],
                    BlockDelta::Thinking(text) => vec![self.event(
                        "response.reasoning_summary_text.delta",
                        json!({
                            "item_id": item_id,
                            "output_index": index,
                            "summary_index": 0,
                            "delta": text
                        }),
                    )],
                    BlockDelta::InputJson(partial) => vec![self.event(
                        "response.function_call_arguments.delta",
                        json!({
                            "item_id": item_id,
                            "output_index": index,
                            "delta": partial
                        }),
                    )],
                }
            }

            BlockEvent::BlockStop {
                index,
                block,
                content,
            } => self.block_stop(*index, block, content),

            BlockEvent::Error {
                error_type,
                message,
            } => vec![self.event(
                "error",
                json!({
                    "code": error_type,
                    "message": message
                }),
            )],

            BlockEvent::Completed { stop_reason, usage } => {
                let incomplete = stop_reason.to_responses_incomplete();
                let status = match (stop_reason, incomplete) {
                    (StopReason::Other(s), _) if s == "error" => "failed",
                    (_, Some(_)) => "incomplete",
                    _ => "completed",
                };
                let response = self.response_object(
                    status,
                    self.output.clone(),
                    Some(usage),
                    incomplete.map(|reason| json!({ "reason": reason })),
                );
                let kind = match status {
                    "failed" => "response.failed",
                    "incomplete" => "response.incomplete",
                    _ => "response.completed",
                };
                vec![self.event(kind, json!({ "response": response }))]
            }
        }
    }

    fn block_start(&mut self, index: u32, block: &BlockType) -> Vec<String> {
        match block {
            BlockType::Text => {
                let item_id = self.new_item_id(index, "msg");
                vec![
                    self.event(
                        "response.output_item.added",
                        json!({
                            "output_index": index,
                            "item": {
                                "id": item_id,
                                "type": "message",
                                "status": "in_progress",
                                "role": "assistant",
                                "content": []
                            }
                        }),
                    ),
                    self.event(
                        "response.content_part.added",
                        json!({
                            "item_id": item_id,
                            "output_index": index,
                            "content_index": 0,
                            "part": {"type": "output_text", "text": "", "annotations": []}
                        }),
                    ),
                ]
            }
            BlockType::Thinking => {
                let item_id = self.new_item_id(index, "rs");
                vec![
                    self.event(
                        "response.output_item.added",
                        json!({
                            "output_index": index,
                            "item": {"id": item_id, "type": "reasoning", "summary": []}
                        }),
                    ),
                    self.event(
                        "response.reasoning_summary_part.added",
                        json!({
                            "item_id": item_id,
                            "output_index": index,
                            "summary_index": 0,
                            "part": {"type": "summary_text", "text": ""}
                        }),
                    ),
                ]
            }
            BlockType::ToolUse { id, name } => {
                let item_id = self.new_item_id(index, "fc");
                vec![self.event(
                    "response.output_item.added",
                    json!({
                        "output_index": index,
                        "item": {
                            "id": item_id,
                            "type": "function_call",
                            "status": "in_progress",
                            "arguments": "",
                            "call_id": id,
                            "name": name
                        }
                    }),
                )]
            }
        }
    }

    fn block_stop(&mut self, index: u32, block: &BlockType, content: &str) -> Vec<String> {
        let item_id = self.item_id(index);
        match block {
            BlockType::Text => {
                let part = json!({"type": "output_text", "text": content, "annotations": []});
                let item = json!({
                    "id": item_id,
                    "type": "message",
                    "status": "completed",
                    "role": "assistant",
                    "content": [part.clone()]
                });
                self.output.push(item.clone());
                vec![
                    self.event(
                        "response.output_text.done",
                        json!({
                            "item_id": item_id,
                            "output_index": index,
                            "content_index": 0,
                            "text": content
                        }),
                    ),
                    self.event(
                        "response.content_part.done",
                        json!({
                            "item_id": item_id,
                            "output_index": index,
                            "content_index": 0,
                            "part": part
                        }),
                    ),
                    self.event(
                        "response.output_item.done",
                        json!({ "output_index": index, "item": item }),
                    ),
                ]
            }
            BlockType::Thinking => {
                let part = json!({"type": "summary_text", "text": content});
                let item = json!({
                    "id": item_id,
                    "type": "reasoning",
                    "summary": [part.clone()]
                });
                self.output.push(item.clone());
                vec![
                    self.event(
                        "response.reasoning_summary_text.done",
                        json!({
                            "item_id": item_id,
                            "output_index": index,
                            "summary_index": 0,
                            "text": content
                        }),
                    ),
                    self.event(
                        "response.reasoning_summary_part.done",
                        json!({
                            "item_id": item_id,
                            "output_index": index,
                            "summary_index": 0,
                            "part": part
                        }),
                    ),
                    self.event(
                        "response.output_item.done",
                        json!({ "output_index": index, "item": item }),
                    ),
                ]
            }
            BlockType::ToolUse { id, name } => {
                let item = json!({
                    "id": item_id,
                    "type": "function_call",
                    "status": "completed",
                    "arguments": content,
                    "call_id": id,
                    "name": name
                });
                self.output.push(item.clone());
                vec![
                    self.event(
                        "response.function_call_arguments.done",
                        json!({
                            "item_id": item_id,
                            "output_index": index,
                            "arguments": content
                        }),
                    ),
                    self.event(
                        "response.output_item.done",
                        json!({ "output_index": index, "item": item }),
                    ),
                ]
            }
        }
    }

    fn new_item_id(&mut self, index: u32, prefix: &str) -> String {
        let id = format!("{}_{}", prefix, Uuid::new_v4().simple());
        self.item_ids.insert(index, id.clone());
        id
    }

    fn item_id(&self, index: u32) -> String {
        self.item_ids.get(&index).cloned().unwrap_or_default()
    }

    fn response_object(
        &self,
        status: &str,
        output: Vec<Value>,
        usage: Option<&Usage>,
        incomplete_details: Option<Value>,
    ) -> Value {
        let mut response = json!({
            "id": self.response_id,
            "object": "response",
            "created_at": self.created_at,
            "status": status,
            "model": self.model,
            "output": output
        });
        if let Some(details) = incomplete_details {
            response["incomplete_details"] = details;
        }
        if let Some(usage) = usage {
            response["usage"] = render_usage(usage);
        }
        response
    }

    /// 带 `type` 和 `sequence_number` 的事件帧
    fn event(&mut self, kind: &str, body: Value) -> String {
        let mut data = json!({
            "type": kind,
            "sequence_number": self.sequence
        });
        self.sequence += 1;
        if let (Some(target), Value::Object(fields)) = (data.as_object_mut(), body) {
            target.extend(fields);
        }
        frame(Some(kind), &data)
    }
}

/// Responses 使用量对象
pub(crate) fn render_usage(usage: &Usage) -> Value {
    json!({
        "input_tokens": usage.input(),
        "input_tokens_details": {"cached_tokens": usage.cached_tokens.unwrap_or(0)},
        "output_tokens": usage.output(),
        "output_tokens_details": {"reasoning_tokens": usage.reasoning_tokens.unwrap_or(0)},
        "total_tokens": usage.total()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_of(frame: &str) -> Value {
        let line = frame
            .lines()
            .find_map(|l| l.strip_prefix("data: "))
            .unwrap();
        serde_json::from_str(line).unwrap()
    }

    #[test]
    fn test_text_item_lifecycle() {
        let mut generator = ResponsesSseGenerator::new("gpt-4o".to_string());

        let sse = generator.generate(&BlockEvent::BlockStart {
            index: 0,
            block: BlockType::Text,
        });
        assert_eq!(sse.len(), 2);
        assert!(sse[0].starts_with("event: response.output_item.added\n"));

        let sse = generator.generate(&BlockEvent::BlockDelta {
            index: 0,
            delta: BlockDelta::Text("Hi".to_string()),
        });
        let data = data_of(&sse[0]);
        assert_eq!(data["type"], "response.output_text.delta");
        assert_eq!(data["delta"], "Hi");
        assert_eq!(data["sequence_number"], 2);

        let sse = generator.generate(&BlockEvent::BlockStop {
            index: 0,
            block: BlockType::Text,
            content: "Hi".to_string(),
        });
        assert_eq!(sse.len(), 3);
        assert_eq!(data_of(&sse[2])["item"]["content"][0]["text"], "Hi");
    }

    #[test]
    fn test_completed_includes_output_and_usage() {
        let mut generator = ResponsesSseGenerator::new("gpt-4o".to_string());
        generator.generate(&BlockEvent::BlockStart {
            index: 0,
            block: BlockType::ToolUse {
                id: "call_1".to_string(),
                name: "Read".to_string(),
            },
        });
        generator.generate(&BlockEvent::BlockStop {
            index: 0,
            block: BlockType::ToolUse {
                id: "call_1".to_string(),
                name: "Read".to_string(),
            },
            content: "{}".to_string(),
        });

        let sse = generator.generate(&BlockEvent::Completed {
            stop_reason: StopReason::ToolUse,
            usage: Usage::new(5, 6),
        });
        assert_eq!(sse.len(), 1);
        let data = data_of(&sse[0]);
        assert_eq!(data["type"], "response.completed");
        assert_eq!(data["response"]["status"], "completed");
        assert_eq!(data["response"]["output"][0]["call_id"], "call_1");
        assert_eq!(data["response"]["usage"]["total_tokens"], 11);
    }

    #[test]
    fn test_max_tokens_is_incomplete() {
        let mut generator = ResponsesSseGenerator::default();
        let sse = generator.generate(&BlockEvent::Completed {
            stop_reason: StopReason::MaxTokens,
            usage: Usage::default(),
        });
        let data = data_of(&sse[0]);
        assert_eq!(data["type"], "response.incomplete");
        assert_eq!(
            data["response"]["incomplete_details"]["reason"],
            "max_output_tokens"
        );
    }
}
