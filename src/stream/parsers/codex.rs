//! Codex / Responses 事件解析器
//!
//! ```text
//! event: response.output_item.added
//! data: {"type":"response.output_item.added","output_index":1,"item":{"type":"function_call","call_id":"call_1","name":"Read",...}}
//! ```

use super::{event_type, parse_payload};
use crate::protocol::field::str_or_empty;
use crate::protocol::responses;
use crate::stream::events::{StopReason, StreamEvent, ToolKey};
use crate::stream::sse::DONE;
use crate::translator::TranslateError;
use serde_json::Value;

/// 解析一个 Codex 事件负载
pub fn parse_event(data: &str) -> Result<Vec<StreamEvent>, TranslateError> {
    if data == DONE {
        return Ok(Vec::new());
    }
    let value = parse_payload(data)?;
    let kind = event_type(&value)?;
    let output_index = value.get("output_index").and_then(Value::as_u64);

    let events = match kind {
        "response.created" => {
            let response = value.get("response").unwrap_or(&Value::Null);
            vec![StreamEvent::MessageStart {
                id: str_or_empty(response, "id").to_string(),
                model: str_or_empty(response, "model").to_string(),
            }]
        }

        "response.output_text.delta" => vec![StreamEvent::TextDelta {
            text: str_or_empty(&value, "delta").to_string(),
        }],

        "response.content_part.done" => vec![StreamEvent::TextStop],

        "response.reasoning_summary_text.delta" => vec![StreamEvent::ThinkingDelta {
            text: str_or_empty(&value, "delta").to_string(),
        }],

        // 多段推理摘要之间插入空行
        "response.reasoning_summary_part.added" => {
            match value.get("summary_index").and_then(Value::as_u64) {
                Some(i) if i > 0 => vec![StreamEvent::ThinkingDelta {
                    text: "\n\n".to_string(),
                }],
                _ => Vec::new(),
            }
        }

        "response.output_item.added" => {
            let item = value.get("item").unwrap_or(&Value::Null);
            if str_or_empty(item, "type") == "function_call" {
                let call_id = str_or_empty(item, "call_id");
                vec![StreamEvent::ToolUseStart {
                    key: ToolKey::with_call_id(output_index, call_id),
                    id: call_id.to_string(),
                    name: str_or_empty(item, "name").to_string(),
                }]
            } else {
                Vec::new()
            }
        }

        "response.function_call_arguments.delta" => vec![StreamEvent::ToolUseInputDelta {
            key: ToolKey {
                position: output_index,
                call_id: None,
            },
            partial_json: str_or_empty(&value, "delta").to_string(),
        }],

        "response.output_item.done" => {
            let item = value.get("item").unwrap_or(&Value::Null);
            match str_or_empty(item, "type") {
                "function_call" => vec![StreamEvent::ToolUseStop {
                    key: ToolKey::with_call_id(output_index, str_or_empty(item, "call_id")),
                    arguments: item
                        .get("arguments")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                }],
                "message" => vec![StreamEvent::TextStop],
                "reasoning" => vec![StreamEvent::ThinkingStop],
                _ => Vec::new(),
            }
        }

        "response.completed" | "response.incomplete" | "response.failed" => {
            let response = value.get("response").unwrap_or(&Value::Null);
            let mut events = Vec::new();
            if kind == "response.failed" {
                let error = response.get("error").unwrap_or(&Value::Null);
                events.push(StreamEvent::Error {
                    error_type: error
                        .get("code")
                        .and_then(Value::as_str)
                        .unwrap_or("api_error")
                        .to_string(),
                    message: str_or_empty(error, "message").to_string(),
                });
            }
            let stop_reason = match kind {
                "response.failed" => Some(StopReason::Other("error".to_string())),
                "response.incomplete" => Some(responses::incomplete_reason(response)),
                _ => responses::parse_status(response),
            };
            events.push(StreamEvent::MessageStop {
                stop_reason,
                usage: response.get("usage").map(responses::parse_usage),
            });
            events
        }

        "error" => vec![StreamEvent::Error {
            error_type: value
                .get("code")
                .and_then(Value::as_str)
                .unwrap_or("api_error")
                .to_string(),
            message: str_or_empty(&value, "message").to_string(),
        }],

        _ => Vec::new(),
    };
    Ok(events)
}
