//! Anthropic Messages SSE 解析器

use super::{event_type, parse_payload};
use crate::protocol::claude;
use crate::protocol::field::str_or_empty;
use crate::stream::events::{StopReason, StreamEvent, ToolKey};
use crate::stream::sse::DONE;
use crate::translator::TranslateError;
use serde_json::Value;

/// 解析一个 Anthropic 事件负载
pub fn parse_event(data: &str) -> Result<Vec<StreamEvent>, TranslateError> {
    if data == DONE {
        return Ok(Vec::new());
    }
    let value = parse_payload(data)?;
    let index = value.get("index").and_then(Value::as_u64);

    let events = match event_type(&value)? {
        "message_start" => {
            let message = value.get("message").unwrap_or(&Value::Null);
            let mut events = vec![StreamEvent::MessageStart {
                id: str_or_empty(message, "id").to_string(),
                model: str_or_empty(message, "model").to_string(),
            }];
            if let Some(usage) = message.get("usage") {
                events.push(StreamEvent::Usage(claude::parse_usage(usage)));
            }
            events
        }

        "content_block_start" => {
            let block = value.get("content_block").unwrap_or(&Value::Null);
            match str_or_empty(block, "type") {
                "tool_use" | "server_tool_use" => {
                    let id = str_or_empty(block, "id");
                    vec![StreamEvent::ToolUseStart {
                        key: ToolKey::with_call_id(index, id),
                        id: id.to_string(),
                        name: str_or_empty(block, "name").to_string(),
                    }]
                }
                "text" => vec![StreamEvent::TextDelta {
                    text: str_or_empty(block, "text").to_string(),
                }],
                "thinking" => vec![StreamEvent::ThinkingDelta {
                    text: str_or_empty(block, "thinking").to_string(),
                }],
                _ => Vec::new(),
            }
        }

        "content_block_delta" => {
            let delta = value.get("delta").unwrap_or(&Value::Null);
            match str_or_empty(delta, "type") {
                "text_delta" => vec![StreamEvent::TextDelta {
                    text: str_or_empty(delta, "text").to_string(),
                }],
                "thinking_delta" => vec![StreamEvent::ThinkingDelta {
                    text: str_or_empty(delta, "thinking").to_string(),
                }],
                "input_json_delta" => vec![StreamEvent::ToolUseInputDelta {
                    key: ToolKey {
                        position: index,
                        call_id: None,
                    },
                    partial_json: str_or_empty(delta, "partial_json").to_string(),
                }],
                _ => Vec::new(),
            }
        }

        "content_block_stop" => match index {
            Some(position) => vec![StreamEvent::ContentStop { position }],
            None => Vec::new(),
        },

        "message_delta" => {
            let mut events = Vec::new();
            if let Some(usage) = value.get("usage") {
                events.push(StreamEvent::Usage(claude::parse_usage(usage)));
            }
            if let Some(reason) = value
                .get("delta")
                .and_then(|d| d.get("stop_reason"))
                .and_then(Value::as_str)
            {
                events.push(StreamEvent::StopHint(StopReason::from_str(reason)));
            }
            events
        }

        "message_stop" => vec![StreamEvent::MessageStop {
            stop_reason: None,
            usage: None,
        }],

        "error" => {
            let error = value.get("error").unwrap_or(&Value::Null);
            vec![StreamEvent::Error {
                error_type: str_or_empty(error, "type").to_string(),
                message: str_or_empty(error, "message").to_string(),
            }]
        }

        // ping 及未知事件
        _ => Vec::new(),
    };
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::events::Usage;

    #[test]
    fn test_message_start_with_usage() {
        let events = parse_event(
            r#"{"type":"message_start","message":{"id":"msg_1","model":"claude-sonnet-4-5","usage":{"input_tokens":12,"output_tokens":1}}}"#,
        )
        .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1],
            StreamEvent::Usage(Usage {
                input_tokens: Some(12),
                output_tokens: Some(1),
                ..Default::default()
            })
        );
    }

    #[test]
    fn test_tool_use_block() {
        let events = parse_event(
            r#"{"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"toolu_1","name":"Read","input":{}}}"#,
        )
        .unwrap();
        assert_eq!(
            events,
            vec![StreamEvent::ToolUseStart {
                key: ToolKey::with_call_id(Some(1), "toolu_1"),
                id: "toolu_1".to_string(),
                name: "Read".to_string()
            }]
        );

        let events = parse_event(
            r#"{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{\"p\":"}}"#,
        )
        .unwrap();
        assert_eq!(
            events,
            vec![StreamEvent::ToolUseInputDelta {
                key: ToolKey::at(1),
                partial_json: "{\"p\":".to_string()
            }]
        );

        let events = parse_event(r#"{"type":"content_block_stop","index":1}"#).unwrap();
        assert_eq!(events, vec![StreamEvent::ContentStop { position: 1 }]);
    }

    #[test]
    fn test_message_delta_stop_hint() {
        let events = parse_event(
            r#"{"type":"message_delta","delta":{"stop_reason":"max_tokens","stop_sequence":null},"usage":{"output_tokens":42}}"#,
        )
        .unwrap();
        assert_eq!(
            events,
            vec![
                StreamEvent::Usage(Usage {
                    output_tokens: Some(42),
                    ..Default::default()
                }),
                StreamEvent::StopHint(StopReason::MaxTokens)
            ]
        );
    }

    #[test]
    fn test_ping_and_stop() {
        assert!(parse_event(r#"{"type":"ping"}"#).unwrap().is_empty());
        assert!(matches!(
            parse_event(r#"{"type":"message_stop"}"#).unwrap()[0],
            StreamEvent::MessageStop { .. }
        ));
    }
}
