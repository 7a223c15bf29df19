//! OpenAI Chat Completions chunk 解析器
//!
//! ```text
//! data: {"id":"chatcmpl-1","object":"chat.completion.chunk","choices":[{"index":0,"delta":{"content":"Hi"},"finish_reason":null}]}
//!
//! data: [DONE]
//! ```
//!
//! OpenAI 上游从不显式结束工具调用，`finish_reason` 作为停止原因提示，
//! `[DONE]` 才是完成事件。

use super::parse_payload;
use crate::protocol::field::str_or_empty;
use crate::protocol::openai;
use crate::stream::events::{StopReason, StreamEvent, ToolKey};
use crate::stream::sse::DONE;
use crate::translator::TranslateError;
use serde_json::Value;

/// 解析一个 chunk 负载
pub fn parse_chunk(data: &str) -> Result<Vec<StreamEvent>, TranslateError> {
    if data == DONE {
        return Ok(vec![StreamEvent::MessageStop {
            stop_reason: None,
            usage: None,
        }]);
    }
    let value = parse_payload(data)?;
    let mut events = Vec::new();

    if let Some(error) = value.get("error").filter(|e| e.is_object()) {
        events.push(StreamEvent::Error {
            error_type: error
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("api_error")
                .to_string(),
            message: str_or_empty(error, "message").to_string(),
        });
        return Ok(events);
    }

    let id = str_or_empty(&value, "id");
    if !id.is_empty() {
        events.push(StreamEvent::MessageStart {
            id: id.to_string(),
            model: str_or_empty(&value, "model").to_string(),
        });
    }

    let choice = value
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first());

    if let Some(choice) = choice {
        let delta = choice.get("delta").unwrap_or(&Value::Null);

        for key in ["reasoning_content", "reasoning"] {
            if let Some(text) = delta.get(key).and_then(Value::as_str) {
                events.push(StreamEvent::ThinkingDelta {
                    text: text.to_string(),
                });
            }
        }

        if let Some(text) = delta.get("content").and_then(Value::as_str) {
            events.push(StreamEvent::TextDelta {
                text: text.to_string(),
            });
        }

        if let Some(tool_calls) = delta.get("tool_calls").and_then(Value::as_array) {
            for (ordinal, call) in tool_calls.iter().enumerate() {
                let position = call
                    .get("index")
                    .and_then(Value::as_u64)
                    .unwrap_or(ordinal as u64);
                let function = call.get("function").unwrap_or(&Value::Null);

                let call_id = str_or_empty(call, "id");
                if !call_id.is_empty() {
                    events.push(StreamEvent::ToolUseStart {
                        key: ToolKey::with_call_id(Some(position), call_id),
                        id: call_id.to_string(),
                        name: str_or_empty(function, "name").to_string(),
                    });
                }

                let arguments = str_or_empty(function, "arguments");
                if !arguments.is_empty() {
                    events.push(StreamEvent::ToolUseInputDelta {
                        key: ToolKey::at(position),
                        partial_json: arguments.to_string(),
                    });
                }
            }
        }

        if let Some(reason) = choice.get("finish_reason").and_then(Value::as_str) {
            events.push(StreamEvent::StopHint(StopReason::from_str(reason)));
        }
    }

    if let Some(usage) = value.get("usage").filter(|u| u.is_object()) {
        events.push(StreamEvent::Usage(openai::parse_usage(usage)));
    }

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::events::Usage;

    #[test]
    fn test_text_chunk() {
        let events = parse_chunk(
            r#"{"id":"chatcmpl-1","model":"gpt-4o","choices":[{"index":0,"delta":{"role":"assistant","content":"Hi"},"finish_reason":null}]}"#,
        )
        .unwrap();
        assert_eq!(
            events,
            vec![
                StreamEvent::MessageStart {
                    id: "chatcmpl-1".to_string(),
                    model: "gpt-4o".to_string()
                },
                StreamEvent::TextDelta {
                    text: "Hi".to_string()
                }
            ]
        );
    }

    #[test]
    fn test_tool_call_chunks() {
        let events = parse_chunk(
            r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"id":"call_1","type":"function","function":{"name":"Read","arguments":""}}]}}]}"#,
        )
        .unwrap();
        assert_eq!(
            events,
            vec![StreamEvent::ToolUseStart {
                key: ToolKey::with_call_id(Some(0), "call_1"),
                id: "call_1".to_string(),
                name: "Read".to_string()
            }]
        );

        let events = parse_chunk(
            r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"p\":1}"}}]}}]}"#,
        )
        .unwrap();
        assert_eq!(
            events,
            vec![StreamEvent::ToolUseInputDelta {
                key: ToolKey::at(0),
                partial_json: "{\"p\":1}".to_string()
            }]
        );
    }

    #[test]
    fn test_finish_reason_and_usage() {
        let events = parse_chunk(
            r#"{"choices":[{"index":0,"delta":{},"finish_reason":"tool_calls"}]}"#,
        )
        .unwrap();
        assert_eq!(events, vec![StreamEvent::StopHint(StopReason::ToolUse)]);

        let events = parse_chunk(
            r#"{"choices":[],"usage":{"prompt_tokens":3,"completion_tokens":4,"total_tokens":7}}"#,
        )
        .unwrap();
        assert_eq!(
            events,
            vec![StreamEvent::Usage(Usage {
                input_tokens: Some(3),
                output_tokens: Some(4),
                total_tokens: Some(7),
                ..Default::default()
            })]
        );
    }

    #[test]
    fn test_done_is_completion() {
        assert_eq!(
            parse_chunk("[DONE]").unwrap(),
            vec![StreamEvent::MessageStop {
                stop_reason: None,
                usage: None
            }]
        );
    }

    #[test]
    fn test_non_object_is_malformed() {
        assert!(matches!(
            parse_chunk("[1,2]").unwrap_err(),
            TranslateError::MalformedInput(_)
        ));
    }
}
