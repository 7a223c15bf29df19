//! Gemini SSE 生成器
//!
//! Gemini 流式响应的每个 chunk 都是一个完整的 `GenerateContentResponse`：
//!
//! ```text
//! data: {"candidates":[{"content":{"role":"model","parts":[{"text":"Hi"}]},"index":0}],"modelVersion":"..."}
//! ```
//!
//! 工具调用不支持增量，参数在块结束时一次性输出为 `functionCall`。
//! Gemini CLI 格式在外层再包一层 `{"response": ...}`。

use crate::stream::events::{BlockDelta, BlockEvent, BlockType, Usage};
use crate::stream::sse::frame;
use serde_json::{json, Value};

/// Gemini SSE 生成器
#[derive(Debug)]
pub struct GeminiSseGenerator {
    model: String,
    response_id: Option<String>,
    /// 是否使用 Gemini CLI 包装
    cli: bool,
}

impl GeminiSseGenerator {
    pub fn new(model: String, cli: bool) -> Self {
        Self {
            model,
            response_id: None,
            cli,
        }
    }

    pub fn generate(&mut self, event: &BlockEvent) -> Vec<String> {
        match event {
            BlockEvent::MessageStart { id, .. } => {
                if !id.is_empty() {
                    self.response_id = Some(id.clone());
                }
                Vec::new()
            }

            BlockEvent::BlockStart { .. } => Vec::new(),

            BlockEvent::BlockDelta { delta, .. } => match delta {
                BlockDelta::Text(text) => vec![self.chunk(vec![json!({ "text": text })], None, None)],
                BlockDelta::Thinking(text) => {
                    vec![self.chunk(vec![json!({ "text": text, "thought": true })], None, None)]
                }
                BlockDelta::InputJson(_) => Vec::new(),
            },

            BlockEvent::BlockStop { block, content, .. } => match block {
                BlockType::ToolUse { id, name } => {
                    let part = json!({
                        "functionCall": {
                            "id": id,
                            "name": name,
                            "args": parse_args(content)
                        }
                    });
                    vec![self.chunk(vec![part], None, None)]
                }
                BlockType::Text | BlockType::Thinking => Vec::new(),
            },

            BlockEvent::Error {
                error_type,
                message,
            } => {
                let error = json!({
                    "error": {
                        "status": error_type,
                        "message": message
                    }
                });
                vec![frame(None, &error)]
            }

            BlockEvent::Completed { stop_reason, usage } => {
                vec![self.chunk(Vec::new(), Some(stop_reason.to_gemini_str()), Some(usage))]
            }
        }
    }

    fn chunk(&self, parts: Vec<Value>, finish_reason: Option<String>, usage: Option<&Usage>) -> String {
        let mut candidate = json!({
            "content": {
                "role": "model",
                "parts": parts
            },
            "index": 0
        });
        if let Some(reason) = finish_reason {
            candidate["finishReason"] = json!(reason);
        }

        let mut response = json!({ "candidates": [candidate] });
        if let Some(usage) = usage {
            response["usageMetadata"] = render_usage(usage);
        }
        response["modelVersion"] = json!(self.model);
        if let Some(id) = &self.response_id {
            response["responseId"] = json!(id);
        }

        if self.cli {
            frame(None, &json!({ "response": response }))
        } else {
            frame(None, &response)
        }
    }
}

/// 参数 JSON 文本转为对象，无效时输出空对象
pub(crate) fn parse_args(arguments: &str) -> Value {
    if arguments.trim().is_empty() {
        return json!({});
    }
    match serde_json::from_str::<Value>(arguments) {
        Ok(value) if value.is_object() => value,
        Ok(_) | Err(_) => {
            tracing::debug!("[TRANSLATOR] 工具参数不是 JSON 对象，使用空对象: {}", arguments);
            json!({})
        }
    }
}

/// Gemini `usageMetadata`
pub(crate) fn render_usage(usage: &Usage) -> Value {
    let mut out = json!({
        "promptTokenCount": usage.input(),
        "candidatesTokenCount": usage.output(),
        "totalTokenCount": usage.total()
    });
    if let Some(reasoning) = usage.reasoning_tokens {
        out["thoughtsTokenCount"] = json!(reasoning);
    }
    if let Some(cached) = usage.cached_tokens {
        out["cachedContentTokenCount"] = json!(cached);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::events::StopReason;

    fn data_of(frame: &str) -> Value {
        serde_json::from_str(frame.trim().strip_prefix("data: ").unwrap()).unwrap()
    }

    #[test]
    fn test_text_chunk() {
        let mut generator = GeminiSseGenerator::new("gemini-2.5-pro".to_string(), false);
        let sse = generator.generate(&BlockEvent::BlockDelta {
            index: 0,
            delta: BlockDelta::Text("Hi".to_string()),
        });
        let data = data_of(&sse[0]);
        assert_eq!(data["candidates"][0]["content"]["parts"][0]["text"], "Hi");
        assert_eq!(data["modelVersion"], "gemini-2.5-pro");
    }

    #[test]
    fn test_function_call_emitted_at_stop() {
        let mut generator = GeminiSseGenerator::new("m".to_string(), false);
        let block = BlockType::ToolUse {
            id: "call_1".to_string(),
            name: "Read".to_string(),
        };
        assert!(generator
            .generate(&BlockEvent::BlockStart {
                index: 0,
                block: block.clone()
            })
            .is_empty());
        assert!(generator
            .generate(&BlockEvent::BlockDelta {
                index: 0,
                delta: BlockDelta::InputJson("{\"p\":1}".to_string())
            })
            .is_empty());

        let sse = generator.generate(&BlockEvent::BlockStop {
            index: 0,
            block,
            content: "{\"p\":1}".to_string(),
        });
        let data = data_of(&sse[0]);
        let call = &data["candidates"][0]["content"]["parts"][0]["functionCall"];
        assert_eq!(call["name"], "Read");
        assert_eq!(call["args"]["p"], 1);
    }

    #[test]
    fn test_cli_wrapping_and_finish() {
        let mut generator = GeminiSseGenerator::new("m".to_string(), true);
        let sse = generator.generate(&BlockEvent::Completed {
            stop_reason: StopReason::MaxTokens,
            usage: Usage::new(1, 2),
        });
        let data = data_of(&sse[0]);
        assert_eq!(data["response"]["candidates"][0]["finishReason"], "MAX_TOKENS");
        assert_eq!(data["response"]["usageMetadata"]["totalTokenCount"], 3);
    }

    #[test]
    fn test_parse_args_invalid() {
        assert_eq!(parse_args("not json"), json!({}));
        assert_eq!(parse_args(""), json!({}));
        assert_eq!(parse_args("{\"a\":1}"), json!({"a": 1}));
    }
}
