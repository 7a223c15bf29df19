//! Codex 上游的转换器注册
//!
//! | 客户端 | 请求 | 响应 |
//! |---|---|---|
//! | openai | chat → responses | Codex 事件 → chat chunk |
//! | claude | messages → responses | Codex 事件 → Claude SSE |
//! | openai-responses | responses 规范化 | Codex 事件 → Responses SSE |
//! | gemini / gemini-cli | gemini → responses | Codex 事件 → Gemini |

use super::convert::normalize_codex_request;
use super::registry::TranslatorRegistry;
use crate::protocol::{Claude, Codex, Gemini, GeminiCli, OpenAiChat, Responses};

pub fn register(registry: &mut TranslatorRegistry) {
    registry.register_pair::<OpenAiChat, Codex>();
    registry.register_pair::<Claude, Codex>();
    registry.register_pair_with::<Responses, Codex>(normalize_codex_request);
    registry.register_pair::<Gemini, Codex>();
    registry.register_pair::<GeminiCli, Codex>();
}

#[cfg(test)]
mod tests {
    use crate::models::Format;
    use crate::translator::{TranslateContext, TranslatorRegistry};
    use crate::stream::StreamState;
    use serde_json::{json, Value};

    #[test]
    fn test_openai_to_codex_request() {
        let registry = TranslatorRegistry::with_defaults();
        let raw = serde_json::to_vec(&json!({
            "model": "gpt-4o",
            "messages": [
                {"role": "system", "content": "sys"},
                {"role": "user", "content": "hi"}
            ],
            "temperature": 0.3
        }))
        .unwrap();
        let out = registry
            .translate_request(Format::OpenAI, Format::Codex, "gpt-5-codex", &raw, true)
            .unwrap();
        let out: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(out["model"], "gpt-5-codex");
        assert_eq!(out["instructions"], "sys");
        assert_eq!(out["input"][0]["role"], "user");
        assert_eq!(out["stream"], true);
        assert!(out.get("temperature").is_none());
    }

    #[test]
    fn test_codex_stream_to_gemini_cli() {
        let registry = TranslatorRegistry::with_defaults();
        let ctx = TranslateContext::new();
        let mut state = StreamState::new();
        let chunks = [
            r#"data: {"type":"response.output_text.delta","output_index":0,"delta":"Hi"}"#,
            r#"data: {"type":"response.completed","response":{"status":"completed","usage":{"input_tokens":1,"output_tokens":1}}}"#,
        ];
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend(
                registry
                    .translate_stream(
                        Format::GeminiCli,
                        Format::Codex,
                        &ctx,
                        "gpt-5",
                        b"{}",
                        None,
                        chunk.as_bytes(),
                        &mut state,
                    )
                    .unwrap(),
            );
        }
        assert_eq!(out.len(), 2);
        assert!(out[0].contains("\"response\":{\"candidates\""));
        assert!(out[1].contains("\"finishReason\":\"STOP\""));
    }
}
