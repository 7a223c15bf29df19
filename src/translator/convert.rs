//! 通用转换函数
//!
//! 每个格式对的转换器都是下面泛型函数的一个实例化，
//! 以客户端编解码器 `C` 和上游编解码器 `P` 作为类型参数，
//! 注册时强制转换为函数指针。

use super::traits::{TranslateContext, TranslateError};
use crate::protocol::{codex, parse_document, ClientProtocol, ProviderProtocol};
use crate::stream::StreamState;
use serde_json::Value;

/// 请求转换：客户端 reader → `ChatRequest` → 上游 writer
pub fn convert_request<C: ClientProtocol, P: ProviderProtocol>(
    model: &str,
    raw: &[u8],
    stream: bool,
) -> Result<Vec<u8>, TranslateError> {
    let root = parse_document(raw)?;
    let request = C::read_request(&root);
    let out = P::write_request(&request, model, stream);
    Ok(serde_json::to_vec(&out)?)
}

/// Responses 请求直通 Codex，只做规范化
pub fn normalize_codex_request(
    model: &str,
    raw: &[u8],
    stream: bool,
) -> Result<Vec<u8>, TranslateError> {
    let out = codex::normalize_request(raw, model, stream)?;
    Ok(serde_json::to_vec(&out)?)
}

/// 流式响应转换：上游 chunk → 客户端 SSE
pub fn convert_stream<C: ClientProtocol, P: ProviderProtocol>(
    ctx: &TranslateContext,
    model: &str,
    original_request: &[u8],
    _metadata: Option<&Value>,
    chunk: &[u8],
    state: &mut StreamState,
) -> Result<Vec<String>, TranslateError> {
    state.process(
        ctx,
        P::STREAM,
        C::FORMAT,
        model,
        || C::catalog(original_request),
        chunk,
    )
}

/// 非流式响应转换：上游文档 → 客户端文档
pub fn convert_non_stream<C: ClientProtocol, P: ProviderProtocol>(
    ctx: &TranslateContext,
    model: &str,
    original_request: &[u8],
    _metadata: Option<&Value>,
    raw: &[u8],
) -> Result<String, TranslateError> {
    let mut message = P::parse_response(raw)?;
    let catalog = C::catalog(original_request);
    let filtered = message.finalize(model, &ctx.tool_filter, &catalog);
    if filtered > 0 {
        tracing::debug!(
            "[TRANSLATOR] 请求 {} 非流式响应过滤了 {} 个工具调用",
            ctx.request_id(),
            filtered
        );
    }
    Ok(serde_json::to_string(&C::render_response(&message))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Claude, Codex, OpenAiChat};
    use serde_json::json;

    #[test]
    fn test_convert_request_rejects_non_object() {
        let err = convert_request::<Claude, Codex>("gpt-5", b"[]", false).unwrap_err();
        assert!(matches!(err, TranslateError::MalformedInput(_)));
    }

    #[test]
    fn test_convert_request_claude_to_openai() {
        let raw = serde_json::to_vec(&json!({
            "model": "claude-sonnet-4-5",
            "system": "sys",
            "max_tokens": 64,
            "messages": [{"role": "user", "content": "hi"}]
        }))
        .unwrap();
        let out = convert_request::<Claude, OpenAiChat>("gpt-4o", &raw, false).unwrap();
        let out: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(out["model"], "gpt-4o");
        assert_eq!(out["messages"][0]["role"], "system");
        assert_eq!(out["messages"][1]["content"], "hi");
        assert_eq!(out["max_tokens"], 64);
    }

    #[test]
    fn test_convert_non_stream_filters_and_restores() {
        let long = format!("mcp__server__{}", "a".repeat(70));
        let original = serde_json::to_vec(&json!({
            "messages": [],
            "tools": [{"name": long, "input_schema": {}}]
        }))
        .unwrap();
        let short = crate::protocol::build_short_name_map(&[long.clone()])[&long].clone();
        let raw = serde_json::to_vec(&json!({
            "id": "resp_1",
            "status": "completed",
            "output": [
                {"type": "function_call", "call_id": "c1", "name": "BashOutput", "arguments": "{}"},
                {"type": "function_call", "call_id": "c2", "name": short, "arguments": "{}"}
            ]
        }))
        .unwrap();

        let ctx = TranslateContext::new();
        let out =
            convert_non_stream::<Claude, Codex>(&ctx, "gpt-5", &original, None, &raw).unwrap();
        let out: Value = serde_json::from_str(&out).unwrap();
        let content = out["content"].as_array().unwrap();
        assert_eq!(content.len(), 1);
        assert_eq!(content[0]["name"], long);
        assert_eq!(out["stop_reason"], "tool_use");
        assert_eq!(out["model"], "gpt-5");
    }
}
