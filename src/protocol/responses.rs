//! OpenAI Responses 编解码
//!
//! 客户端侧的 Responses 请求读取与响应渲染，以及 Codex 上游共用的
//! 响应对象解析（`output` 项、`status`、`usage`）。

use super::field::{
    array_field, bool_field, f64_field, object_field, str_field, str_or_empty, u64_field,
    value_to_text,
};
use super::ClientProtocol;
use crate::models::{
    ChatRequest, ContentBlock, ContentPart, ConversationItem, Format, GenerationParams,
    ImageSource, ResponseMessage, Role, ToolChoice, ToolDefinition,
};
use crate::stream::generators::responses_sse::render_usage;
use crate::stream::{StopReason, Usage};
use serde_json::{json, Value};
use uuid::Uuid;

/// OpenAI Responses 格式（客户端侧）
#[derive(Debug, Clone, Copy, Default)]
pub struct Responses;

impl ClientProtocol for Responses {
    const FORMAT: Format = Format::OpenAIResponses;

    fn read_request(root: &Value) -> ChatRequest {
        read_request(root)
    }

    fn render_response(message: &ResponseMessage) -> Value {
        render_response(message)
    }
}

// ============================================================================
// 请求读取
// ============================================================================

fn read_request(root: &Value) -> ChatRequest {
    let mut request = ChatRequest {
        instructions: str_field(root, "instructions")
            .ok("instructions")
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        ..Default::default()
    };

    match root.get("input") {
        Some(Value::String(text)) => request.items.push(ConversationItem::text(Role::User, text.clone())),
        Some(Value::Array(items)) => {
            for item in items {
                if let Some(item) = read_item(item) {
                    request.items.push(item);
                }
            }
        }
        _ => {}
    }

    for tool in array_field(root, "tools").ok("tools").into_iter().flatten() {
        if str_or_empty(tool, "type") != "function" {
            tracing::debug!("[TRANSLATOR] 跳过非函数工具: {}", str_or_empty(tool, "type"));
            continue;
        }
        request.tools.push(ToolDefinition {
            name: str_or_empty(tool, "name").to_string(),
            description: str_field(tool, "description")
                .ok("tools[].description")
                .map(str::to_string),
            parameters: tool.get("parameters").filter(|p| !p.is_null()).cloned(),
        });
    }

    request.tool_choice = match root.get("tool_choice") {
        Some(Value::String(s)) => match s.as_str() {
            "auto" => Some(ToolChoice::Auto),
            "none" => Some(ToolChoice::None),
            "required" => Some(ToolChoice::Required),
            _ => None,
        },
        Some(choice @ Value::Object(_)) if str_or_empty(choice, "type") == "function" => {
            Some(ToolChoice::Function(str_or_empty(choice, "name").to_string()))
        }
        _ => None,
    };

    request.params = GenerationParams {
        max_tokens: u64_field(root, "max_output_tokens").ok("max_output_tokens"),
        temperature: f64_field(root, "temperature").ok("temperature"),
        top_p: f64_field(root, "top_p").ok("top_p"),
        top_k: None,
        stop: Vec::new(),
        parallel_tool_calls: bool_field(root, "parallel_tool_calls").ok("parallel_tool_calls"),
        reasoning_effort: object_field(root, "reasoning")
            .ok("reasoning")
            .and_then(|r| str_field(r, "effort").ok("reasoning.effort"))
            .map(str::to_string),
    };
    request
}

fn read_item(item: &Value) -> Option<ConversationItem> {
    let kind = match str_or_empty(item, "type") {
        // 省略 type 的输入项按消息处理
        "" if item.get("role").is_some() => "message",
        kind => kind,
    };
    match kind {
        "message" => {
            let role = match str_or_empty(item, "role") {
                "assistant" => Role::Assistant,
                "system" | "developer" => Role::System,
                _ => Role::User,
            };
            let parts = read_parts(item.get("content").unwrap_or(&Value::Null));
            (!parts.is_empty()).then_some(ConversationItem::Message { role, parts })
        }
        "function_call" => Some(ConversationItem::ToolCall {
            id: str_or_empty(item, "call_id").to_string(),
            name: str_or_empty(item, "name").to_string(),
            arguments: item.get("arguments").map(value_to_text).unwrap_or_default(),
        }),
        "function_call_output" => Some(ConversationItem::ToolResult {
            call_id: str_or_empty(item, "call_id").to_string(),
            output: item.get("output").map(value_to_text).unwrap_or_default(),
        }),
        other => {
            tracing::debug!("[TRANSLATOR] 跳过输入项: {}", other);
            None
        }
    }
}

fn read_parts(content: &Value) -> Vec<ContentPart> {
    match content {
        Value::String(s) if !s.is_empty() => vec![ContentPart::Text(s.clone())],
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| match str_or_empty(part, "type") {
                "input_text" | "output_text" | "text" => {
                    Some(ContentPart::Text(str_or_empty(part, "text").to_string()))
                }
                "input_image" => {
                    let url = str_or_empty(part, "image_url");
                    (!url.is_empty()).then(|| ContentPart::Image(ImageSource::from_url(url)))
                }
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

// ============================================================================
// 响应对象解析（Codex 上游共用）
// ============================================================================

/// 解析 Responses 响应对象
pub fn parse_response_object(response: &Value) -> ResponseMessage {
    let stop_reason = match str_or_empty(response, "status") {
        "incomplete" => Some(incomplete_reason(response)),
        "failed" => Some(StopReason::Other("error".to_string())),
        _ => parse_status(response),
    };
    ResponseMessage {
        id: str_or_empty(response, "id").to_string(),
        model: str_or_empty(response, "model").to_string(),
        blocks: parse_output(response),
        stop_reason,
        usage: response.get("usage").map(parse_usage).unwrap_or_default(),
        created: response.get("created_at").and_then(Value::as_i64),
    }
}

/// `output` 数组转为内容块
pub fn parse_output(response: &Value) -> Vec<ContentBlock> {
    let mut blocks = Vec::new();
    for item in array_field(response, "output").ok("output").into_iter().flatten() {
        match str_or_empty(item, "type") {
            "message" => {
                for part in array_field(item, "content").ok("output[].content").into_iter().flatten() {
                    if str_or_empty(part, "type") == "output_text" {
                        blocks.push(ContentBlock::Text(str_or_empty(part, "text").to_string()));
                    }
                }
            }
            "reasoning" => {
                let summary: Vec<&str> = array_field(item, "summary")
                    .ok("output[].summary")
                    .into_iter()
                    .flatten()
                    .filter_map(|s| s.get("text").and_then(Value::as_str))
                    .collect();
                if !summary.is_empty() {
                    blocks.push(ContentBlock::Thinking {
                        text: summary.join("\n\n"),
                        signature: str_field(item, "encrypted_content")
                            .ok("output[].encrypted_content")
                            .map(str::to_string),
                    });
                }
            }
            "function_call" => blocks.push(ContentBlock::ToolUse {
                id: str_or_empty(item, "call_id").to_string(),
                name: str_or_empty(item, "name").to_string(),
                arguments: item.get("arguments").map(value_to_text).unwrap_or_default(),
            }),
            other => tracing::debug!("[TRANSLATOR] 跳过输出项: {}", other),
        }
    }
    blocks
}

/// `status` 字段对应的停止原因
pub fn parse_status(response: &Value) -> Option<StopReason> {
    match str_field(response, "status").ok("response.status")? {
        "incomplete" => Some(incomplete_reason(response)),
        "failed" => Some(StopReason::Other("error".to_string())),
        status => Some(StopReason::from_str(status)),
    }
}

/// 未完成响应的原因，缺失时按长度截断处理
pub fn incomplete_reason(response: &Value) -> StopReason {
    response
        .get("incomplete_details")
        .and_then(|d| d.get("reason"))
        .and_then(Value::as_str)
        .map(StopReason::from_str)
        .unwrap_or(StopReason::MaxTokens)
}

/// 解析 Responses `usage`
pub fn parse_usage(usage: &Value) -> Usage {
    Usage {
        input_tokens: u64_field(usage, "input_tokens").ok("usage.input_tokens"),
        output_tokens: u64_field(usage, "output_tokens").ok("usage.output_tokens"),
        cached_tokens: usage
            .get("input_tokens_details")
            .and_then(|d| d.get("cached_tokens"))
            .and_then(Value::as_u64),
        reasoning_tokens: usage
            .get("output_tokens_details")
            .and_then(|d| d.get("reasoning_tokens"))
            .and_then(Value::as_u64),
        total_tokens: u64_field(usage, "total_tokens").ok("usage.total_tokens"),
    }
}

// ============================================================================
// 响应渲染
// ============================================================================

fn render_response(message: &ResponseMessage) -> Value {
    let stop_reason = message.stop_reason();
    let incomplete = stop_reason.to_responses_incomplete();
    let status = match (&stop_reason, incomplete) {
        (StopReason::Other(s), _) if s == "error" => "failed",
        (_, Some(_)) => "incomplete",
        _ => "completed",
    };

    let output: Vec<Value> = message
        .blocks
        .iter()
        .map(|block| match block {
            ContentBlock::Text(text) => json!({
                "id": format!("msg_{}", Uuid::new_v4().simple()),
                "type": "message",
                "status": "completed",
                "role": "assistant",
                "content": [{ "type": "output_text", "text": text, "annotations": [] }]
            }),
            ContentBlock::Thinking { text, signature } => {
                let mut item = json!({
                    "id": format!("rs_{}", Uuid::new_v4().simple()),
                    "type": "reasoning",
                    "summary": [{ "type": "summary_text", "text": text }]
                });
                if let Some(signature) = signature {
                    item["encrypted_content"] = json!(signature);
                }
                item
            }
            ContentBlock::ToolUse {
                id,
                name,
                arguments,
            } => json!({
                "id": format!("fc_{}", Uuid::new_v4().simple()),
                "type": "function_call",
                "status": "completed",
                "call_id": id,
                "name": name,
                "arguments": arguments
            }),
        })
        .collect();

    let id = if message.id.is_empty() {
        format!("resp_{}", Uuid::new_v4().simple())
    } else {
        message.id.clone()
    };
    let mut response = json!({
        "id": id,
        "object": "response",
        "created_at": message.created.unwrap_or_else(|| chrono::Utc::now().timestamp()),
        "status": status,
        "model": message.model,
        "output": output,
        "usage": render_usage(&message.usage)
    });
    if let Some(reason) = incomplete {
        response["incomplete_details"] = json!({ "reason": reason });
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_request_items() {
        let root = json!({
            "model": "gpt-5",
            "instructions": "Be brief.",
            "input": [
                {"role": "user", "content": "hi"},
                {"type": "message", "role": "assistant", "content": [{"type": "output_text", "text": "hello"}]},
                {"type": "function_call", "call_id": "call_1", "name": "Read", "arguments": "{}"},
                {"type": "function_call_output", "call_id": "call_1", "output": "ok"},
                {"type": "reasoning", "summary": []}
            ],
            "tools": [
                {"type": "function", "name": "Read", "parameters": {"type": "object"}},
                {"type": "web_search"}
            ],
            "tool_choice": {"type": "function", "name": "Read"},
            "max_output_tokens": 256,
            "reasoning": {"effort": "high"}
        });
        let request = read_request(&root);

        assert_eq!(request.instructions.as_deref(), Some("Be brief."));
        assert_eq!(request.items.len(), 4);
        assert_eq!(request.items[0], ConversationItem::text(Role::User, "hi"));
        assert_eq!(request.items[1], ConversationItem::text(Role::Assistant, "hello"));
        assert_eq!(request.tool_names(), vec!["Read".to_string()]);
        assert_eq!(request.tool_choice, Some(ToolChoice::Function("Read".to_string())));
        assert_eq!(request.params.max_tokens, Some(256));
        assert_eq!(request.params.reasoning_effort.as_deref(), Some("high"));
    }

    #[test]
    fn test_string_input() {
        let request = read_request(&json!({"input": "hello"}));
        assert_eq!(request.items, vec![ConversationItem::text(Role::User, "hello")]);
    }

    #[test]
    fn test_parse_response_object() {
        let response = json!({
            "id": "resp_1",
            "model": "gpt-5-codex",
            "status": "completed",
            "output": [
                {"type": "reasoning", "summary": [{"type": "summary_text", "text": "a"}, {"type": "summary_text", "text": "b"}]},
                {"type": "message", "content": [{"type": "output_text", "text": "Hi"}]},
                {"type": "function_call", "call_id": "call_1", "name": "Read", "arguments": "{\"p\":1}"}
            ],
            "usage": {"input_tokens": 3, "output_tokens": 4, "output_tokens_details": {"reasoning_tokens": 2}}
        });
        let message = parse_response_object(&response);
        assert_eq!(message.thinking().as_deref(), Some("a\n\nb"));
        assert_eq!(message.text(), "Hi");
        assert!(message.has_tool_use());
        assert_eq!(message.stop_reason, Some(StopReason::EndTurn));
        assert_eq!(message.usage.reasoning_tokens, Some(2));
    }

    #[test]
    fn test_incomplete_reason() {
        let response = json!({"status": "incomplete", "incomplete_details": {"reason": "max_output_tokens"}});
        assert_eq!(parse_status(&response), Some(StopReason::MaxTokens));
        assert_eq!(
            incomplete_reason(&json!({"incomplete_details": {"reason": "content_filter"}})),
            StopReason::Other("content_filter".to_string())
        );
        assert_eq!(incomplete_reason(&json!({})), StopReason::MaxTokens);
        assert_eq!(parse_status(&json!({})), None);
    }

    #[test]
    fn test_render_response_statuses() {
        let mut message = ResponseMessage {
            model: "gpt-5".to_string(),
            blocks: vec![ContentBlock::Text("Hi".to_string())],
            stop_reason: Some(StopReason::EndTurn),
            usage: Usage::new(1, 2),
            ..Default::default()
        };
        let out = render_response(&message);
        assert_eq!(out["status"], "completed");
        assert_eq!(out["output"][0]["content"][0]["text"], "Hi");
        assert_eq!(out["usage"]["total_tokens"], 3);
        assert!(out.get("incomplete_details").is_none());

        message.stop_reason = Some(StopReason::MaxTokens);
        let out = render_response(&message);
        assert_eq!(out["status"], "incomplete");
        assert_eq!(out["incomplete_details"]["reason"], "max_output_tokens");
    }
}
