//! OpenAI Chat Completions 编解码

use super::field::{
    array_field, bool_field, f64_field, object_field, str_field, str_or_empty, u64_field,
    value_to_text,
};
use super::{parse_document, ClientProtocol, ProviderProtocol};
use crate::models::{
    ChatRequest, ContentBlock, ContentPart, ConversationItem, Format, GenerationParams,
    ImageSource, ResponseMessage, Role, ToolChoice, ToolDefinition,
};
use crate::stream::generators::openai_sse::OpenAiUsage;
use crate::stream::{StopReason, UpstreamParser, Usage};
use crate::translator::TranslateError;
use serde_json::{json, Map, Value};

/// OpenAI Chat Completions 格式
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiChat;

impl ClientProtocol for OpenAiChat {
    const FORMAT: Format = Format::OpenAI;

    fn read_request(root: &Value) -> ChatRequest {
        read_request(root)
    }

    fn render_response(message: &ResponseMessage) -> Value {
        render_response(message)
    }
}

impl ProviderProtocol for OpenAiChat {
    const FORMAT: Format = Format::OpenAI;
    const STREAM: UpstreamParser = UpstreamParser::OpenAi;

    fn write_request(request: &ChatRequest, model: &str, stream: bool) -> Value {
        write_request(request, model, stream)
    }

    fn parse_response(raw: &[u8]) -> Result<ResponseMessage, TranslateError> {
        parse_response(raw)
    }
}

// ============================================================================
// 请求读取
// ============================================================================

fn read_request(root: &Value) -> ChatRequest {
    let mut request = ChatRequest::default();
    let mut system = Vec::new();

    for message in array_field(root, "messages").ok("messages").into_iter().flatten() {
        let content = message.get("content").unwrap_or(&Value::Null);
        match str_or_empty(message, "role") {
            "system" | "developer" => {
                let text = content_text(content);
                // 位于开头的系统消息并入 instructions
                if request.items.is_empty() {
                    system.push(text);
                } else {
                    request.items.push(ConversationItem::text(Role::System, text));
                }
            }
            "user" => push_message(&mut request.items, Role::User, read_parts(content)),
            "assistant" => {
                push_message(&mut request.items, Role::Assistant, read_parts(content));
                for call in array_field(message, "tool_calls")
                    .ok("messages[].tool_calls")
                    .into_iter()
                    .flatten()
                {
                    let function = call.get("function").unwrap_or(&Value::Null);
                    request.items.push(ConversationItem::ToolCall {
                        id: str_or_empty(call, "id").to_string(),
                        name: str_or_empty(function, "name").to_string(),
                        arguments: function
                            .get("arguments")
                            .map(value_to_text)
                            .unwrap_or_default(),
                    });
                }
            }
            "tool" => request.items.push(ConversationItem::ToolResult {
                call_id: str_or_empty(message, "tool_call_id").to_string(),
                output: content_text(content),
            }),
            other => tracing::debug!("[TRANSLATOR] 跳过未知角色的消息: {}", other),
        }
    }
    if !system.is_empty() {
        request.instructions = Some(system.join("\n"));
    }

    for tool in array_field(root, "tools").ok("tools").into_iter().flatten() {
        if str_or_empty(tool, "type") != "function" {
            continue;
        }
        let Some(function) = object_field(tool, "function").ok("tools[].function") else {
            continue;
        };
        request.tools.push(ToolDefinition {
            name: str_or_empty(function, "name").to_string(),
            description: str_field(function, "description")
                .ok("tools[].function.description")
                .map(str::to_string),
            parameters: function.get("parameters").filter(|p| !p.is_null()).cloned(),
        });
    }

    request.tool_choice = root.get("tool_choice").and_then(read_tool_choice);

    let max_tokens = u64_field(root, "max_completion_tokens")
        .ok("max_completion_tokens")
        .or_else(|| u64_field(root, "max_tokens").ok("max_tokens"));
    request.params = GenerationParams {
        max_tokens,
        temperature: f64_field(root, "temperature").ok("temperature"),
        top_p: f64_field(root, "top_p").ok("top_p"),
        top_k: None,
        stop: read_stop(root.get("stop")),
        parallel_tool_calls: bool_field(root, "parallel_tool_calls").ok("parallel_tool_calls"),
        reasoning_effort: str_field(root, "reasoning_effort")
            .ok("reasoning_effort")
            .map(str::to_string),
    };
    request
}

fn push_message(items: &mut Vec<ConversationItem>, role: Role, parts: Vec<ContentPart>) {
    if !parts.is_empty() {
        items.push(ConversationItem::Message { role, parts });
    }
}

fn read_parts(content: &Value) -> Vec<ContentPart> {
    match content {
        Value::String(s) if !s.is_empty() => vec![ContentPart::Text(s.clone())],
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| match str_or_empty(part, "type") {
                "text" | "input_text" | "output_text" => {
                    Some(ContentPart::Text(str_or_empty(part, "text").to_string()))
                }
                "image_url" => {
                    let url = match part.get("image_url") {
                        Some(Value::String(url)) => url.as_str(),
                        Some(obj) => str_or_empty(obj, "url"),
                        None => "",
                    };
                    (!url.is_empty()).then(|| ContentPart::Image(ImageSource::from_url(url)))
                }
                other => {
                    tracing::debug!("[TRANSLATOR] 跳过不支持的内容片段: {}", other);
                    None
                }
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// 内容转为纯文本，数组中的文本片段以换行拼接
fn content_text(content: &Value) -> String {
    match content {
        Value::Array(parts) => parts
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        other => value_to_text(other),
    }
}

fn read_tool_choice(value: &Value) -> Option<ToolChoice> {
    match value {
        Value::String(s) => match s.as_str() {
            "auto" => Some(ToolChoice::Auto),
            "none" => Some(ToolChoice::None),
            "required" => Some(ToolChoice::Required),
            _ => None,
        },
        Value::Object(_) => {
            let name = value
                .get("function")
                .map(|f| str_or_empty(f, "name"))
                .unwrap_or("");
            (!name.is_empty()).then(|| ToolChoice::Function(name.to_string()))
        }
        _ => None,
    }
}

fn read_stop(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

// ============================================================================
// 请求写出
// ============================================================================

fn write_request(request: &ChatRequest, model: &str, stream: bool) -> Value {
    let mut messages: Vec<Value> = Vec::new();
    if let Some(instructions) = &request.instructions {
        messages.push(json!({ "role": "system", "content": instructions }));
    }

    for item in &request.items {
        match item {
            ConversationItem::Message { role, parts } => {
                let role = match role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };
                messages.push(json!({ "role": role, "content": write_parts(parts) }));
            }
            ConversationItem::ToolCall {
                id,
                name,
                arguments,
            } => {
                let call = json!({
                    "id": id,
                    "type": "function",
                    "function": { "name": name, "arguments": arguments }
                });
                // 连续的工具调用合并到同一条助手消息
                match messages.last_mut() {
                    Some(last) if last["role"] == "assistant" => {
                        if let Some(calls) = last
                            .as_object_mut()
                            .map(|m| m.entry("tool_calls").or_insert_with(|| json!([])))
                            .and_then(Value::as_array_mut)
                        {
                            calls.push(call);
                        }
                    }
                    _ => messages.push(json!({
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [call]
                    })),
                }
            }
            ConversationItem::ToolResult { call_id, output } => messages.push(json!({
                "role": "tool",
                "tool_call_id": call_id,
                "content": output
            })),
        }
    }

    let mut out = Map::new();
    out.insert("model".into(), json!(model));
    out.insert("messages".into(), Value::Array(messages));
    out.insert("stream".into(), json!(stream));
    if stream {
        out.insert("stream_options".into(), json!({ "include_usage": true }));
    }

    if !request.tools.is_empty() {
        let tools: Vec<Value> = request
            .tools
            .iter()
            .map(|tool| {
                let mut function = Map::new();
                function.insert("name".into(), json!(tool.name));
                if let Some(description) = &tool.description {
                    function.insert("description".into(), json!(description));
                }
                if let Some(parameters) = &tool.parameters {
                    function.insert("parameters".into(), parameters.clone());
                }
                json!({ "type": "function", "function": function })
            })
            .collect();
        out.insert("tools".into(), Value::Array(tools));
    }
    if let Some(choice) = &request.tool_choice {
        out.insert(
            "tool_choice".into(),
            match choice {
                ToolChoice::Auto => json!("auto"),
                ToolChoice::None => json!("none"),
                ToolChoice::Required => json!("required"),
                ToolChoice::Function(name) => {
                    json!({ "type": "function", "function": { "name": name } })
                }
            },
        );
    }

    let params = &request.params;
    if let Some(max_tokens) = params.max_tokens {
        out.insert("max_tokens".into(), json!(max_tokens));
    }
    if let Some(temperature) = params.temperature {
        out.insert("temperature".into(), json!(temperature));
    }
    if let Some(top_p) = params.top_p {
        out.insert("top_p".into(), json!(top_p));
    }
    if !params.stop.is_empty() {
        out.insert("stop".into(), json!(params.stop));
    }
    if let Some(parallel) = params.parallel_tool_calls {
        out.insert("parallel_tool_calls".into(), json!(parallel));
    }
    if let Some(effort) = &params.reasoning_effort {
        out.insert("reasoning_effort".into(), json!(effort));
    }
    Value::Object(out)
}

/// 纯文本片段合并为字符串，含图片时输出片段数组
fn write_parts(parts: &[ContentPart]) -> Value {
    let all_text = parts.iter().all(|p| matches!(p, ContentPart::Text(_)));
    if all_text {
        let texts: Vec<&str> = parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text(t) => Some(t.as_str()),
                ContentPart::Image(_) => None,
            })
            .collect();
        return json!(texts.join("\n"));
    }
    Value::Array(
        parts
            .iter()
            .map(|p| match p {
                ContentPart::Text(text) => json!({ "type": "text", "text": text }),
                ContentPart::Image(source) => {
                    json!({ "type": "image_url", "image_url": { "url": source.to_url() } })
                }
            })
            .collect(),
    )
}

// ============================================================================
// 响应
// ============================================================================

fn parse_response(raw: &[u8]) -> Result<ResponseMessage, TranslateError> {
    let root = parse_document(raw)?;
    if let Some(error) = root.get("error").filter(|e| e.is_object()) {
        return Err(TranslateError::conversion(format!(
            "上游返回错误: {}",
            str_or_empty(error, "message")
        )));
    }

    let choice = array_field(&root, "choices")
        .ok("choices")
        .and_then(|c| c.first())
        .ok_or_else(|| TranslateError::conversion("响应缺少 choices"))?;
    let message = choice.get("message").unwrap_or(&Value::Null);

    let mut blocks = Vec::new();
    let reasoning = str_field(message, "reasoning_content")
        .ok("message.reasoning_content")
        .or_else(|| str_field(message, "reasoning").ok("message.reasoning"));
    if let Some(text) = reasoning.filter(|t| !t.is_empty()) {
        blocks.push(ContentBlock::Thinking {
            text: text.to_string(),
            signature: None,
        });
    }
    let text = content_text(message.get("content").unwrap_or(&Value::Null));
    if !text.is_empty() {
        blocks.push(ContentBlock::Text(text));
    }
    for call in array_field(message, "tool_calls")
        .ok("message.tool_calls")
        .into_iter()
        .flatten()
    {
        let function = call.get("function").unwrap_or(&Value::Null);
        blocks.push(ContentBlock::ToolUse {
            id: str_or_empty(call, "id").to_string(),
            name: str_or_empty(function, "name").to_string(),
            arguments: function
                .get("arguments")
                .map(value_to_text)
                .unwrap_or_default(),
        });
    }

    Ok(ResponseMessage {
        id: str_or_empty(&root, "id").to_string(),
        model: str_or_empty(&root, "model").to_string(),
        blocks,
        stop_reason: str_field(choice, "finish_reason")
            .ok("choices[0].finish_reason")
            .map(StopReason::from_str),
        usage: root.get("usage").map(parse_usage).unwrap_or_default(),
        created: root.get("created").and_then(Value::as_i64),
    })
}

fn render_response(message: &ResponseMessage) -> Value {
    let mut body = Map::new();
    body.insert("role".into(), json!("assistant"));
    let text = message.text();
    body.insert(
        "content".into(),
        if text.is_empty() && message.has_tool_use() {
            Value::Null
        } else {
            json!(text)
        },
    );
    if let Some(thinking) = message.thinking() {
        body.insert("reasoning_content".into(), json!(thinking));
    }
    let calls: Vec<Value> = message
        .blocks
        .iter()
        .filter_map(|b| match b {
            ContentBlock::ToolUse {
                id,
                name,
                arguments,
            } => Some(json!({
                "id": id,
                "type": "function",
                "function": { "name": name, "arguments": arguments }
            })),
            _ => None,
        })
        .collect();
    if !calls.is_empty() {
        body.insert("tool_calls".into(), Value::Array(calls));
    }

    let id = if message.id.is_empty() {
        format!("chatcmpl-{}", uuid::Uuid::new_v4().simple())
    } else {
        message.id.clone()
    };
    json!({
        "id": id,
        "object": "chat.completion",
        "created": message.created.unwrap_or_else(|| chrono::Utc::now().timestamp()),
        "model": message.model,
        "choices": [{
            "index": 0,
            "message": body,
            "finish_reason": message.stop_reason().to_openai_str()
        }],
        "usage": serde_json::to_value(OpenAiUsage::from(&message.usage)).unwrap_or(Value::Null)
    })
}

/// 解析 Chat Completions `usage`
pub fn parse_usage(usage: &Value) -> Usage {
    Usage {
        input_tokens: u64_field(usage, "prompt_tokens").ok("usage.prompt_tokens"),
        output_tokens: u64_field(usage, "completion_tokens").ok("usage.completion_tokens"),
        cached_tokens: usage
            .get("prompt_tokens_details")
            .and_then(|d| d.get("cached_tokens"))
            .and_then(Value::as_u64),
        reasoning_tokens: usage
            .get("completion_tokens_details")
            .and_then(|d| d.get("reasoning_tokens"))
            .and_then(Value::as_u64),
        total_tokens: u64_field(usage, "total_tokens").ok("usage.total_tokens"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_request_messages_and_tools() {
        let root = json!({
            "model": "gpt-4o",
            "messages": [
                {"role": "system", "content": "Be brief."},
                {"role": "user", "content": [
                    {"type": "text", "text": "look"},
                    {"type": "image_url", "image_url": {"url": "data:image/png;base64,AAAA"}}
                ]},
                {"role": "assistant", "content": null, "tool_calls": [
                    {"id": "call_1", "type": "function", "function": {"name": "Read", "arguments": "{\"p\":1}"}}
                ]},
                {"role": "tool", "tool_call_id": "call_1", "content": "ok"}
            ],
            "tools": [{"type": "function", "function": {"name": "Read", "parameters": {"type": "object"}}}],
            "tool_choice": {"type": "function", "function": {"name": "Read"}},
            "max_tokens": 100,
            "stop": "END"
        });
        let request = read_request(&root);

        assert_eq!(request.instructions.as_deref(), Some("Be brief."));
        assert_eq!(request.items.len(), 3);
        assert!(matches!(
            &request.items[0],
            ConversationItem::Message { role: Role::User, parts } if parts.len() == 2
        ));
        assert_eq!(
            request.items[1],
            ConversationItem::ToolCall {
                id: "call_1".to_string(),
                name: "Read".to_string(),
                arguments: "{\"p\":1}".to_string()
            }
        );
        assert_eq!(
            request.items[2],
            ConversationItem::ToolResult {
                call_id: "call_1".to_string(),
                output: "ok".to_string()
            }
        );
        assert_eq!(request.tool_names(), vec!["Read".to_string()]);
        assert_eq!(request.tool_choice, Some(ToolChoice::Function("Read".to_string())));
        assert_eq!(request.params.max_tokens, Some(100));
        assert_eq!(request.params.stop, vec!["END".to_string()]);
    }

    #[test]
    fn test_invalid_optional_fields_are_skipped() {
        let root = json!({
            "messages": [{"role": "user", "content": "hi"}],
            "temperature": "hot",
            "tools": "none"
        });
        let request = read_request(&root);
        assert_eq!(request.params.temperature, None);
        assert!(request.tools.is_empty());
        assert_eq!(request.items.len(), 1);
    }

    #[test]
    fn test_write_request_merges_tool_calls() {
        let request = ChatRequest {
            instructions: Some("sys".to_string()),
            items: vec![
                ConversationItem::text(Role::Assistant, "checking"),
                ConversationItem::ToolCall {
                    id: "a".to_string(),
                    name: "Read".to_string(),
                    arguments: "{}".to_string(),
                },
                ConversationItem::ToolCall {
                    id: "b".to_string(),
                    name: "Grep".to_string(),
                    arguments: "{}".to_string(),
                },
            ],
            ..Default::default()
        };
        let out = write_request(&request, "gpt-4o", true);

        assert_eq!(out["model"], "gpt-4o");
        assert_eq!(out["stream"], true);
        assert_eq!(out["stream_options"]["include_usage"], true);
        let messages = out["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["content"], "checking");
        assert_eq!(messages[1]["tool_calls"].as_array().unwrap().len(), 2);
        assert!(out.get("tools").is_none());
        assert!(out.get("temperature").is_none());
    }

    #[test]
    fn test_parse_and_render_response() {
        let raw = br#"{
            "id": "chatcmpl-1", "model": "gpt-4o", "created": 1700000000,
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Hi",
                "tool_calls": [{"id": "c1", "type": "function", "function": {"name": "Read", "arguments": "{}"}}]},
                "finish_reason": "tool_calls"}],
            "usage": {"prompt_tokens": 3, "completion_tokens": 4, "total_tokens": 7}
        }"#;
        let message = parse_response(raw).unwrap();
        assert_eq!(message.text(), "Hi");
        assert!(message.has_tool_use());
        assert_eq!(message.stop_reason, Some(StopReason::ToolUse));
        assert_eq!(message.usage.total(), 7);

        let out = render_response(&message);
        assert_eq!(out["id"], "chatcmpl-1");
        assert_eq!(out["created"], 1700000000);
        assert_eq!(out["choices"][0]["finish_reason"], "tool_calls");
        assert_eq!(out["choices"][0]["message"]["tool_calls"][0]["function"]["name"], "Read");
        assert_eq!(out["usage"]["prompt_tokens"], 3);
    }

    #[test]
    fn test_parse_response_requires_choices() {
        assert!(matches!(
            parse_response(br#"{"id":"x"}"#).unwrap_err(),
            TranslateError::Conversion(_)
        ));
        assert!(matches!(
            parse_response(b"[]").unwrap_err(),
            TranslateError::MalformedInput(_)
        ));
    }

    #[test]
    fn test_parse_usage_details() {
        let usage = parse_usage(&json!({
            "prompt_tokens": 10,
            "completion_tokens": 5,
            "prompt_tokens_details": {"cached_tokens": 2},
            "completion_tokens_details": {"reasoning_tokens": 1}
        }));
        assert_eq!(usage.cached_tokens, Some(2));
        assert_eq!(usage.reasoning_tokens, Some(1));
        assert_eq!(usage.total_tokens, None);
    }
}
