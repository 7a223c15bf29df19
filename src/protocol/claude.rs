//! Anthropic Messages 编解码

use super::field::{
    array_field, bool_field, f64_field, object_field, str_field, str_or_empty, u64_field,
    value_to_text,
};
use super::{parse_document, ClientProtocol, ProviderProtocol};
use crate::models::{
    ChatRequest, ContentBlock, ContentPart, ConversationItem, Format, GenerationParams,
    ImageSource, ResponseMessage, Role, ToolChoice, ToolDefinition,
};
use crate::stream::generators::anthropic_sse::render_usage;
use crate::stream::generators::gemini_sse::parse_args;
use crate::stream::{StopReason, UpstreamParser, Usage};
use crate::translator::TranslateError;
use serde_json::{json, Map, Value};

/// Claude 请求必须携带 `max_tokens`，来源没有时使用该值
pub const DEFAULT_MAX_TOKENS: u64 = 8192;

/// Anthropic Messages 格式
#[derive(Debug, Clone, Copy, Default)]
pub struct Claude;

impl ClientProtocol for Claude {
    const FORMAT: Format = Format::Claude;

    fn read_request(root: &Value) -> ChatRequest {
        read_request(root)
    }

    fn render_response(message: &ResponseMessage) -> Value {
        render_response(message)
    }
}

impl ProviderProtocol for Claude {
    const FORMAT: Format = Format::Claude;
    const STREAM: UpstreamParser = UpstreamParser::Claude;

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
    let mut request = ChatRequest {
        instructions: root.get("system").map(blocks_text).filter(|s| !s.is_empty()),
        ..Default::default()
    };

    for message in array_field(root, "messages").ok("messages").into_iter().flatten() {
        let role = match str_or_empty(message, "role") {
            "assistant" => Role::Assistant,
            "user" => Role::User,
            other => {
                tracing::debug!("[TRANSLATOR] 跳过未知角色的消息: {}", other);
                continue;
            }
        };
        read_content(&mut request.items, role, message.get("content"));
    }

    for tool in array_field(root, "tools").ok("tools").into_iter().flatten() {
        let name = str_or_empty(tool, "name");
        if name.is_empty() {
            continue;
        }
        request.tools.push(ToolDefinition {
            name: name.to_string(),
            description: str_field(tool, "description")
                .ok("tools[].description")
                .map(str::to_string),
            parameters: tool.get("input_schema").filter(|s| !s.is_null()).cloned(),
        });
    }

    let mut parallel_tool_calls = None;
    if let Some(choice) = object_field(root, "tool_choice").ok("tool_choice") {
        request.tool_choice = match str_or_empty(choice, "type") {
            "auto" => Some(ToolChoice::Auto),
            "any" => Some(ToolChoice::Required),
            "none" => Some(ToolChoice::None),
            "tool" => Some(ToolChoice::Function(str_or_empty(choice, "name").to_string())),
            _ => None,
        };
        if bool_field(choice, "disable_parallel_tool_use")
            .ok("tool_choice.disable_parallel_tool_use")
            == Some(true)
        {
            parallel_tool_calls = Some(false);
        }
    }

    let reasoning_effort = object_field(root, "thinking")
        .ok("thinking")
        .filter(|t| str_or_empty(t, "type") == "enabled")
        .map(|t| {
            let budget = u64_field(t, "budget_tokens").ok("thinking.budget_tokens");
            effort_for_budget(budget.unwrap_or(0)).to_string()
        });

    request.params = GenerationParams {
        max_tokens: u64_field(root, "max_tokens").ok("max_tokens"),
        temperature: f64_field(root, "temperature").ok("temperature"),
        top_p: f64_field(root, "top_p").ok("top_p"),
        top_k: u64_field(root, "top_k").ok("top_k"),
        stop: array_field(root, "stop_sequences")
            .ok("stop_sequences")
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        parallel_tool_calls,
        reasoning_effort,
    };
    request
}

/// thinking 预算映射到推理强度
pub(crate) fn effort_for_budget(budget: u64) -> &'static str {
    match budget {
        0..=4096 => "low",
        4097..=16384 => "medium",
        _ => "high",
    }
}

/// 读取一条消息的内容块，文本和图片按顺序聚合，遇到工具块时先输出已聚合的消息
fn read_content(items: &mut Vec<ConversationItem>, role: Role, content: Option<&Value>) {
    let blocks = match content {
        Some(Value::String(text)) => {
            if !text.is_empty() {
                items.push(ConversationItem::text(role, text.clone()));
            }
            return;
        }
        Some(Value::Array(blocks)) => blocks,
        _ => return,
    };

    let mut parts = Vec::new();
    for block in blocks {
        match str_or_empty(block, "type") {
            "text" => parts.push(ContentPart::Text(str_or_empty(block, "text").to_string())),
            "image" => {
                if let Some(source) = block.get("source").and_then(read_image) {
                    parts.push(ContentPart::Image(source));
                }
            }
            "tool_use" => {
                flush_parts(items, role, &mut parts);
                items.push(ConversationItem::ToolCall {
                    id: str_or_empty(block, "id").to_string(),
                    name: str_or_empty(block, "name").to_string(),
                    arguments: block
                        .get("input")
                        .map(|i| if i.is_null() { "{}".to_string() } else { i.to_string() })
                        .unwrap_or_else(|| "{}".to_string()),
                });
            }
            "tool_result" => {
                flush_parts(items, role, &mut parts);
                items.push(ConversationItem::ToolResult {
                    call_id: str_or_empty(block, "tool_use_id").to_string(),
                    output: block.get("content").map(blocks_text).unwrap_or_default(),
                });
            }
            // 历史中的思考块不回传
            "thinking" | "redacted_thinking" => {}
            other => tracing::debug!("[TRANSLATOR] 跳过不支持的内容块: {}", other),
        }
    }
    flush_parts(items, role, &mut parts);
}

fn flush_parts(items: &mut Vec<ConversationItem>, role: Role, parts: &mut Vec<ContentPart>) {
    if !parts.is_empty() {
        items.push(ConversationItem::Message {
            role,
            parts: std::mem::take(parts),
        });
    }
}

fn read_image(source: &Value) -> Option<ImageSource> {
    match str_or_empty(source, "type") {
        "base64" => Some(ImageSource::Base64 {
            media_type: str_or_empty(source, "media_type").to_string(),
            data: str_or_empty(source, "data").to_string(),
        }),
        "url" => Some(ImageSource::from_url(str_or_empty(source, "url"))),
        _ => None,
    }
}

/// 字符串或文本块数组转为文本，块之间以换行拼接
fn blocks_text(value: &Value) -> String {
    match value {
        Value::Array(blocks) => blocks
            .iter()
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        other => value_to_text(other),
    }
}

// ============================================================================
// 请求写出
// ============================================================================

fn write_request(request: &ChatRequest, model: &str, stream: bool) -> Value {
    let mut system: Vec<String> = request.instructions.iter().cloned().collect();
    let mut messages: Vec<(Role, Vec<Value>)> = Vec::new();

    for item in &request.items {
        let (role, block) = match item {
            ConversationItem::Message {
                role: Role::System,
                parts,
            } => {
                system.push(parts_text(parts));
                continue;
            }
            ConversationItem::Message { role, parts } => {
                let blocks: Vec<Value> = parts.iter().map(write_part).collect();
                push_blocks(&mut messages, *role, blocks);
                continue;
            }
            ConversationItem::ToolCall {
                id,
                name,
                arguments,
            } => (
                Role::Assistant,
                json!({
                    "type": "tool_use",
                    "id": id,
                    "name": name,
                    "input": parse_args(arguments)
                }),
            ),
            ConversationItem::ToolResult { call_id, output } => (
                Role::User,
                json!({
                    "type": "tool_result",
                    "tool_use_id": call_id,
                    "content": output
                }),
            ),
        };
        push_blocks(&mut messages, role, vec![block]);
    }

    let mut out = Map::new();
    out.insert("model".into(), json!(model));
    out.insert(
        "max_tokens".into(),
        json!(request.params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)),
    );
    match system.len() {
        0 => {}
        1 => {
            out.insert("system".into(), json!(system[0]));
        }
        _ => {
            let blocks: Vec<Value> = system
                .iter()
                .map(|text| json!({ "type": "text", "text": text }))
                .collect();
            out.insert("system".into(), Value::Array(blocks));
        }
    }
    let messages: Vec<Value> = messages
        .into_iter()
        .map(|(role, content)| {
            let role = if role == Role::Assistant { "assistant" } else { "user" };
            json!({ "role": role, "content": content })
        })
        .collect();
    out.insert("messages".into(), Value::Array(messages));
    out.insert("stream".into(), json!(stream));

    if !request.tools.is_empty() {
        let tools: Vec<Value> = request
            .tools
            .iter()
            .map(|tool| {
                let mut t = Map::new();
                t.insert("name".into(), json!(tool.name));
                if let Some(description) = &tool.description {
                    t.insert("description".into(), json!(description));
                }
                t.insert(
                    "input_schema".into(),
                    tool.parameters
                        .clone()
                        .unwrap_or_else(|| json!({ "type": "object", "properties": {} })),
                );
                Value::Object(t)
            })
            .collect();
        out.insert("tools".into(), Value::Array(tools));
    }

    let disable_parallel = request.params.parallel_tool_calls == Some(false);
    let choice = match &request.tool_choice {
        Some(ToolChoice::Auto) => Some(json!({ "type": "auto" })),
        Some(ToolChoice::Required) => Some(json!({ "type": "any" })),
        Some(ToolChoice::None) => Some(json!({ "type": "none" })),
        Some(ToolChoice::Function(name)) => Some(json!({ "type": "tool", "name": name })),
        None if disable_parallel && !request.tools.is_empty() => Some(json!({ "type": "auto" })),
        None => None,
    };
    if let Some(mut choice) = choice {
        if disable_parallel && choice["type"] != "none" {
            choice["disable_parallel_tool_use"] = json!(true);
        }
        out.insert("tool_choice".into(), choice);
    }

    let params = &request.params;
    if let Some(temperature) = params.temperature {
        out.insert("temperature".into(), json!(temperature));
    }
    if let Some(top_p) = params.top_p {
        out.insert("top_p".into(), json!(top_p));
    }
    if let Some(top_k) = params.top_k {
        out.insert("top_k".into(), json!(top_k));
    }
    if !params.stop.is_empty() {
        out.insert("stop_sequences".into(), json!(params.stop));
    }
    Value::Object(out)
}

/// 相邻同角色的内容块合并到同一条消息
fn push_blocks(messages: &mut Vec<(Role, Vec<Value>)>, role: Role, blocks: Vec<Value>) {
    if blocks.is_empty() {
        return;
    }
    match messages.last_mut() {
        Some((last, content)) if *last == role => content.extend(blocks),
        _ => messages.push((role, blocks)),
    }
}

fn write_part(part: &ContentPart) -> Value {
    match part {
        ContentPart::Text(text) => json!({ "type": "text", "text": text }),
        ContentPart::Image(ImageSource::Base64 { media_type, data }) => json!({
            "type": "image",
            "source": { "type": "base64", "media_type": media_type, "data": data }
        }),
        ContentPart::Image(ImageSource::Url(url)) => json!({
            "type": "image",
            "source": { "type": "url", "url": url }
        }),
    }
}

fn parts_text(parts: &[ContentPart]) -> String {
    parts
        .iter()
        .filter_map(|p| match p {
            ContentPart::Text(t) => Some(t.as_str()),
            ContentPart::Image(_) => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// 响应
// ============================================================================

fn parse_response(raw: &[u8]) -> Result<ResponseMessage, TranslateError> {
    let root = parse_document(raw)?;
    if str_or_empty(&root, "type") == "error" {
        let error = root.get("error").unwrap_or(&Value::Null);
        return Err(TranslateError::conversion(format!(
            "上游返回错误: {}",
            str_or_empty(error, "message")
        )));
    }

    let mut blocks = Vec::new();
    for block in array_field(&root, "content").ok("content").into_iter().flatten() {
        match str_or_empty(block, "type") {
            "text" => blocks.push(ContentBlock::Text(str_or_empty(block, "text").to_string())),
            "thinking" => blocks.push(ContentBlock::Thinking {
                text: str_or_empty(block, "thinking").to_string(),
                signature: str_field(block, "signature")
                    .ok("content[].signature")
                    .map(str::to_string),
            }),
            "tool_use" | "server_tool_use" => blocks.push(ContentBlock::ToolUse {
                id: str_or_empty(block, "id").to_string(),
                name: str_or_empty(block, "name").to_string(),
                arguments: block
                    .get("input")
                    .map(Value::to_string)
                    .unwrap_or_else(|| "{}".to_string()),
            }),
            other => tracing::debug!("[TRANSLATOR] 跳过不支持的响应块: {}", other),
        }
    }

    Ok(ResponseMessage {
        id: str_or_empty(&root, "id").to_string(),
        model: str_or_empty(&root, "model").to_string(),
        blocks,
        stop_reason: str_field(&root, "stop_reason")
            .ok("stop_reason")
            .map(StopReason::from_str),
        usage: root.get("usage").map(parse_usage).unwrap_or_default(),
        created: None,
    })
}

fn render_response(message: &ResponseMessage) -> Value {
    let content: Vec<Value> = message
        .blocks
        .iter()
        .map(|block| match block {
            ContentBlock::Text(text) => json!({ "type": "text", "text": text }),
            ContentBlock::Thinking { text, signature } => {
                let mut b = json!({ "type": "thinking", "thinking": text });
                if let Some(signature) = signature {
                    b["signature"] = json!(signature);
                }
                b
            }
            ContentBlock::ToolUse {
                id,
                name,
                arguments,
            } => json!({
                "type": "tool_use",
                "id": id,
                "name": name,
                "input": parse_args(arguments)
            }),
        })
        .collect();

    let id = if message.id.is_empty() {
        format!("msg_{}", uuid::Uuid::new_v4().simple())
    } else {
        message.id.clone()
    };
    json!({
        "id": id,
        "type": "message",
        "role": "assistant",
        "model": message.model,
        "content": content,
        "stop_reason": message.stop_reason().to_anthropic_str(),
        "stop_sequence": null,
        "usage": render_usage(&message.usage)
    })
}

/// 解析 Anthropic `usage`，只填充上游给出的字段
pub fn parse_usage(usage: &Value) -> Usage {
    Usage {
        input_tokens: u64_field(usage, "input_tokens").ok("usage.input_tokens"),
        output_tokens: u64_field(usage, "output_tokens").ok("usage.output_tokens"),
        cached_tokens: u64_field(usage, "cache_read_input_tokens")
            .ok("usage.cache_read_input_tokens"),
        reasoning_tokens: None,
        total_tokens: None,
    }
}
