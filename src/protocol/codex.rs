//! Codex（Responses API 后端）编解码
//!
//! Codex 后端只接受 Responses 形式的请求：`store` 固定为 `false`，
//! 不支持采样参数，工具名称不超过 64 个字符。

use super::catalog::build_short_name_map;
use super::field::str_or_empty;
use super::responses::parse_response_object;
use super::{parse_document, ProviderProtocol};
use crate::models::{ChatRequest, ContentPart, ConversationItem, Format, ResponseMessage, Role, ToolChoice};
use crate::stream::sse::{data_payloads, DONE};
use crate::stream::UpstreamParser;
use crate::translator::TranslateError;
use serde_json::{json, Map, Value};
use std::collections::HashMap;

const DEFAULT_REASONING_EFFORT: &str = "medium";

/// Codex 不接受的顶层字段
const UNSUPPORTED_FIELDS: &[&str] = &[
    "max_output_tokens",
    "max_completion_tokens",
    "temperature",
    "top_p",
    "service_tier",
    "truncation",
    "user",
    "previous_response_id",
];

/// Codex 上游格式
#[derive(Debug, Clone, Copy, Default)]
pub struct Codex;

impl ProviderProtocol for Codex {
    const FORMAT: Format = Format::Codex;
    const STREAM: UpstreamParser = UpstreamParser::Codex;

    fn write_request(request: &ChatRequest, model: &str, stream: bool) -> Value {
        write_request(request, model, stream)
    }

    fn parse_response(raw: &[u8]) -> Result<ResponseMessage, TranslateError> {
        parse_response(raw)
    }
}

// ============================================================================
// 请求
// ============================================================================

fn write_request(request: &ChatRequest, model: &str, stream: bool) -> Value {
    let short_names = build_short_name_map(&request.tool_names());
    let short = |name: &str| short_names.get(name).cloned().unwrap_or_else(|| name.to_string());

    let input: Vec<Value> = request
        .items
        .iter()
        .map(|item| match item {
            ConversationItem::Message { role, parts } => {
                let (role, text_type) = match role {
                    Role::System => ("developer", "input_text"),
                    Role::User => ("user", "input_text"),
                    Role::Assistant => ("assistant", "output_text"),
                };
                let content: Vec<Value> = parts
                    .iter()
                    .map(|part| match part {
                        ContentPart::Text(text) => json!({ "type": text_type, "text": text }),
                        ContentPart::Image(source) => {
                            json!({ "type": "input_image", "image_url": source.to_url() })
                        }
                    })
                    .collect();
                json!({ "type": "message", "role": role, "content": content })
            }
            ConversationItem::ToolCall {
                id,
                name,
                arguments,
            } => json!({
                "type": "function_call",
                "call_id": id,
                "name": short(name.as_str()),
                "arguments": arguments
            }),
            ConversationItem::ToolResult { call_id, output } => json!({
                "type": "function_call_output",
                "call_id": call_id,
                "output": output
            }),
        })
        .collect();

    let mut out = Map::new();
    out.insert("model".into(), json!(model));
    out.insert(
        "instructions".into(),
        json!(request.instructions.as_deref().unwrap_or("")),
    );
    out.insert("input".into(), Value::Array(input));

    if !request.tools.is_empty() {
        let tools: Vec<Value> = request
            .tools
            .iter()
            .map(|tool| {
                let mut t = Map::new();
                t.insert("type".into(), json!("function"));
                t.insert("name".into(), json!(short(tool.name.as_str())));
                if let Some(description) = &tool.description {
                    t.insert("description".into(), json!(description));
                }
                t.insert(
                    "parameters".into(),
                    tool.parameters
                        .clone()
                        .unwrap_or_else(|| json!({ "type": "object", "properties": {} })),
                );
                t.insert("strict".into(), json!(false));
                Value::Object(t)
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
                ToolChoice::Function(name) => json!({ "type": "function", "name": short(name.as_str()) }),
            },
        );
    }

    out.insert(
        "parallel_tool_calls".into(),
        json!(request.params.parallel_tool_calls.unwrap_or(true)),
    );
    out.insert(
        "reasoning".into(),
        json!({
            "effort": request
                .params
                .reasoning_effort
                .as_deref()
                .unwrap_or(DEFAULT_REASONING_EFFORT),
            "summary": "auto"
        }),
    );
    out.insert("stream".into(), json!(stream));
    out.insert("store".into(), json!(false));
    out.insert("include".into(), json!(["reasoning.encrypted_content"]));
    Value::Object(out)
}

/// Responses 请求规范化为 Codex 请求
///
/// 请求体原样保留，只修正 Codex 的约束：模型和流标志、`store: false`、
/// 必需的 `instructions`、不支持的参数、字符串形式的 `input`、工具名称长度。
pub fn normalize_request(raw: &[u8], model: &str, stream: bool) -> Result<Value, TranslateError> {
    let mut root = parse_document(raw)?;
    let Some(obj) = root.as_object_mut() else {
        return Err(TranslateError::malformed("请求体不是 JSON 对象"));
    };

    obj.insert("model".into(), json!(model));
    obj.insert("stream".into(), json!(stream));
    obj.insert("store".into(), json!(false));
    if !obj.get("instructions").is_some_and(Value::is_string) {
        obj.insert("instructions".into(), json!(""));
    }
    for field in UNSUPPORTED_FIELDS {
        if obj.remove(*field).is_some() {
            tracing::debug!("[TRANSLATOR] Codex 不支持参数 {}，已移除", field);
        }
    }

    if let Some(Value::String(text)) = obj.get("input") {
        let message = json!([{
            "type": "message",
            "role": "user",
            "content": [{ "type": "input_text", "text": text }]
        }]);
        obj.insert("input".into(), message);
    }

    let names: Vec<String> = obj
        .get("tools")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|t| str_or_empty(t, "type") == "function")
        .map(|t| str_or_empty(t, "name").to_string())
        .collect();
    let short_names: HashMap<String, String> = build_short_name_map(&names)
        .into_iter()
        .filter(|(original, short)| original != short)
        .collect();

    if let Some(items) = obj.get_mut("input").and_then(Value::as_array_mut) {
        for item in items.iter_mut() {
            if str_or_empty(item, "type") == "message" && str_or_empty(item, "role") == "system" {
                item["role"] = json!("developer");
            }
            if str_or_empty(item, "type") == "function_call" {
                rename(item, &short_names);
            }
        }
    }
    if !short_names.is_empty() {
        if let Some(tools) = obj.get_mut("tools").and_then(Value::as_array_mut) {
            for tool in tools.iter_mut() {
                rename(tool, &short_names);
            }
        }
        if let Some(choice) = obj.get_mut("tool_choice").filter(|c| c.is_object()) {
            rename(choice, &short_names);
        }
    }
    Ok(root)
}

fn rename(value: &mut Value, short_names: &HashMap<String, String>) {
    if let Some(short) = short_names.get(str_or_empty(value, "name")) {
        value["name"] = json!(short);
    }
}

// ============================================================================
// 响应
// ============================================================================

/// 解析 Codex 非流式响应
///
/// 接受三种形态：单个完成事件、裸响应对象、完整的 SSE 响应体。
fn parse_response(raw: &[u8]) -> Result<ResponseMessage, TranslateError> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| TranslateError::malformed(format!("响应体不是有效的 UTF-8: {e}")))?;

    if text.trim_start().starts_with('{') {
        let root = parse_document(raw)?;
        return match str_or_empty(&root, "type") {
            "response.completed" | "response.incomplete" | "response.failed" => root
                .get("response")
                .map(parse_response_object)
                .ok_or_else(|| TranslateError::conversion("完成事件缺少 response")),
            "error" => Err(TranslateError::conversion(format!(
                "上游返回错误: {}",
                str_or_empty(&root, "message")
            ))),
            _ => Ok(parse_response_object(&root)),
        };
    }

    parse_sse_body(text)
}

fn parse_sse_body(body: &str) -> Result<ResponseMessage, TranslateError> {
    let mut done_items = Vec::new();
    let mut completed: Option<Value> = None;

    for payload in data_payloads(body) {
        let payload = payload.as_ref();
        if payload == DONE {
            continue;
        }
        let Ok(event) = serde_json::from_str::<Value>(payload) else {
            tracing::debug!("[TRANSLATOR] 跳过无法解析的 Codex 事件: {}", payload);
            continue;
        };
        match str_or_empty(&event, "type") {
            "response.output_item.done" => {
                if let Some(item) = event.get("item") {
                    done_items.push(item.clone());
                }
            }
            "response.completed" | "response.incomplete" | "response.failed" => {
                completed = event.get("response").cloned();
            }
            "error" => {
                return Err(TranslateError::conversion(format!(
                    "上游返回错误: {}",
                    str_or_empty(&event, "message")
                )))
            }
            _ => {}
        }
    }

    let mut response =
        completed.ok_or_else(|| TranslateError::conversion("Codex 响应缺少完成事件"))?;
    // 完成事件未携带输出项时使用逐项完成事件
    let output_empty = response
        .get("output")
        .and_then(Value::as_array)
        .map_or(true, Vec::is_empty);
    if output_empty && !done_items.is_empty() {
        response["output"] = Value::Array(done_items);
    }
    Ok(parse_response_object(&response))
}
