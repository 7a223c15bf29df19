//! Gemini / Gemini CLI 编解码（客户端侧）
//!
//! Gemini CLI 的请求体为 `{"model": ..., "request": {...}}`，
//! 响应体为 `{"response": {...}}`，内层结构与 Gemini 相同。

use super::claude::effort_for_budget;
use super::field::{array_field, f64_field, object_field, str_field, str_or_empty, u64_field};
use super::ClientProtocol;
use crate::models::{
    ChatRequest, ContentBlock, ContentPart, ConversationItem, Format, GenerationParams,
    ImageSource, ResponseMessage, Role, ToolChoice, ToolDefinition,
};
use crate::stream::generators::gemini_sse::{parse_args, render_usage};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, VecDeque};

/// Gemini 格式
#[derive(Debug, Clone, Copy, Default)]
pub struct Gemini;

/// Gemini CLI 格式
#[derive(Debug, Clone, Copy, Default)]
pub struct GeminiCli;

impl ClientProtocol for Gemini {
    const FORMAT: Format = Format::Gemini;

    fn read_request(root: &Value) -> ChatRequest {
        read_request(root)
    }

    fn render_response(message: &ResponseMessage) -> Value {
        render_response(message)
    }
}

impl ClientProtocol for GeminiCli {
    const FORMAT: Format = Format::GeminiCli;

    fn read_request(root: &Value) -> ChatRequest {
        match object_field(root, "request").ok("request") {
            Some(inner) => read_request(inner),
            None => read_request(root),
        }
    }

    fn render_response(message: &ResponseMessage) -> Value {
        json!({ "response": render_response(message) })
    }
}

// ============================================================================
// 请求读取
// ============================================================================

/// 为没有 id 的 functionCall 分配 `call_<n>`，functionResponse 按名称匹配
#[derive(Default)]
struct CallIds {
    next: usize,
    pending: HashMap<String, VecDeque<String>>,
}

impl CallIds {
    fn open(&mut self, name: &str, id: Option<&str>) -> String {
        let id = match id {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => self.fresh(),
        };
        self.pending
            .entry(name.to_string())
            .or_default()
            .push_back(id.clone());
        id
    }

    fn resolve(&mut self, name: &str, id: Option<&str>) -> String {
        if let Some(id) = id.filter(|id| !id.is_empty()) {
            if let Some(queue) = self.pending.get_mut(name) {
                queue.retain(|pending| pending != id);
            }
            return id.to_string();
        }
        match self.pending.get_mut(name).and_then(VecDeque::pop_front) {
            Some(id) => id,
            None => self.fresh(),
        }
    }

    fn fresh(&mut self) -> String {
        let id = format!("call_{}", self.next);
        self.next += 1;
        id
    }
}

fn read_request(root: &Value) -> ChatRequest {
    let system = object_field(root, "systemInstruction")
        .ok("systemInstruction")
        .or_else(|| object_field(root, "system_instruction").ok("system_instruction"));
    let mut request = ChatRequest {
        instructions: system.map(parts_text).filter(|s| !s.is_empty()),
        ..Default::default()
    };

    let mut ids = CallIds::default();
    for content in array_field(root, "contents").ok("contents").into_iter().flatten() {
        let role = match str_or_empty(content, "role") {
            "model" => Role::Assistant,
            _ => Role::User,
        };
        let mut parts = Vec::new();
        for part in array_field(content, "parts").ok("contents[].parts").into_iter().flatten() {
            if let Some(text) = part.get("text").and_then(Value::as_str) {
                // 思考片段不回传
                if part.get("thought").and_then(Value::as_bool) != Some(true) {
                    parts.push(ContentPart::Text(text.to_string()));
                }
            } else if let Some(data) = part.get("inlineData") {
                parts.push(ContentPart::Image(ImageSource::Base64 {
                    media_type: str_or_empty(data, "mimeType").to_string(),
                    data: str_or_empty(data, "data").to_string(),
                }));
            } else if let Some(file) = part.get("fileData") {
                parts.push(ContentPart::Image(ImageSource::from_url(str_or_empty(
                    file, "fileUri",
                ))));
            } else if let Some(call) = part.get("functionCall") {
                flush(&mut request.items, role, &mut parts);
                let name = str_or_empty(call, "name");
                request.items.push(ConversationItem::ToolCall {
                    id: ids.open(name, call.get("id").and_then(Value::as_str)),
                    name: name.to_string(),
                    arguments: call
                        .get("args")
                        .map(Value::to_string)
                        .unwrap_or_else(|| "{}".to_string()),
                });
            } else if let Some(response) = part.get("functionResponse") {
                flush(&mut request.items, role, &mut parts);
                let name = str_or_empty(response, "name");
                request.items.push(ConversationItem::ToolResult {
                    call_id: ids.resolve(name, response.get("id").and_then(Value::as_str)),
                    output: response_text(response.get("response").unwrap_or(&Value::Null)),
                });
            } else {
                tracing::debug!("[TRANSLATOR] 跳过不支持的 Gemini 片段");
            }
        }
        flush(&mut request.items, role, &mut parts);
    }

    for tool in array_field(root, "tools").ok("tools").into_iter().flatten() {
        for decl in array_field(tool, "functionDeclarations")
            .ok("tools[].functionDeclarations")
            .into_iter()
            .flatten()
        {
            request.tools.push(ToolDefinition {
                name: str_or_empty(decl, "name").to_string(),
                description: str_field(decl, "description")
                    .ok("functionDeclarations[].description")
                    .map(str::to_string),
                parameters: decl
                    .get("parameters")
                    .or_else(|| decl.get("parametersJsonSchema"))
                    .filter(|p| !p.is_null())
                    .cloned(),
            });
        }
    }

    request.tool_choice = root
        .get("toolConfig")
        .and_then(|c| c.get("functionCallingConfig"))
        .and_then(read_tool_choice);

    let config = object_field(root, "generationConfig")
        .ok("generationConfig")
        .unwrap_or(&Value::Null);
    let thinking = config.get("thinkingConfig").unwrap_or(&Value::Null);
    let reasoning_effort = str_field(thinking, "thinkingLevel")
        .ok("thinkingConfig.thinkingLevel")
        .map(str::to_lowercase)
        .or_else(|| {
            u64_field(thinking, "thinkingBudget")
                .ok("thinkingConfig.thinkingBudget")
                .filter(|budget| *budget > 0)
                .map(|budget| effort_for_budget(budget).to_string())
        });
    request.params = GenerationParams {
        max_tokens: u64_field(config, "maxOutputTokens").ok("generationConfig.maxOutputTokens"),
        temperature: f64_field(config, "temperature").ok("generationConfig.temperature"),
        top_p: f64_field(config, "topP").ok("generationConfig.topP"),
        top_k: u64_field(config, "topK").ok("generationConfig.topK"),
        stop: array_field(config, "stopSequences")
            .ok("generationConfig.stopSequences")
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        parallel_tool_calls: None,
        reasoning_effort,
    };
    request
}

fn flush(items: &mut Vec<ConversationItem>, role: Role, parts: &mut Vec<ContentPart>) {
    if !parts.is_empty() {
        items.push(ConversationItem::Message {
            role,
            parts: std::mem::take(parts),
        });
    }
}

fn parts_text(content: &Value) -> String {
    content
        .get("parts")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("\n")
}

/// functionResponse.response 转为文本，单一结果字段直接取值
fn response_text(response: &Value) -> String {
    if let Some(obj) = response.as_object().filter(|o| o.len() == 1) {
        for key in ["output", "result", "content"] {
            if let Some(Value::String(s)) = obj.get(key) {
                return s.clone();
            }
        }
    }
    match response {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn read_tool_choice(config: &Value) -> Option<ToolChoice> {
    match str_or_empty(config, "mode").to_ascii_uppercase().as_str() {
        "AUTO" => Some(ToolChoice::Auto),
        "NONE" => Some(ToolChoice::None),
        "ANY" => {
            let allowed = config
                .get("allowedFunctionNames")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            match allowed {
                [only] => only
                    .as_str()
                    .map(|name| ToolChoice::Function(name.to_string())),
                _ => Some(ToolChoice::Required),
            }
        }
        _ => None,
    }
}

// ============================================================================
// 响应渲染
// ============================================================================

fn render_response(message: &ResponseMessage) -> Value {
    let parts: Vec<Value> = message
        .blocks
        .iter()
        .map(|block| match block {
            ContentBlock::Text(text) => json!({ "text": text }),
            ContentBlock::Thinking { text, .. } => json!({ "text": text, "thought": true }),
            ContentBlock::ToolUse {
                id,
                name,
                arguments,
            } => json!({
                "functionCall": { "id": id, "name": name, "args": parse_args(arguments) }
            }),
        })
        .collect();

    let mut response = Map::new();
    response.insert(
        "candidates".into(),
        json!([{
            "content": { "role": "model", "parts": parts },
            "finishReason": message.stop_reason().to_gemini_str(),
            "index": 0
        }]),
    );
    response.insert("usageMetadata".into(), render_usage(&message.usage));
    response.insert("modelVersion".into(), json!(message.model));
    if !message.id.is_empty() {
        response.insert("responseId".into(), json!(message.id));
    }
    Value::Object(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{StopReason, Usage};

    #[test]
    fn test_read_request_assigns_call_ids() {
        let root = json!({
            "systemInstruction": {"parts": [{"text": "Be brief."}]},
            "contents": [
                {"role": "user", "parts": [{"text": "hi"}]},
                {"role": "model", "parts": [
                    {"functionCall": {"name": "Read", "args": {"p": 1}}},
                    {"functionCall": {"name": "Grep", "args": {}}}
                ]},
                {"role": "user", "parts": [
                    {"functionResponse": {"name": "Grep", "response": {"output": "g"}}},
                    {"functionResponse": {"name": "Read", "response": {"output": "r"}}}
                ]}
            ],
            "tools": [{"functionDeclarations": [{"name": "Read"}, {"name": "Grep"}]}],
            "toolConfig": {"functionCallingConfig": {"mode": "ANY", "allowedFunctionNames": ["Read"]}},
            "generationConfig": {"maxOutputTokens": 100, "topK": 3, "thinkingConfig": {"thinkingBudget": 2048}}
        });
        let request = read_request(&root);

        assert_eq!(request.instructions.as_deref(), Some("Be brief."));
        assert_eq!(request.items.len(), 5);
        assert!(matches!(&request.items[1], ConversationItem::ToolCall { id, .. } if id == "call_0"));
        assert!(matches!(&request.items[2], ConversationItem::ToolCall { id, .. } if id == "call_1"));
        assert_eq!(
            request.items[3],
            ConversationItem::ToolResult {
                call_id: "call_1".to_string(),
                output: "g".to_string()
            }
        );
        assert_eq!(
            request.items[4],
            ConversationItem::ToolResult {
                call_id: "call_0".to_string(),
                output: "r".to_string()
            }
        );
        assert_eq!(request.tool_choice, Some(ToolChoice::Function("Read".to_string())));
        assert_eq!(request.params.max_tokens, Some(100));
        assert_eq!(request.params.top_k, Some(3));
        assert_eq!(request.params.reasoning_effort.as_deref(), Some("low"));
    }

    #[test]
    fn test_cli_unwraps_request() {
        let root = json!({
            "model": "gemini-2.5-pro",
            "request": {"contents": [{"role": "user", "parts": [{"text": "hi"}]}]}
        });
        let request = GeminiCli::read_request(&root);
        assert_eq!(request.items, vec![ConversationItem::text(Role::User, "hi")]);
    }

    #[test]
    fn test_render_response() {
        let message = ResponseMessage {
            id: "resp_1".to_string(),
            model: "gpt-5".to_string(),
            blocks: vec![
                ContentBlock::Text("Hi".to_string()),
                ContentBlock::ToolUse {
                    id: "call_1".to_string(),
                    name: "Read".to_string(),
                    arguments: "{\"p\":1}".to_string(),
                },
            ],
            stop_reason: Some(StopReason::ToolUse),
            usage: Usage::new(2, 3),
            created: None,
        };
        let out = render_response(&message);
        let candidate = &out["candidates"][0];
        assert_eq!(candidate["content"]["parts"][0]["text"], "Hi");
        assert_eq!(candidate["content"]["parts"][1]["functionCall"]["args"]["p"], 1);
        assert_eq!(candidate["finishReason"], "STOP");
        assert_eq!(out["usageMetadata"]["totalTokenCount"], 5);

        let cli = GeminiCli::render_response(&message);
        assert_eq!(cli["response"]["responseId"], "resp_1");
    }
}
