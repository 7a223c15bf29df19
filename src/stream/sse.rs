//! SSE 帧处理
//!
//! 上游 chunk 通常是一个完整的 SSE 事件（`event:` + `data:` 行），
//! 也可能是不带 `data:` 前缀的裸 JSON。

use serde_json::Value;
use std::borrow::Cow;

/// 提取 chunk 中所有 `data:` 负载
///
/// 同一事件内的多行 `data:` 以 `\n` 拼接，事件之间以空行分隔。
/// 注释行（`:` 开头）、`event:` / `id:` / `retry:` 行被忽略；
/// 不含任何 SSE 字段的 chunk 整体视为一个负载。
pub fn data_payloads(chunk: &str) -> Vec<Cow<'_, str>> {
    let mut payloads = Vec::new();
    let mut lines: Vec<&str> = Vec::new();
    let mut saw_field = false;

    for line in chunk.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            flush_data(&mut lines, &mut payloads);
        } else if let Some(data) = line.strip_prefix("data:") {
            saw_field = true;
            lines.push(data.strip_prefix(' ').unwrap_or(data));
        } else if line.starts_with(':')
            || line.starts_with("event:")
            || line.starts_with("id:")
            || line.starts_with("retry:")
        {
            saw_field = true;
        }
    }
    flush_data(&mut lines, &mut payloads);

    if !saw_field {
        let trimmed = chunk.trim();
        if !trimmed.is_empty() {
            payloads.push(Cow::Borrowed(trimmed));
        }
    }
    payloads
}

fn flush_data<'a>(lines: &mut Vec<&'a str>, payloads: &mut Vec<Cow<'a, str>>) {
    let data = match lines.as_slice() {
        [] => return,
        [single] => Cow::Borrowed((*single).trim()),
        many => Cow::Owned(many.join("\n").trim().to_string()),
    };
    lines.clear();
    if !data.is_empty() {
        payloads.push(data);
    }
}

/// 格式化一个 SSE 事件
pub fn frame(event: Option<&str>, data: &Value) -> String {
    match event {
        Some(event) => format!("event: {event}\ndata: {data}\n\n"),
        None => format!("data: {data}\n\n"),
    }
}

/// 上游流结束标记
pub const DONE: &str = "[DONE]";

/// OpenAI 风格的结束帧
pub fn done_frame() -> String {
    format!("data: {DONE}\n\n")
}
