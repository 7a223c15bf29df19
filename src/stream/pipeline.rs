//! 异步流处理管道
//!
//! 把上游字节流（网络读取的任意切分）重新组装为完整的 SSE 事件，
//! 逐个交给注册表中的流式转换器，输出客户端 SSE 字符串流。
//!
//! # 使用示例
//!
//! ```ignore
//! let registry = Arc::new(TranslatorRegistry::with_defaults());
//! let sse_stream = translate_sse_stream(
//!     registry,
//!     Format::Claude,
//!     Format::Codex,
//!     TranslateContext::new(),
//!     "gpt-5-codex".to_string(),
//!     Bytes::from(original_request),
//!     None,
//!     upstream_bytes,
//! );
//! ```

use crate::models::Format;
use crate::stream::state::StreamState;
use crate::translator::{TranslateContext, TranslateError, TranslatorRegistry};
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// 管道错误
#[derive(Error, Debug)]
pub enum StreamPipelineError {
    /// 上游字节流错误
    #[error("上游流错误: {0}")]
    Upstream(String),

    #[error(transparent)]
    Translate(#[from] TranslateError),
}

/// SSE 事件缓冲
///
/// 按空行切分事件，`\n` 与 `\r\n` 行尾可以混用，
/// 不完整的尾部保留到下一次读取。
#[derive(Debug, Default)]
pub struct SseEventBuffer {
    buffer: BytesMut,
    /// 已扫描过、不含事件边界的前缀长度
    scanned: usize,
}

impl SseEventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加字节，返回所有已完整的事件
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Bytes> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some((end, sep_len)) = find_event_end(&self.buffer, self.scanned) {
            let event = self.buffer.split_to(end + sep_len).freeze();
            events.push(event.slice(..end));
            self.scanned = 0;
        }
        // 末尾的换行可能是下一个边界的前半部分
        self.scanned = self.buffer.len().saturating_sub(2);
        events
    }

    /// 取出剩余的不完整事件
    pub fn finish(&mut self) -> Option<Bytes> {
        self.scanned = 0;
        if self.buffer.iter().all(u8::is_ascii_whitespace) {
            self.buffer.clear();
            return None;
        }
        Some(self.buffer.split().freeze())
    }
}

/// 从 `from` 开始查找事件边界，返回 (事件长度, 分隔符长度)
fn find_event_end(buf: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut start = from.min(buf.len());
    while let Some(pos) = buf[start..].iter().position(|&b| b == b'\n') {
        let newline = start + pos;
        let rest = &buf[newline + 1..];
        let blank = if rest.starts_with(b"\n") {
            Some(1)
        } else if rest.starts_with(b"\r\n") {
            Some(2)
        } else {
            None
        };
        if let Some(extra) = blank {
            let end = if newline > 0 && buf[newline - 1] == b'\r' {
                newline - 1
            } else {
                newline
            };
            return Some((end, newline + 1 + extra - end));
        }
        start = newline + 1;
    }
    None
}

/// 创建流式转换的异步流
///
/// 上游流在完成事件之前结束时不会补发完成事件，由调用方感知截断。
#[allow(clippy::too_many_arguments)]
pub fn translate_sse_stream<S, E>(
    registry: Arc<TranslatorRegistry>,
    from: Format,
    to: Format,
    ctx: TranslateContext,
    model: String,
    original_request: Bytes,
    metadata: Option<Value>,
    byte_stream: S,
) -> impl Stream<Item = Result<String, StreamPipelineError>>
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    async_stream::stream! {
        let mut state = StreamState::new();
        let mut buffer = SseEventBuffer::new();
        let mut byte_stream = std::pin::pin!(byte_stream);

        while let Some(result) = byte_stream.next().await {
            let bytes = match result {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!("[STREAM] 请求 {} 上游流错误: {}", ctx.request_id(), e);
                    yield Err(StreamPipelineError::Upstream(e.to_string()));
                    return;
                }
            };

            for event in buffer.push(&bytes) {
                match registry.translate_stream(
                    from, to, &ctx, &model, &original_request, metadata.as_ref(), &event, &mut state,
                ) {
                    Ok(chunks) => {
                        for chunk in chunks {
                            yield Ok(chunk);
                        }
                    }
                    Err(e) => {
                        yield Err(StreamPipelineError::from(e));
                        return;
                    }
                }
            }
        }

        if let Some(rest) = buffer.finish() {
            match registry.translate_stream(
                from, to, &ctx, &model, &original_request, metadata.as_ref(), &rest, &mut state,
            ) {
                Ok(chunks) => {
                    for chunk in chunks {
                        yield Ok(chunk);
                    }
                }
                Err(e) => {
                    yield Err(StreamPipelineError::from(e));
                    return;
                }
            }
        }

        if !state.is_terminated() {
            tracing::warn!("[STREAM] 请求 {} 上游在完成事件之前结束", ctx.request_id());
        }
    }
}
