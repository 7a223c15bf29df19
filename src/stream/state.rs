//! 单次流式请求的转换状态
//!
//! `StreamState` 由调用方为每个流式请求创建，在每个上游 chunk 的转换调用
//! 之间以 `&mut` 传入。它负责：
//!
//! - 按首次出现的顺序分配单调递增、连续且不复用的下游块索引
//! - 在工具名称确定时应用过滤规则，被过滤的调用不产生任何下游事件
//! - 按 call id 或上游位置关联工具参数增量
//! - 记录最新的使用量（覆盖而非累加）
//! - 保证恰好一个完成事件，且为最后一个输出

use crate::models::Format;
use crate::protocol::ToolCatalog;
use crate::stream::events::{BlockDelta, BlockEvent, BlockType, StopReason, StreamEvent, ToolKey, Usage};
use crate::stream::generators::SseGenerator;
use crate::stream::parsers::UpstreamParser;
use crate::stream::sse;
use crate::translator::{TranslateContext, TranslateError};

/// 已分配索引的下游内容块
#[derive(Debug, Clone, PartialEq)]
pub struct BlockRecord {
    pub block: BlockType,
    /// 累积内容（文本或参数 JSON）
    pub content: String,
    pub open: bool,
}

/// 工具调用记录
#[derive(Debug, Clone, PartialEq)]
struct ToolCallRecord {
    call_id: Option<String>,
    position: Option<u64>,
    name: String,
    /// 打开时计算一次
    filtered: bool,
    /// 被过滤的调用没有下游索引
    index: Option<u32>,
    open: bool,
}

/// 流式转换状态
#[derive(Debug, Default)]
pub struct StreamState {
    blocks: Vec<BlockRecord>,
    tool_calls: Vec<ToolCallRecord>,
    open_text: Option<u32>,
    open_thinking: Option<u32>,
    usage: Usage,
    pending_stop: Option<StopReason>,
    tool_use_completed: bool,
    message_started: bool,
    terminated: bool,
    catalog: Option<ToolCatalog>,
    generator: Option<SseGenerator>,
}

impl StreamState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已分配的下游块（下标即索引）
    pub fn blocks(&self) -> &[BlockRecord] {
        &self.blocks
    }

    /// 下一个可分配的索引
    pub fn next_index(&self) -> u32 {
        self.blocks.len() as u32
    }

    pub fn usage(&self) -> &Usage {
        &self.usage
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn tool_use_completed(&self) -> bool {
        self.tool_use_completed
    }

    pub fn pending_stop(&self) -> Option<&StopReason> {
        self.pending_stop.as_ref()
    }

    /// 处理一个上游 chunk，返回客户端格式的 SSE 字符串
    ///
    /// `catalog` 只在第一次调用时求值，用于还原被缩短的工具名称。
    pub fn process(
        &mut self,
        ctx: &TranslateContext,
        upstream: UpstreamParser,
        client: Format,
        model: &str,
        catalog: impl FnOnce() -> ToolCatalog,
        chunk: &[u8],
    ) -> Result<Vec<String>, TranslateError> {
        let text = std::str::from_utf8(chunk)
            .map_err(|e| TranslateError::malformed(format!("chunk 不是有效的 UTF-8: {e}")))?;

        if self.catalog.is_none() {
            self.catalog = Some(catalog());
        }
        if self.generator.is_none() {
            self.generator = Some(SseGenerator::for_client(client, model));
        }

        // 先解析整个 chunk，解析失败时状态保持不变
        let mut events = Vec::new();
        for payload in sse::data_payloads(text) {
            events.extend(upstream.parse(&payload)?);
        }

        let mut output = Vec::new();
        for event in events {
            let block_events = self.apply(ctx, event)?;
            if let Some(generator) = self.generator.as_mut() {
                for block_event in &block_events {
                    output.extend(generator.generate(block_event));
                }
            }
        }
        Ok(output)
    }

    /// 应用一个上游事件，返回过滤和索引分配后的下游事件
    pub fn apply(
        &mut self,
        ctx: &TranslateContext,
        event: StreamEvent,
    ) -> Result<Vec<BlockEvent>, TranslateError> {
        if self.terminated {
            tracing::warn!(
                "[STREAM] 请求 {} 在完成事件之后收到数据: {:?}",
                ctx.request_id(),
                event
            );
            return Err(TranslateError::protocol("完成事件之后收到数据"));
        }

        let mut out = Vec::new();
        match event {
            StreamEvent::MessageStart { id, model } => {
                if !self.message_started {
                    self.message_started = true;
                    out.push(BlockEvent::MessageStart { id, model });
                }
            }

            StreamEvent::TextDelta { text } => {
                if !text.is_empty() {
                    self.close_thinking(&mut out);
                    let index = match self.open_text {
                        Some(index) => index,
                        None => {
                            let index = self.open_block(BlockType::Text, &mut out);
                            self.open_text = Some(index);
                            index
                        }
                    };
                    self.blocks[index as usize].content.push_str(&text);
                    out.push(BlockEvent::BlockDelta {
                        index,
                        delta: BlockDelta::Text(text),
                    });
                }
            }

            StreamEvent::TextStop => self.close_text(&mut out),

            StreamEvent::ThinkingDelta { text } => {
                if !text.is_empty() {
                    self.close_text(&mut out);
                    let index = match self.open_thinking {
                        Some(index) => index,
                        None => {
                            let index = self.open_block(BlockType::Thinking, &mut out);
                            self.open_thinking = Some(index);
                            index
                        }
                    };
                    self.blocks[index as usize].content.push_str(&text);
                    out.push(BlockEvent::BlockDelta {
                        index,
                        delta: BlockDelta::Thinking(text),
                    });
                }
            }

            StreamEvent::ThinkingStop => self.close_thinking(&mut out),

            StreamEvent::ToolUseStart { key, id, name } => {
                self.open_tool(ctx, key, id, name, &mut out);
            }

            StreamEvent::ToolUseInputDelta { key, partial_json } => {
                let slot = self.find_open_tool(&key).ok_or_else(|| {
                    tracing::warn!(
                        "[STREAM] 请求 {} 收到未打开工具调用的参数增量: {:?}",
                        ctx.request_id(),
                        key
                    );
                    TranslateError::protocol(format!("工具调用参数增量先于打开事件: {key:?}"))
                })?;
                let record = &self.tool_calls[slot];
                if let (Some(index), false) = (record.index, partial_json.is_empty()) {
                    self.blocks[index as usize].content.push_str(&partial_json);
                    out.push(BlockEvent::BlockDelta {
                        index,
                        delta: BlockDelta::InputJson(partial_json),
                    });
                }
            }

            StreamEvent::ToolUseStop { key, arguments } => {
                let slot = self.find_open_tool(&key).ok_or_else(|| {
                    tracing::warn!(
                        "[STREAM] 请求 {} 收到未打开工具调用的结束事件: {:?}",
                        ctx.request_id(),
                        key
                    );
                    TranslateError::protocol(format!("工具调用结束先于打开事件: {key:?}"))
                })?;
                self.close_tool(slot, arguments, &mut out);
            }

            StreamEvent::ContentStop { position } => {
                match self.find_open_tool(&ToolKey::at(position)) {
                    Some(slot) => self.close_tool(slot, None, &mut out),
                    None => {
                        self.close_text(&mut out);
                        self.close_thinking(&mut out);
                    }
                }
            }

            StreamEvent::Usage(usage) => self.usage.merge(&usage),

            StreamEvent::StopHint(reason) => self.pending_stop = Some(reason),

            StreamEvent::MessageStop { stop_reason, usage } => {
                if let Some(usage) = usage {
                    self.usage.merge(&usage);
                }
                self.close_text(&mut out);
                self.close_thinking(&mut out);
                while let Some(slot) = self.tool_calls.iter().position(|r| r.open) {
                    self.close_tool(slot, None, &mut out);
                }

                let stop_reason = match stop_reason.or_else(|| self.pending_stop.take()) {
                    Some(reason) if reason.is_passthrough() => reason,
                    _ if self.tool_use_completed => StopReason::ToolUse,
                    _ => StopReason::EndTurn,
                };
                tracing::debug!(
                    "[STREAM] 请求 {} 完成: stop_reason={:?}, blocks={}",
                    ctx.request_id(),
                    stop_reason,
                    self.blocks.len()
                );
                out.push(BlockEvent::Completed {
                    stop_reason,
                    usage: self.usage.clone(),
                });
                self.terminated = true;
            }

            StreamEvent::Error {
                error_type,
                message,
            } => {
                tracing::warn!(
                    "[STREAM] 请求 {} 上游错误事件: {} {}",
                    ctx.request_id(),
                    error_type,
                    message
                );
                out.push(BlockEvent::Error {
                    error_type,
                    message,
                });
            }
        }
        Ok(out)
    }

    fn open_block(&mut self, block: BlockType, out: &mut Vec<BlockEvent>) -> u32 {
        let index = self.next_index();
        self.blocks.push(BlockRecord {
            block: block.clone(),
            content: String::new(),
            open: true,
        });
        out.push(BlockEvent::BlockStart { index, block });
        index
    }

    fn close_block(&mut self, index: u32, out: &mut Vec<BlockEvent>) {
        if let Some(record) = self.blocks.get_mut(index as usize) {
            if record.open {
                record.open = false;
                out.push(BlockEvent::BlockStop {
                    index,
                    block: record.block.clone(),
                    content: record.content.clone(),
                });
            }
        }
    }

    fn close_text(&mut self, out: &mut Vec<BlockEvent>) {
        if let Some(index) = self.open_text.take() {
            self.close_block(index, out);
        }
    }

    fn close_thinking(&mut self, out: &mut Vec<BlockEvent>) {
        if let Some(index) = self.open_thinking.take() {
            self.close_block(index, out);
        }
    }

    fn open_tool(
        &mut self,
        ctx: &TranslateContext,
        key: ToolKey,
        id: String,
        name: String,
        out: &mut Vec<BlockEvent>,
    ) {
        // 部分上游在每个 chunk 中重复携带 call id
        if let Some(call_id) = &key.call_id {
            if self
                .tool_calls
                .iter()
                .any(|r| r.open && r.call_id.as_ref() == Some(call_id))
            {
                return;
            }
        }

        let name = match &self.catalog {
            Some(catalog) => catalog.restore(&name),
            None => name,
        };
        let filtered = ctx.tool_filter.is_filtered(&name);

        let index = if filtered {
            tracing::debug!(
                "[STREAM] 请求 {} 过滤工具调用: {} ({})",
                ctx.request_id(),
                name,
                id
            );
            None
        } else {
            self.close_text(out);
            self.close_thinking(out);
            Some(self.open_block(
                BlockType::ToolUse {
                    id,
                    name: name.clone(),
                },
                out,
            ))
        };

        self.tool_calls.push(ToolCallRecord {
            call_id: key.call_id,
            position: key.position,
            name,
            filtered,
            index,
            open: true,
        });
    }

    /// 按 call id 查找，找不到时按位置查找同位置最近打开的调用
    fn find_open_tool(&self, key: &ToolKey) -> Option<usize> {
        if let Some(call_id) = &key.call_id {
            if let Some(slot) = self
                .tool_calls
                .iter()
                .rposition(|r| r.open && r.call_id.as_ref() == Some(call_id))
            {
                return Some(slot);
            }
        }
        match key.position {
            Some(position) => self
                .tool_calls
                .iter()
                .rposition(|r| r.open && r.position == Some(position)),
            None if key.call_id.is_none() => self.tool_calls.iter().rposition(|r| r.open),
            None => None,
        }
    }

    fn close_tool(&mut self, slot: usize, arguments: Option<String>, out: &mut Vec<BlockEvent>) {
        if self.tool_calls[slot].filtered {
            let record = self.tool_calls.remove(slot);
            tracing::debug!("[STREAM] 丢弃被过滤的工具调用: {}", record.name);
            return;
        }

        self.tool_calls[slot].open = false;
        if let Some(index) = self.tool_calls[slot].index {
            // 没有流式参数增量、只在结束时给出完整参数的上游
            if let Some(arguments) = arguments.filter(|a| !a.is_empty()) {
                let content = &mut self.blocks[index as usize].content;
                if content.is_empty() {
                    content.push_str(&arguments);
                    out.push(BlockEvent::BlockDelta {
                        index,
                        delta: BlockDelta::InputJson(arguments),
                    });
                }
            }
            self.tool_use_completed = true;
            self.close_block(index, out);
        }
    }
}
