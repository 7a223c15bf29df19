//! 流式处理层
//!
//! 提供统一的流式响应转换能力，包括：
//! - 事件类型定义 (events)
//! - 上游流格式解析 (parsers)
//! - 过滤、索引分配和终止控制 (state, filter)
//! - 客户端流格式生成 (generators)
//! - 异步字节流适配 (pipeline)
//!
//! # 架构设计
//!
//! ```text
//! 上游 SSE ──> [Parser] ──> StreamEvent ──> [StreamState] ──> BlockEvent ──> [Generator] ──> 客户端 SSE
//!
//! 例如：
//! Codex 事件 ──> [codex::parse_event] ──> StreamEvent ──> [StreamState] ──> [AnthropicSseGenerator] ──> Anthropic SSE
//! Chat chunk ──> [openai::parse_chunk] ──> StreamEvent ──> [StreamState] ──> [ResponsesSseGenerator] ──> Responses SSE
//! ```

pub mod events;
pub mod filter;
pub mod generators;
pub mod parsers;
pub mod pipeline;
pub mod sse;
pub mod state;

// 重新导出核心类型
pub use events::{BlockDelta, BlockEvent, BlockType, StopReason, StreamEvent, ToolKey, Usage};
pub use filter::ToolFilter;
pub use generators::SseGenerator;
pub use parsers::UpstreamParser;
pub use pipeline::{translate_sse_stream, SseEventBuffer, StreamPipelineError};
pub use state::StreamState;
