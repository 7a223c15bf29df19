//! 协议转换层
//!
//! 处理客户端协议（OpenAI、OpenAI Responses、Anthropic、Gemini、Gemini CLI）
//! 与上游协议（Codex、Claude、OpenAI）之间的请求和响应格式转换。
//!
//! # 架构设计
//!
//! ```text
//! translator/
//! ├── traits.rs     # 转换函数签名、转换束、上下文和错误
//! ├── convert.rs    # 泛型转换函数（reader → ChatRequest → writer）
//! ├── registry.rs   # 以 (客户端, 上游) 为键的注册表
//! ├── codex.rs      # Codex 上游的格式对
//! ├── claude.rs     # Claude 上游的格式对
//! └── openai.rs     # OpenAI Chat 上游的格式对
//! ```
//!
//! # 使用示例
//!
//! ```ignore
//! use transcast::models::Format;
//! use transcast::stream::StreamState;
//! use transcast::translator::{TranslateContext, TranslatorRegistry};
//!
//! let registry = TranslatorRegistry::with_defaults();
//!
//! // 请求转换
//! let body = registry.translate_request(Format::Claude, Format::Codex, "gpt-5-codex", &raw, true)?;
//!
//! // 响应转换
//! let ctx = TranslateContext::new();
//! let mut state = StreamState::new();
//! for event in upstream_events {
//!     for sse in registry.translate_stream(
//!         Format::Claude, Format::Codex, &ctx, "gpt-5-codex", &raw, None, &event, &mut state,
//!     )? {
//!         // 发送 SSE 到客户端
//!     }
//! }
//! ```

pub mod claude;
pub mod codex;
pub mod convert;
pub mod openai;
pub mod registry;
pub mod traits;

// 重新导出核心类型
pub use registry::{global, install_global, TranslatorRegistry};
pub use traits::{
    NonStreamTransform, RequestTransform, ResponseTranslator, StreamTransform, TranslateContext,
    TranslateError, TranslateErrorKind, TranslatorBundle,
};
