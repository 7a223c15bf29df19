//! 协议转换引擎
//!
//! 让一种客户端线协议访问多种上游 LLM 提供商：把请求从客户端格式转换为
//! 上游格式，再把上游响应（完整文档或逐个 SSE 事件）转换回客户端格式，
//! 同时保留工具调用、多段内容、token 使用量和终止原因。
//!
//! # 模块
//!
//! - `models`：格式标识、中性请求/响应模型
//! - `protocol`：各线协议的编解码器
//! - `stream`：流式事件解析、状态机和 SSE 生成
//! - `translator`：转换函数、转换束和注册表
//! - `config` / `logger`：配置加载和日志初始化

pub mod config;
pub mod logger;
pub mod models;
pub mod protocol;
pub mod stream;
pub mod translator;

pub use config::{ConfigError, TranslatorConfig};
pub use models::Format;
pub use stream::{translate_sse_stream, StreamState};
pub use translator::{TranslateContext, TranslateError, TranslatorRegistry};
