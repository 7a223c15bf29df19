//! 协议转换器类型定义
//!
//! 定义请求和响应转换器的函数签名、转换束以及转换错误。
//!
//! # 设计原则
//!
//! - 转换器是纯函数指针，注册后不可变，可在线程间共享
//! - 请求转换：前端协议请求字节 → 后端协议请求字节
//! - 响应转换：后端响应（完整文档或单个流式 chunk）→ 前端格式
//! - 流式转换的可变状态由调用方持有的 `StreamState` 承载

use crate::config::TranslatorConfig;
use crate::models::Format;
use crate::stream::{StreamState, ToolFilter};
use serde_json::Value;
use thiserror::Error;

/// 请求转换函数
///
/// 参数：目标模型、原始请求体、是否流式
pub type RequestTransform =
    fn(model: &str, raw: &[u8], stream: bool) -> Result<Vec<u8>, TranslateError>;

/// 流式响应转换函数
///
/// 参数：上下文、模型、客户端原始请求、上游元数据、上游 chunk、流状态
pub type StreamTransform = fn(
    ctx: &TranslateContext,
    model: &str,
    original_request: &[u8],
    metadata: Option<&Value>,
    chunk: &[u8],
    state: &mut StreamState,
) -> Result<Vec<String>, TranslateError>;

/// 非流式响应转换函数
pub type NonStreamTransform = fn(
    ctx: &TranslateContext,
    model: &str,
    original_request: &[u8],
    metadata: Option<&Value>,
    raw: &[u8],
) -> Result<String, TranslateError>;

/// 响应转换器（流式 + 非流式）
#[derive(Clone, Copy)]
pub struct ResponseTranslator {
    pub stream: StreamTransform,
    pub non_stream: NonStreamTransform,
}

impl std::fmt::Debug for ResponseTranslator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseTranslator").finish_non_exhaustive()
    }
}

/// 转换束：一个格式对的请求转换器和响应转换器
///
/// 按请求方向 `(from = 客户端, to = 上游)` 注册，
/// 响应转换器反向运行（上游 → 客户端）。
#[derive(Clone, Copy)]
pub struct TranslatorBundle {
    pub from: Format,
    pub to: Format,
    pub request: RequestTransform,
    pub response: ResponseTranslator,
}

impl std::fmt::Debug for TranslatorBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslatorBundle")
            .field("from", &self.from)
            .field("to", &self.to)
            .finish_non_exhaustive()
    }
}

/// 单次请求的转换上下文
#[derive(Debug, Clone, Default)]
pub struct TranslateContext {
    /// 请求 ID（日志关联）
    pub request_id: Option<String>,
    /// 工具过滤规则
    pub tool_filter: ToolFilter,
}

impl TranslateContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从配置创建上下文
    pub fn from_config(config: &TranslatorConfig) -> Self {
        Self {
            request_id: None,
            tool_filter: config.tool_filter(),
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_tool_filter(mut self, tool_filter: ToolFilter) -> Self {
        self.tool_filter = tool_filter;
        self
    }

    /// 日志中使用的请求 ID
    pub fn request_id(&self) -> &str {
        self.request_id.as_deref().unwrap_or("-")
    }
}

/// 转换错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TranslateError {
    /// 没有为该格式对注册转换器
    #[error("不支持的转换: {from} -> {to}")]
    UnsupportedConversion { from: Format, to: Format },

    /// 输入不是可解析的 JSON，或缺少必需的结构
    #[error("无效的输入: {0}")]
    MalformedInput(String),

    /// 单个字段转换失败（通常记录日志后跳过）
    #[error("转换失败: {0}")]
    Conversion(String),

    /// 上游事件顺序违反协议
    #[error("协议违规: {0}")]
    ProtocolViolation(String),

    /// 格式对重复注册
    #[error("重复注册: {from} -> {to}")]
    DuplicateRegistration { from: Format, to: Format },
}

/// 转换错误类型枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslateErrorKind {
    /// 不支持的格式对
    Unsupported,
    /// 无效的输入
    InvalidInput,
    /// 字段转换失败
    Conversion,
    /// 协议违规
    Protocol,
    /// 注册错误（启动期编程错误）
    Registration,
}

impl std::fmt::Display for TranslateErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unsupported => write!(f, "Unsupported"),
            Self::InvalidInput => write!(f, "InvalidInput"),
            Self::Conversion => write!(f, "Conversion"),
            Self::Protocol => write!(f, "Protocol"),
            Self::Registration => write!(f, "Registration"),
        }
    }
}

impl TranslateError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedInput(message.into())
    }

    pub fn conversion(message: impl Into<String>) -> Self {
        Self::Conversion(message.into())
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::ProtocolViolation(message.into())
    }

    pub fn kind(&self) -> TranslateErrorKind {
        match self {
            Self::UnsupportedConversion { .. } => TranslateErrorKind::Unsupported,
            Self::MalformedInput(_) => TranslateErrorKind::InvalidInput,
            Self::Conversion(_) => TranslateErrorKind::Conversion,
            Self::ProtocolViolation(_) => TranslateErrorKind::Protocol,
            Self::DuplicateRegistration { .. } => TranslateErrorKind::Registration,
        }
    }

    /// 调用方返回给客户端的状态码提示
    pub fn status_code(&self) -> u16 {
        match self {
            Self::UnsupportedConversion { .. } => 501,
            Self::MalformedInput(_) => 400,
            Self::Conversion(_) => 422,
            Self::ProtocolViolation(_) => 502,
            Self::DuplicateRegistration { .. } => 500,
        }
    }
}

impl From<serde_json::Error> for TranslateError {
    fn from(e: serde_json::Error) -> Self {
        Self::Conversion(format!("JSON 序列化失败: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_error_display() {
        let err = TranslateError::UnsupportedConversion {
            from: Format::Claude,
            to: Format::Gemini,
        };
        assert_eq!(err.to_string(), "不支持的转换: claude -> gemini");
        assert_eq!(err.kind(), TranslateErrorKind::Unsupported);
    }

    #[test]
    fn test_error_kind_and_status() {
        let err = TranslateError::malformed("not json");
        assert_eq!(err.kind(), TranslateErrorKind::InvalidInput);
        assert_eq!(err.status_code(), 400);

        let err = TranslateError::protocol("delta before open");
        assert_eq!(err.kind(), TranslateErrorKind::Protocol);
        assert_eq!(err.status_code(), 502);
        assert!(err.to_string().contains("delta before open"));
    }

    #[test]
    fn test_context_builder() {
        let ctx = TranslateContext::new()
            .with_request_id("req-1")
            .with_tool_filter(ToolFilter::new(["Dangerous"]));
        assert_eq!(ctx.request_id(), "req-1");
        assert!(ctx.tool_filter.is_filtered("Dangerous"));
        assert!(!ctx.tool_filter.is_filtered("BashOutput"));
        assert_eq!(TranslateContext::new().request_id(), "-");
    }
}
