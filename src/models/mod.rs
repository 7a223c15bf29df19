//! 数据模型
//!
//! - `format`：线协议格式标识和解析器
//! - `request`：中性请求模型
//! - `response`：中性响应模型（非流式）

pub mod format;
pub mod request;
pub mod response;

pub use format::{Format, FormatResolver};
pub use request::{
    ChatRequest, ContentPart, ConversationItem, GenerationParams, ImageSource, Role, ToolChoice,
    ToolDefinition,
};
pub use response::{ContentBlock, ResponseMessage};
