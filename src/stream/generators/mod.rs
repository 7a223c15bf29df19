//! SSE 流生成器
//!
//! 将 `BlockEvent` 转换为不同客户端协议的 SSE 格式。
//!
//! # 支持的格式
//!
//! - OpenAI Chat Completions (data: {...})
//! - Anthropic Messages (event: xxx\ndata: {...})
//! - OpenAI Responses (event: response.*\ndata: {...})
//! - Gemini / Gemini CLI (data: {...})

pub mod anthropic_sse;
pub mod gemini_sse;
pub mod openai_sse;
pub mod responses_sse;

pub use anthropic_sse::AnthropicSseGenerator;
pub use gemini_sse::GeminiSseGenerator;
pub use openai_sse::OpenAiSseGenerator;
pub use responses_sse::ResponsesSseGenerator;

use crate::models::Format;
use crate::stream::events::BlockEvent;

/// SSE 生成器封装
#[derive(Debug)]
pub enum SseGenerator {
    Anthropic(AnthropicSseGenerator),
    OpenAi(OpenAiSseGenerator),
    Responses(ResponsesSseGenerator),
    Gemini(GeminiSseGenerator),
}

impl SseGenerator {
    /// 客户端格式对应的生成器
    pub fn for_client(format: Format, model: &str) -> Self {
        let model = model.to_string();
        match format {
            Format::Claude => Self::Anthropic(AnthropicSseGenerator::new(model)),
            Format::OpenAI => Self::OpenAi(OpenAiSseGenerator::new(model)),
            Format::OpenAIResponses | Format::Codex => {
                Self::Responses(ResponsesSseGenerator::new(model))
            }
            Format::Gemini => Self::Gemini(GeminiSseGenerator::new(model, false)),
            Format::GeminiCli => Self::Gemini(GeminiSseGenerator::new(model, true)),
        }
    }

    pub fn generate(&mut self, event: &BlockEvent) -> Vec<String> {
        match self {
            Self::Anthropic(g) => g.generate(event),
            Self::OpenAi(g) => g.generate(event),
            Self::Responses(g) => g.generate(event),
            Self::Gemini(g) => g.generate(event),
        }
    }
}
