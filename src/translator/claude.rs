//! Claude 上游的转换器注册

use super::registry::TranslatorRegistry;
use crate::protocol::{Claude, Gemini, GeminiCli, OpenAiChat};

pub fn register(registry: &mut TranslatorRegistry) {
    registry.register_pair::<OpenAiChat, Claude>();
    registry.register_pair::<Gemini, Claude>();
    registry.register_pair::<GeminiCli, Claude>();
}
