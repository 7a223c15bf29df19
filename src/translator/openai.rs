//! OpenAI Chat 上游的转换器注册

use super::registry::TranslatorRegistry;
use crate::protocol::{Claude, Gemini, OpenAiChat, Responses};

pub fn register(registry: &mut TranslatorRegistry) {
    registry.register_pair::<Claude, OpenAiChat>();
    registry.register_pair::<Responses, OpenAiChat>();
    registry.register_pair::<Gemini, OpenAiChat>();
}
