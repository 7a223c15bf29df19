//! 转换器注册表
//!
//! 以 `(客户端格式, 上游格式)` 为键保存转换束。注册表在启动时构建完成，
//! 之后只读，可以在线程间共享或安装为进程级全局实例。

use super::convert::{convert_non_stream, convert_request, convert_stream};
use super::traits::{
    RequestTransform, ResponseTranslator, TranslateContext, TranslateError, TranslatorBundle,
};
use super::{claude, codex, openai};
use crate::models::Format;
use crate::protocol::{ClientProtocol, ProviderProtocol};
use crate::stream::StreamState;
use once_cell::sync::OnceCell;
use serde_json::Value;
use std::collections::HashMap;

static GLOBAL: OnceCell<TranslatorRegistry> = OnceCell::new();

/// 转换器注册表
#[derive(Debug, Default)]
pub struct TranslatorRegistry {
    bundles: HashMap<(Format, Format), TranslatorBundle>,
    /// 注册顺序
    order: Vec<(Format, Format)>,
}

impl TranslatorRegistry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册全部内置格式对
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        codex::register(&mut registry);
        claude::register(&mut registry);
        openai::register(&mut registry);
        tracing::info!("[TRANSLATOR] 已注册 {} 个转换器", registry.len());
        registry
    }

    /// 注册转换束，格式对已存在时返回错误
    pub fn try_register(
        &mut self,
        from: Format,
        to: Format,
        request: RequestTransform,
        response: ResponseTranslator,
    ) -> Result<(), TranslateError> {
        if self.bundles.contains_key(&(from, to)) {
            return Err(TranslateError::DuplicateRegistration { from, to });
        }
        self.bundles.insert(
            (from, to),
            TranslatorBundle {
                from,
                to,
                request,
                response,
            },
        );
        self.order.push((from, to));
        tracing::debug!("[TRANSLATOR] 注册转换器: {} -> {}", from, to);
        Ok(())
    }

    /// 注册转换束
    ///
    /// # Panics
    ///
    /// 格式对重复注册属于启动期的编程错误，直接 panic。
    pub fn register(
        &mut self,
        from: Format,
        to: Format,
        request: RequestTransform,
        response: ResponseTranslator,
    ) {
        if let Err(e) = self.try_register(from, to, request, response) {
            panic!("{e}");
        }
    }

    /// 以编解码器类型注册格式对
    pub fn register_pair<C: ClientProtocol, P: ProviderProtocol>(&mut self) {
        self.register_pair_with::<C, P>(convert_request::<C, P>);
    }

    /// 以编解码器类型注册格式对，使用自定义的请求转换
    pub fn register_pair_with<C: ClientProtocol, P: ProviderProtocol>(
        &mut self,
        request: RequestTransform,
    ) {
        self.register(
            C::FORMAT,
            P::FORMAT,
            request,
            ResponseTranslator {
                stream: convert_stream::<C, P>,
                non_stream: convert_non_stream::<C, P>,
            },
        );
    }

    pub fn lookup(&self, from: Format, to: Format) -> Option<&TranslatorBundle> {
        self.bundles.get(&(from, to))
    }

    pub fn is_registered(&self, from: Format, to: Format) -> bool {
        self.bundles.contains_key(&(from, to))
    }

    /// 按注册顺序列出所有格式对
    pub fn pairs(&self) -> Vec<(Format, Format)> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    fn bundle(&self, from: Format, to: Format) -> Result<&TranslatorBundle, TranslateError> {
        self.lookup(from, to)
            .ok_or(TranslateError::UnsupportedConversion { from, to })
    }

    /// 转换请求体
    pub fn translate_request(
        &self,
        from: Format,
        to: Format,
        model: &str,
        raw: &[u8],
        stream: bool,
    ) -> Result<Vec<u8>, TranslateError> {
        let bundle = self.bundle(from, to)?;
        (bundle.request)(model, raw, stream)
    }

    /// 转换完整的非流式响应
    #[allow(clippy::too_many_arguments)]
    pub fn translate_non_stream(
        &self,
        from: Format,
        to: Format,
        ctx: &TranslateContext,
        model: &str,
        original_request: &[u8],
        metadata: Option<&Value>,
        raw: &[u8],
    ) -> Result<String, TranslateError> {
        let bundle = self.bundle(from, to)?;
        (bundle.response.non_stream)(ctx, model, original_request, metadata, raw)
    }

    /// 转换一个流式 chunk
    #[allow(clippy::too_many_arguments)]
    pub fn translate_stream(
        &self,
        from: Format,
        to: Format,
        ctx: &TranslateContext,
        model: &str,
        original_request: &[u8],
        metadata: Option<&Value>,
        chunk: &[u8],
        state: &mut StreamState,
    ) -> Result<Vec<String>, TranslateError> {
        let bundle = self.bundle(from, to)?;
        (bundle.response.stream)(ctx, model, original_request, metadata, chunk, state)
    }
}

/// 安装进程级全局注册表
///
/// 只有第一次安装生效，之后的调用返回已安装的实例。
pub fn install_global(registry: TranslatorRegistry) -> &'static TranslatorRegistry {
    if GLOBAL.set(registry).is_err() {
        tracing::warn!("[TRANSLATOR] 全局注册表已安装，忽略重复安装");
    }
    GLOBAL.get_or_init(TranslatorRegistry::with_defaults)
}

/// 全局注册表，未安装时返回 `None`
pub fn global() -> Option<&'static TranslatorRegistry> {
    GLOBAL.get()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Claude, Codex};

    const DEFAULT_PAIRS: [(Format, Format); 11] = [
        (Format::OpenAI, Format::Codex),
        (Format::Claude, Format::Codex),
        (Format::OpenAIResponses, Format::Codex),
        (Format::Gemini, Format::Codex),
        (Format::GeminiCli, Format::Codex),
        (Format::OpenAI, Format::Claude),
        (Format::Gemini, Format::Claude),
        (Format::GeminiCli, Format::Claude),
        (Format::Claude, Format::OpenAI),
        (Format::OpenAIResponses, Format::OpenAI),
        (Format::Gemini, Format::OpenAI),
    ];

    #[test]
    fn test_defaults_register_all_pairs_in_order() {
        let registry = TranslatorRegistry::with_defaults();
        assert_eq!(registry.pairs(), DEFAULT_PAIRS.to_vec());
        for (from, to) in DEFAULT_PAIRS {
            let bundle = registry.lookup(from, to).unwrap();
            assert_eq!((bundle.from, bundle.to), (from, to));
        }
    }

    #[test]
    fn test_same_format_is_unsupported() {
        let registry = TranslatorRegistry::with_defaults();
        let err = registry
            .translate_request(Format::Claude, Format::Claude, "m", b"{}", false)
            .unwrap_err();
        assert_eq!(
            err,
            TranslateError::UnsupportedConversion {
                from: Format::Claude,
                to: Format::Claude
            }
        );
        assert!(!registry.is_registered(Format::Codex, Format::Claude));
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = TranslatorRegistry::new();
        registry.register_pair::<Claude, Codex>();
        let bundle = *registry.lookup(Format::Claude, Format::Codex).unwrap();
        let err = registry
            .try_register(Format::Claude, Format::Codex, bundle.request, bundle.response)
            .unwrap_err();
        assert_eq!(
            err,
            TranslateError::DuplicateRegistration {
                from: Format::Claude,
                to: Format::Codex
            }
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    #[should_panic]
    fn test_register_panics_on_duplicate() {
        let mut registry = TranslatorRegistry::new();
        registry.register_pair::<Claude, Codex>();
        registry.register_pair::<Claude, Codex>();
    }

    #[test]
    fn test_unknown_pair_in_every_facade() {
        let registry = TranslatorRegistry::new();
        let ctx = TranslateContext::new();
        let mut state = StreamState::new();
        assert!(registry
            .translate_non_stream(Format::Gemini, Format::Codex, &ctx, "m", b"{}", None, b"{}")
            .is_err());
        assert!(registry
            .translate_stream(Format::Gemini, Format::Codex, &ctx, "m", b"{}", None, b"data: {}", &mut state)
            .is_err());
    }

    #[test]
    fn test_install_global() {
        let installed = install_global(TranslatorRegistry::with_defaults());
        assert!(installed.is_registered(Format::Claude, Format::Codex));
        assert!(std::ptr::eq(installed, global().unwrap()));
    }
}
