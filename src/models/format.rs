//! 协议格式标识
//!
//! 代理支持的所有客户端/上游线协议的封闭枚举，以及把配置或客户端传入的
//! 字符串解析为规范 `Format` 的解析器。

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 线协议格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Format {
    /// OpenAI Chat Completions
    #[serde(rename = "openai")]
    OpenAI,
    /// OpenAI Responses API
    #[serde(rename = "openai-responses")]
    OpenAIResponses,
    /// Anthropic Messages API
    #[serde(rename = "claude")]
    Claude,
    /// Google Gemini generateContent
    #[serde(rename = "gemini")]
    Gemini,
    /// Gemini CLI (Cloud Code Assist) 包装格式
    #[serde(rename = "gemini-cli")]
    GeminiCli,
    /// ChatGPT Codex 后端（Responses 事件语法）
    #[serde(rename = "codex")]
    Codex,
}

impl Format {
    /// 全部格式
    pub const ALL: [Format; 6] = [
        Format::OpenAI,
        Format::OpenAIResponses,
        Format::Claude,
        Format::Gemini,
        Format::GeminiCli,
        Format::Codex,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Format::OpenAI => "openai",
            Format::OpenAIResponses => "openai-responses",
            Format::Claude => "claude",
            Format::Gemini => "gemini",
            Format::GeminiCli => "gemini-cli",
            Format::Codex => "codex",
        }
    }
}

impl std::str::FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Format::OpenAI),
            "openai-responses" | "openai_responses" | "responses" => Ok(Format::OpenAIResponses),
            "claude" | "anthropic" => Ok(Format::Claude),
            "gemini" => Ok(Format::Gemini),
            "gemini-cli" | "gemini_cli" => Ok(Format::GeminiCli),
            "codex" => Ok(Format::Codex),
            _ => Err(format!("Invalid format: {s}")),
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 格式解析器
///
/// 在内置名称之外支持配置中声明的别名（如 `"kiro-claude" -> claude`）。
/// 别名匹配不区分大小写。
#[derive(Debug, Clone, Default)]
pub struct FormatResolver {
    aliases: HashMap<String, Format>,
}

impl FormatResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从别名表创建解析器
    pub fn with_aliases(aliases: &HashMap<String, Format>) -> Self {
        let mut resolver = Self::new();
        for (alias, format) in aliases {
            resolver.add_alias(alias, *format);
        }
        resolver
    }

    /// 添加别名
    pub fn add_alias(&mut self, alias: &str, format: Format) {
        self.aliases.insert(alias.trim().to_lowercase(), format);
    }

    /// 解析格式名称，未知名称返回 `None`
    pub fn resolve(&self, name: &str) -> Option<Format> {
        if let Some(format) = self.aliases.get(&name.trim().to_lowercase()) {
            return Some(*format);
        }
        name.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_roundtrip_names() {
        for format in Format::ALL {
            assert_eq!(format.as_str().parse::<Format>().unwrap(), format);
            assert_eq!(format.to_string(), format.as_str());
        }
    }

    #[test]
    fn test_format_serde_names() {
        let json = serde_json::to_string(&Format::OpenAIResponses).unwrap();
        assert_eq!(json, "\"openai-responses\"");
        let parsed: Format = serde_json::from_str("\"gemini-cli\"").unwrap();
        assert_eq!(parsed, Format::GeminiCli);
    }

    #[test]
    fn test_unknown_format() {
        assert!("kiro".parse::<Format>().is_err());
    }

    #[test]
    fn test_resolver_aliases() {
        let mut resolver = FormatResolver::new();
        resolver.add_alias("Claude-Code", Format::Claude);

        assert_eq!(resolver.resolve("claude-code"), Some(Format::Claude));
        assert_eq!(resolver.resolve("CODEX"), Some(Format::Codex));
        assert_eq!(resolver.resolve("unknown"), None);
    }
}
