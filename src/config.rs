//! 转换引擎配置
//!
//! YAML 格式，所有段均可省略：
//!
//! ```yaml
//! filter:
//!   deny-tools: [BashOutput]
//! format-aliases:
//!   kiro-claude: claude
//! logging:
//!   level: info
//!   ansi: true
//! ```

use crate::models::{Format, FormatResolver};
use crate::stream::filter::{ToolFilter, DEFAULT_DENY_TOOLS};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("读取配置文件失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("配置解析失败: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// 转换引擎配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TranslatorConfig {
    #[serde(default)]
    pub filter: FilterConfig,

    /// 额外的格式名称
    #[serde(default)]
    pub format_aliases: HashMap<String, Format>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 工具过滤配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FilterConfig {
    /// 从客户端可见输出中移除的工具名称（区分大小写）
    #[serde(default = "default_deny_tools")]
    pub deny_tools: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            deny_tools: default_deny_tools(),
        }
    }
}

fn default_deny_tools() -> Vec<String> {
    DEFAULT_DENY_TOOLS.iter().map(|s| s.to_string()).collect()
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LoggingConfig {
    /// `EnvFilter` 语法，`RUST_LOG` 优先
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_ansi")]
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            ansi: default_ansi(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_ansi() -> bool {
    true
}

impl TranslatorConfig {
    /// 从 YAML 文件加载
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_yaml_str(&content)?;
        tracing::info!("[CONFIG] 已加载配置: {:?}", path);
        Ok(config)
    }

    /// 从 YAML 文本解析，空文本得到默认配置
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn tool_filter(&self) -> ToolFilter {
        ToolFilter::new(self.filter.deny_tools.iter().cloned())
    }

    pub fn format_resolver(&self) -> FormatResolver {
        FormatResolver::with_aliases(&self.format_aliases)
    }
}
