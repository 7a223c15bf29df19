//! 中性响应模型（非流式）

use crate::protocol::ToolCatalog;
use crate::stream::{StopReason, ToolFilter, Usage};
use serde::{Deserialize, Serialize};

/// 响应内容块
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ContentBlock {
    Text(String),
    Thinking {
        text: String,
        signature: Option<String>,
    },
    ToolUse {
        id: String,
        name: String,
        /// 参数 JSON 文本
        arguments: String,
    },
}

/// 完整的助手响应
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub id: String,
    pub model: String,
    pub blocks: Vec<ContentBlock>,
    /// 上游给出的停止原因
    pub stop_reason: Option<StopReason>,
    pub usage: Usage,
    /// 上游创建时间（秒）
    pub created: Option<i64>,
}

impl ResponseMessage {
    /// 还原工具名称、应用过滤并推导停止原因
    ///
    /// 返回被过滤掉的工具调用数量。
    pub fn finalize(&mut self, model: &str, filter: &ToolFilter, catalog: &ToolCatalog) -> usize {
        if self.model.is_empty() {
            self.model = model.to_string();
        }

        let before = self.blocks.len();
        self.blocks = std::mem::take(&mut self.blocks)
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse {
                    id,
                    name,
                    arguments,
                } => {
                    let name = catalog.restore(&name);
                    if filter.is_filtered(&name) {
                        tracing::debug!("[TRANSLATOR] 过滤工具调用: {} ({})", name, id);
                        None
                    } else {
                        Some(ContentBlock::ToolUse {
                            id,
                            name,
                            arguments,
                        })
                    }
                }
                other => Some(other),
            })
            .collect();
        let filtered = before - self.blocks.len();

        self.stop_reason = Some(match self.stop_reason.take() {
            Some(reason) if reason.is_passthrough() => reason,
            _ if self.has_tool_use() => StopReason::ToolUse,
            _ => StopReason::EndTurn,
        });

        filtered
    }

    pub fn has_tool_use(&self) -> bool {
        self.blocks
            .iter()
            .any(|b| matches!(b, ContentBlock::ToolUse { .. }))
    }

    /// 所有文本块拼接
    pub fn text(&self) -> String {
        self.blocks
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    /// 所有思考块拼接
    pub fn thinking(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .blocks
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Thinking { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        }
    }

    pub fn stop_reason(&self) -> StopReason {
        self.stop_reason.clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(id: &str, name: &str) -> ContentBlock {
        ContentBlock::ToolUse {
            id: id.to_string(),
            name: name.to_string(),
            arguments: "{}".to_string(),
        }
    }

    #[test]
    fn test_finalize_filters_and_derives_end_turn() {
        let mut msg = ResponseMessage {
            blocks: vec![ContentBlock::Text("hi".to_string()), tool("call_1", "BashOutput")],
            ..Default::default()
        };
        let filtered = msg.finalize("gpt-5", &ToolFilter::default(), &ToolCatalog::default());

        assert_eq!(filtered, 1);
        assert_eq!(msg.blocks.len(), 1);
        assert_eq!(msg.stop_reason(), StopReason::EndTurn);
        assert_eq!(msg.model, "gpt-5");
    }

    #[test]
    fn test_finalize_tool_use_overrides_upstream_stop() {
        let mut msg = ResponseMessage {
            blocks: vec![tool("call_1", "Read")],
            stop_reason: Some(StopReason::EndTurn),
            ..Default::default()
        };
        msg.finalize("m", &ToolFilter::default(), &ToolCatalog::default());
        assert_eq!(msg.stop_reason(), StopReason::ToolUse);
    }

    #[test]
    fn test_finalize_keeps_max_tokens() {
        let mut msg = ResponseMessage {
            blocks: vec![tool("call_1", "Read")],
            stop_reason: Some(StopReason::MaxTokens),
            ..Default::default()
        };
        msg.finalize("m", &ToolFilter::default(), &ToolCatalog::default());
        assert_eq!(msg.stop_reason(), StopReason::MaxTokens);
    }

    #[test]
    fn test_finalize_restores_short_names() {
        let long = format!("mcp__server__{}", "t".repeat(70));
        let catalog = ToolCatalog::new(vec![long.clone()]);
        let short = crate::protocol::build_short_name_map(&[long.clone()])[&long].clone();

        let mut msg = ResponseMessage {
            blocks: vec![tool("call_1", &short)],
            ..Default::default()
        };
        msg.finalize("m", &ToolFilter::default(), &catalog);
        assert_eq!(msg.blocks[0], tool("call_1", &long));
    }
}
