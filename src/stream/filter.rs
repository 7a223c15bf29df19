//! 工具调用过滤
//!
//! 按工具名称精确匹配（区分大小写）的拒绝列表。被过滤的工具调用
//! 不会产生任何下游事件，也不占用下游索引。

use std::collections::BTreeSet;

/// 默认过滤的工具：客户端侧执行的后台 shell 输出轮询
pub const DEFAULT_DENY_TOOLS: &[&str] = &["BashOutput"];

/// 工具过滤规则
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolFilter {
    deny: BTreeSet<String>,
}

impl Default for ToolFilter {
    fn default() -> Self {
        Self::new(DEFAULT_DENY_TOOLS.iter().copied())
    }
}

impl ToolFilter {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            deny: names.into_iter().map(Into::into).collect(),
        }
    }

    /// 不过滤任何工具
    pub fn allow_all() -> Self {
        Self {
            deny: BTreeSet::new(),
        }
    }

    /// 工具名称是否在拒绝列表中
    pub fn is_filtered(&self, name: &str) -> bool {
        self.deny.contains(name)
    }

    pub fn denied(&self) -> impl Iterator<Item = &str> {
        self.deny.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.deny.is_empty()
    }
}
