//! 客户端工具目录
//!
//! Codex 后端要求工具名称不超过 64 个字符。请求方向把过长的名称缩短，
//! 响应方向通过客户端原始请求中的工具列表把缩短后的名称还原。
//! 两个方向用同一个确定性算法从同一份名称列表计算映射。

use std::collections::{HashMap, HashSet};

/// Codex 工具名称长度上限
pub const TOOL_NAME_LIMIT: usize = 64;

const MCP_PREFIX: &str = "mcp__";

/// 客户端请求声明的工具
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCatalog {
    names: Vec<String>,
    /// 缩短名称 -> 原始名称（只包含发生了缩短的条目）
    restore: HashMap<String, String>,
}

impl ToolCatalog {
    pub fn new(names: Vec<String>) -> Self {
        let restore = build_short_name_map(&names)
            .into_iter()
            .filter(|(original, short)| original != short)
            .map(|(original, short)| (short, original))
            .collect();
        Self { names, restore }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// 把上游返回的工具名称还原为客户端声明的名称
    pub fn restore(&self, name: &str) -> String {
        self.restore
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }
}

/// 为一组工具名称计算原始名称 -> 缩短名称的映射
///
/// 未超长的名称映射到自身；冲突时追加 `_1`、`_2` ... 后缀。
pub fn build_short_name_map(names: &[String]) -> HashMap<String, String> {
    let mut used: HashSet<String> = HashSet::new();
    let mut out = HashMap::new();

    for name in names {
        if out.contains_key(name) {
            continue;
        }
        let unique = make_unique(base_candidate(name), &used);
        used.insert(unique.clone());
        out.insert(name.clone(), unique);
    }

    out
}

fn base_candidate(name: &str) -> String {
    if name.len() <= TOOL_NAME_LIMIT {
        return name.to_string();
    }
    if name.starts_with(MCP_PREFIX) {
        if let Some(idx) = name.rfind("__") {
            if idx + 2 > MCP_PREFIX.len() {
                let candidate = format!("{MCP_PREFIX}{}", &name[idx + 2..]);
                return truncate_to(&candidate, TOOL_NAME_LIMIT);
            }
        }
    }
    truncate_to(name, TOOL_NAME_LIMIT)
}

fn make_unique(candidate: String, used: &HashSet<String>) -> String {
    if !used.contains(&candidate) {
        return candidate;
    }
    let mut i = 1usize;
    loop {
        let suffix = format!("_{i}");
        let allowed = TOOL_NAME_LIMIT.saturating_sub(suffix.len());
        let attempt = format!("{}{}", truncate_to(&candidate, allowed), suffix);
        if !used.contains(&attempt) {
            return attempt;
        }
        i += 1;
    }
}

/// 按字节上限截断，不切断 UTF-8 字符
fn truncate_to(s: &str, limit: usize) -> String {
    if s.len() <= limit {
        return s.to_string();
    }
    let mut end = limit;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_names_untouched() {
        let names = vec!["read_file".to_string()];
        let map = build_short_name_map(&names);
        assert_eq!(map["read_file"], "read_file");

        let catalog = ToolCatalog::new(names);
        assert_eq!(catalog.restore("read_file"), "read_file");
        assert_eq!(catalog.restore("unknown"), "unknown");
    }

    #[test]
    fn test_mcp_prefix_preserved() {
        let long = format!("mcp__{}__search", "x".repeat(70));
        let map = build_short_name_map(&[long.clone()]);
        assert_eq!(map[&long], "mcp__search");

        let catalog = ToolCatalog::new(vec![long.clone()]);
        assert_eq!(catalog.restore("mcp__search"), long);
    }

    #[test]
    fn test_collisions_get_suffix() {
        let a = format!("{}a", "n".repeat(70));
        let b = format!("{}b", "n".repeat(70));
        let map = build_short_name_map(&[a.clone(), b.clone()]);

        assert_eq!(map[&a].len(), TOOL_NAME_LIMIT);
        assert!(map[&b].ends_with("_1"));
        assert!(map[&b].len() <= TOOL_NAME_LIMIT);

        let catalog = ToolCatalog::new(vec![a.clone(), b.clone()]);
        assert_eq!(catalog.restore(&map[&a]), a);
        assert_eq!(catalog.restore(&map[&b]), b);
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        let name = "工".repeat(30);
        let short = base_candidate(&name);
        assert!(short.len() <= TOOL_NAME_LIMIT);
        assert!(name.starts_with(&short));
    }
}
