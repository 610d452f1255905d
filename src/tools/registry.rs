//! 客户端工具注册表
//!
//! 记录哪些工具在调用方环境（浏览器等）中执行：引擎发出这类工具调用时，
//! 翻译器会登记待决动作，结果由续跑载荷回传。

use std::collections::BTreeSet;

/// 客户端执行工具的名称集合
#[derive(Debug, Clone, Default)]
pub struct ClientToolRegistry {
    names: BTreeSet<String>,
}

impl ClientToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>) {
        self.names.insert(name.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.names.iter().cloned().collect()
    }
}

impl<S: Into<String>> FromIterator<S> for ClientToolRegistry {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lookup() {
        let mut registry: ClientToolRegistry = ["export_csv"].into_iter().collect();
        registry.register("open_chart");

        assert!(registry.contains("export_csv"));
        assert!(registry.contains("open_chart"));
        assert!(!registry.contains("execute_sql"));
        assert_eq!(registry.tool_names(), vec!["export_csv", "open_chart"]);
    }
}
