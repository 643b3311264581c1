//! Actual data nodes

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ConfigError;

/// One physical table on one data source
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DataNode {
    pub data_source: String,
    pub table: String,
}

impl DataNode {
    pub fn new(data_source: impl Into<String>, table: impl Into<String>) -> Self {
        Self { data_source: data_source.into(), table: table.into() }
    }

    /// Parse `data_source.table`
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let text = text.trim();
        match text.split_once('.') {
            Some((ds, table))
                if !ds.is_empty() && !table.is_empty() && !table.contains('.') =>
            {
                Ok(Self::new(ds, table))
            }
            _ => Err(ConfigError::InvalidDataNode(text.to_string())),
        }
    }

    pub fn matches(&self, data_source: &str, table: &str) -> bool {
        self.data_source.eq_ignore_ascii_case(data_source) && self.table.eq_ignore_ascii_case(table)
    }
}

impl fmt::Display for DataNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.data_source, self.table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_data_node() {
        let node = DataNode::parse(" ds_0.t_order_1 ").unwrap();
        assert_eq!(node, DataNode::new("ds_0", "t_order_1"));
        assert_eq!(node.to_string(), "ds_0.t_order_1");
        assert!(node.matches("DS_0", "T_ORDER_1"));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for text in ["t_order", ".t_order", "ds_0.", "a.b.c"] {
            assert!(matches!(DataNode::parse(text), Err(ConfigError::InvalidDataNode(_))), "{text}");
        }
    }
}
