//! Sharding rule configuration
//!
//! Plain serde structures, usually loaded from JSON. Nothing here is
//! validated; `ShardingRule::new` turns a configuration into an immutable,
//! validated rule.
//!
//! ```json
//! {
//!   "data_sources": ["ds_0", "ds_1"],
//!   "tables": [{
//!     "logic_table": "t_order",
//!     "actual_data_nodes": "ds_${0..1}.t_order_${0..1}",
//!     "database_strategy": { "type": "standard", "sharding_column": "user_id", "sharding_algorithm_name": "db_inline" },
//!     "table_strategy": { "type": "standard", "sharding_column": "order_id", "sharding_algorithm_name": "t_inline" },
//!     "key_generate_strategy": { "column": "order_id", "key_generator_name": "snowflake" }
//!   }],
//!   "binding_tables": ["t_order, t_order_item"],
//!   "broadcast_tables": ["t_config"],
//!   "single_tables": { "t_user": "ds_0" },
//!   "sharding_algorithms": {
//!     "db_inline": { "type": "INLINE", "props": { "algorithm-expression": "ds_${user_id % 2}" } },
//!     "t_inline": { "type": "INLINE", "props": { "algorithm-expression": "t_order_${order_id % 2}" } }
//!   },
//!   "key_generators": { "snowflake": { "type": "SNOWFLAKE" } }
//! }
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::algorithm::AlgorithmProps;
use crate::error::ConfigError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardingRuleConfiguration {
    /// Data source names. When empty, derived from the configured data
    /// nodes and single-table locations.
    pub data_sources: Vec<String>,

    pub tables: Vec<TableRuleConfiguration>,

    /// Each entry is a comma-separated group, e.g. `"t_order, t_order_item"`
    pub binding_tables: Vec<String>,

    pub broadcast_tables: Vec<String>,

    /// Non-sharded table -> data source hosting it
    pub single_tables: IndexMap<String, String>,

    pub default_database_strategy: Option<StrategyConfiguration>,
    pub default_table_strategy: Option<StrategyConfiguration>,
    pub default_key_generate_strategy: Option<KeyGenerateStrategyConfiguration>,

    /// Named sharding algorithms referenced by strategies
    pub sharding_algorithms: IndexMap<String, AlgorithmConfiguration>,

    /// Named key generators referenced by key-generate strategies
    pub key_generators: IndexMap<String, AlgorithmConfiguration>,
}

impl ShardingRuleConfiguration {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRuleConfiguration {
    pub logic_table: String,

    /// Inline expression of `data_source.table` nodes. When absent the table
    /// has one node per data source named after the logic table.
    #[serde(default)]
    pub actual_data_nodes: Option<String>,

    #[serde(default)]
    pub database_strategy: Option<StrategyConfiguration>,

    #[serde(default)]
    pub table_strategy: Option<StrategyConfiguration>,

    #[serde(default)]
    pub key_generate_strategy: Option<KeyGenerateStrategyConfiguration>,
}

impl TableRuleConfiguration {
    pub fn new(logic_table: impl Into<String>) -> Self {
        Self {
            logic_table: logic_table.into(),
            actual_data_nodes: None,
            database_strategy: None,
            table_strategy: None,
            key_generate_strategy: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyConfiguration {
    Standard {
        sharding_column: String,
        sharding_algorithm_name: String,
    },
    Complex {
        /// Comma-separated column names
        sharding_columns: String,
        sharding_algorithm_name: String,
    },
    Hint {
        sharding_algorithm_name: String,
    },
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyGenerateStrategyConfiguration {
    pub column: String,
    pub key_generator_name: String,
}

/// `{ "type": "INLINE", "props": { ... } }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmConfiguration {
    #[serde(rename = "type")]
    pub algorithm_type: String,

    #[serde(default)]
    pub props: AlgorithmProps,
}

impl AlgorithmConfiguration {
    pub fn new(algorithm_type: impl Into<String>) -> Self {
        Self { algorithm_type: algorithm_type.into(), props: AlgorithmProps::new() }
    }

    pub fn with_prop(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.props.insert(key.to_string(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json() {
        let config = ShardingRuleConfiguration::from_json(
            r#"{
                "data_sources": ["ds_0", "ds_1"],
                "tables": [{
                    "logic_table": "t_order",
                    "actual_data_nodes": "ds_${0..1}.t_order_${0..1}",
                    "table_strategy": {"type": "standard", "sharding_column": "order_id", "sharding_algorithm_name": "t_mod"}
                }],
                "binding_tables": ["t_order, t_order_item"],
                "single_tables": {"t_user": "ds_0"},
                "sharding_algorithms": {"t_mod": {"type": "MOD", "props": {"sharding-count": 2}}}
            }"#,
        )
        .unwrap();

        assert_eq!(config.tables.len(), 1);
        assert!(matches!(
            config.tables[0].table_strategy,
            Some(StrategyConfiguration::Standard { ref sharding_column, .. }) if sharding_column == "order_id"
        ));
        assert_eq!(config.single_tables.get("t_user").map(String::as_str), Some("ds_0"));
        assert_eq!(config.sharding_algorithms["t_mod"].algorithm_type, "MOD");
        assert!(config.broadcast_tables.is_empty());
    }

    #[test]
    fn test_invalid_json() {
        let result = ShardingRuleConfiguration::from_json(r#"{"tables": [{"actual_data_nodes": "ds.t"}]}"#);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_none_strategy() {
        let strategy: StrategyConfiguration = serde_json::from_str(r#"{"type": "none"}"#).unwrap();
        assert_eq!(strategy, StrategyConfiguration::None);
    }
}
