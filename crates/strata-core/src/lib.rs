//! Strata Core - shard topology and sharding algorithms
//!
//! This crate owns everything that is built once from configuration and then
//! shared read-only by every query:
//!
//! - `ShardingRule`: logic tables, actual data nodes, binding groups,
//!   broadcast and single tables
//! - sharding strategies and the algorithms behind them
//! - the inline expression engine
//! - key generators
//! - `ConfigProperties` for the compilation pipeline

pub mod algorithm;
pub mod config;
pub mod datanode;
pub mod error;
pub mod expression;
pub mod keygen;
pub mod rule;
pub mod rule_config;
pub mod schema;
pub mod sharding_value;
pub mod strategy;

pub use algorithm::{AlgorithmRegistry, ShardingAlgorithm};
pub use config::{ConfigProperties, RouteCacheConfig};
pub use datanode::DataNode;
pub use error::{AlgorithmError, ConfigError};
pub use expression::{EvalLimits, InlineExpression};
pub use keygen::KeyGenerator;
pub use rule::{BindingTableGroup, GenerateKeyStrategy, ShardingRule, ShardingTable};
pub use rule_config::{
    AlgorithmConfiguration, KeyGenerateStrategyConfiguration, ShardingRuleConfiguration, StrategyConfiguration,
    TableRuleConfiguration,
};
pub use schema::{SchemaMetaData, TableMetaData};
pub use sharding_value::{ColumnValues, ShardingValues, ValueRange};
pub use strategy::ShardingStrategy;
