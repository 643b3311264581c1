//! Shard Topology Model
//!
//! `ShardingRule` is the validated, immutable view of a
//! `ShardingRuleConfiguration`:
//!
//! ```text
//! ShardingRule
//!   ├── data sources          ds_0, ds_1
//!   ├── sharding tables       t_order ─► [ds_0.t_order_0, ds_0.t_order_1, ds_1.t_order_0, ...]
//!   │                                     database strategy, table strategy, generate key
//!   ├── binding groups        { t_order, t_order_item }
//!   ├── broadcast tables      t_config (identical copy on every data source)
//!   └── single tables         t_user ─► ds_0
//! ```
//!
//! Every configuration problem surfaces from `ShardingRule::new`; nothing is
//! validated again while routing.
//!
//! Each built rule carries a process-unique generation. Anything derived
//! from a rule and kept across queries is keyed by it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use strata_types::Value;
use tracing::{debug, info};

use crate::algorithm::{AlgorithmRegistry, ShardingAlgorithm};
use crate::datanode::DataNode;
use crate::error::ConfigError;
use crate::expression::{EvalLimits, InlineExpression};
use crate::keygen::KeyGenerator;
use crate::rule_config::{
    KeyGenerateStrategyConfiguration, ShardingRuleConfiguration, StrategyConfiguration, TableRuleConfiguration,
};
use crate::strategy::ShardingStrategy;

/// Column filled by a key generator when an INSERT omits it
#[derive(Debug, Clone)]
pub struct GenerateKeyStrategy {
    pub column: String,
    pub generator: Arc<KeyGenerator>,
}

/// A logic table and the actual data nodes backing it
#[derive(Debug, Clone)]
pub struct ShardingTable {
    logic_table: String,
    actual_data_nodes: Vec<DataNode>,
    /// Actual tables per data source, in node order
    tables_by_data_source: IndexMap<String, Vec<String>>,
    database_strategy: ShardingStrategy,
    table_strategy: ShardingStrategy,
    generate_key: Option<GenerateKeyStrategy>,
}

impl ShardingTable {
    pub fn logic_table(&self) -> &str {
        &self.logic_table
    }

    pub fn actual_data_nodes(&self) -> &[DataNode] {
        &self.actual_data_nodes
    }

    /// Data sources hosting at least one actual table, in node order
    pub fn data_source_names(&self) -> Vec<String> {
        self.tables_by_data_source.keys().cloned().collect()
    }

    /// Actual tables on `data_source`, in node order
    pub fn actual_tables(&self, data_source: &str) -> &[String] {
        self.tables_by_data_source
            .iter()
            .find(|(ds, _)| ds.eq_ignore_ascii_case(data_source))
            .map(|(_, tables)| tables.as_slice())
            .unwrap_or(&[])
    }

    /// Position of `actual_table` among the actual tables of `data_source`
    pub fn actual_table_index(&self, data_source: &str, actual_table: &str) -> Option<usize> {
        self.actual_tables(data_source)
            .iter()
            .position(|t| t.eq_ignore_ascii_case(actual_table))
    }

    pub fn database_strategy(&self) -> &ShardingStrategy {
        &self.database_strategy
    }

    pub fn table_strategy(&self) -> &ShardingStrategy {
        &self.table_strategy
    }

    pub fn generate_key(&self) -> Option<&GenerateKeyStrategy> {
        self.generate_key.as_ref()
    }

    /// Columns of both strategies
    pub fn sharding_columns(&self) -> Vec<&str> {
        let mut columns = self.database_strategy.sharding_columns();
        for column in self.table_strategy.sharding_columns() {
            if !columns.iter().any(|c| c.eq_ignore_ascii_case(column)) {
                columns.push(column);
            }
        }
        columns
    }

    pub fn is_sharding_column(&self, column: &str) -> bool {
        self.sharding_columns().iter().any(|c| c.eq_ignore_ascii_case(column))
    }

    /// Either strategy is driven by hint values
    pub fn uses_hint(&self) -> bool {
        self.database_strategy.is_hint() || self.table_strategy.is_hint()
    }

    /// Same data sources and the same number of actual tables on each
    fn is_congruent_with(&self, other: &ShardingTable) -> bool {
        self.tables_by_data_source.len() == other.tables_by_data_source.len()
            && self
                .tables_by_data_source
                .iter()
                .all(|(ds, tables)| other.actual_tables(ds).len() == tables.len())
    }
}

/// Tables that always route to the same shard index together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingTableGroup {
    tables: Vec<String>,
}

impl BindingTableGroup {
    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    pub fn contains(&self, table: &str) -> bool {
        self.tables.iter().any(|t| t.eq_ignore_ascii_case(table))
    }
}

/// Validated sharding rule
#[derive(Debug, Clone)]
pub struct ShardingRule {
    data_sources: Vec<String>,
    /// Keyed by lower-cased logic table name
    tables: IndexMap<String, ShardingTable>,
    binding_groups: Vec<BindingTableGroup>,
    broadcast_tables: Vec<String>,
    /// Lower-cased table name -> data source
    single_tables: IndexMap<String, String>,
    generation: u64,
}

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

impl ShardingRule {
    pub fn new(config: &ShardingRuleConfiguration, registry: &AlgorithmRegistry) -> Result<Self, ConfigError> {
        let mut algorithms: IndexMap<String, ShardingAlgorithm> = IndexMap::new();
        for (name, algorithm) in &config.sharding_algorithms {
            algorithms.insert(name.clone(), registry.create_algorithm(algorithm)?);
        }

        let mut key_generators: IndexMap<String, Arc<KeyGenerator>> = IndexMap::new();
        for (name, generator) in &config.key_generators {
            key_generators.insert(name.clone(), Arc::new(registry.create_key_generator(generator)?));
        }

        let build_strategy = |own: Option<&StrategyConfiguration>, default: Option<&StrategyConfiguration>| {
            match own.or(default) {
                Some(config) => ShardingStrategy::build(config, &algorithms),
                None => Ok(ShardingStrategy::None),
            }
        };
        let build_key = |config: Option<&KeyGenerateStrategyConfiguration>| -> Result<_, ConfigError> {
            let Some(config) = config else { return Ok(None) };
            let generator = key_generators
                .get(&config.key_generator_name)
                .ok_or_else(|| ConfigError::MissingKeyGenerator(config.key_generator_name.clone()))?;
            Ok(Some(GenerateKeyStrategy { column: config.column.clone(), generator: Arc::clone(generator) }))
        };

        let configured_sources: Vec<String> =
            config.data_sources.iter().map(|ds| ds.trim().to_string()).collect();

        let mut tables: IndexMap<String, ShardingTable> = IndexMap::new();
        for table_config in &config.tables {
            let key = table_config.logic_table.to_ascii_lowercase();
            if tables.contains_key(&key) {
                return Err(ConfigError::DuplicateTable(table_config.logic_table.clone()));
            }

            let nodes = actual_data_nodes(table_config, &configured_sources)?;
            let mut tables_by_data_source: IndexMap<String, Vec<String>> = IndexMap::new();
            for node in &nodes {
                tables_by_data_source
                    .entry(node.data_source.clone())
                    .or_default()
                    .push(node.table.clone());
            }

            let table = ShardingTable {
                logic_table: table_config.logic_table.clone(),
                actual_data_nodes: nodes,
                tables_by_data_source,
                database_strategy: build_strategy(
                    table_config.database_strategy.as_ref(),
                    config.default_database_strategy.as_ref(),
                )?,
                table_strategy: build_strategy(
                    table_config.table_strategy.as_ref(),
                    config.default_table_strategy.as_ref(),
                )?,
                generate_key: build_key(
                    table_config
                        .key_generate_strategy
                        .as_ref()
                        .or(config.default_key_generate_strategy.as_ref()),
                )?,
            };
            debug!(
                table = %table.logic_table,
                nodes = table.actual_data_nodes.len(),
                database_strategy = table.database_strategy.kind_name(),
                table_strategy = table.table_strategy.kind_name(),
                "Sharding table configured"
            );
            tables.insert(key, table);
        }

        let mut single_tables: IndexMap<String, String> = IndexMap::new();
        for (table, data_source) in &config.single_tables {
            let key = table.to_ascii_lowercase();
            if tables.contains_key(&key) || single_tables.contains_key(&key) {
                return Err(ConfigError::DuplicateTable(table.clone()));
            }
            single_tables.insert(key, data_source.trim().to_string());
        }

        let mut broadcast_tables: Vec<String> = Vec::new();
        for table in &config.broadcast_tables {
            let key = table.to_ascii_lowercase();
            if tables.contains_key(&key)
                || single_tables.contains_key(&key)
                || broadcast_tables.iter().any(|t| t.eq_ignore_ascii_case(table))
            {
                return Err(ConfigError::DuplicateTable(table.clone()));
            }
            broadcast_tables.push(table.trim().to_string());
        }

        let data_sources = if configured_sources.is_empty() {
            let mut derived: Vec<String> = Vec::new();
            let node_sources = tables.values().flat_map(|t| t.tables_by_data_source.keys());
            for ds in node_sources.chain(single_tables.values()) {
                if !derived.iter().any(|d| d.eq_ignore_ascii_case(ds)) {
                    derived.push(ds.clone());
                }
            }
            derived
        } else {
            configured_sources
        };

        let known = |ds: &str| data_sources.iter().any(|d| d.eq_ignore_ascii_case(ds));
        for table in tables.values() {
            if let Some(node) = table.actual_data_nodes.iter().find(|n| !known(&n.data_source)) {
                return Err(ConfigError::UnknownDataSource {
                    node: node.to_string(),
                    data_source: node.data_source.clone(),
                });
            }
        }
        for (table, ds) in &single_tables {
            if !known(ds) {
                return Err(ConfigError::UnknownDataSource { node: table.clone(), data_source: ds.clone() });
            }
        }

        let mut binding_groups = Vec::new();
        for group in &config.binding_tables {
            binding_groups.push(binding_group(group, &tables)?);
        }

        let generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);
        info!(
            generation,
            data_sources = data_sources.len(),
            sharding_tables = tables.len(),
            binding_groups = binding_groups.len(),
            broadcast_tables = broadcast_tables.len(),
            single_tables = single_tables.len(),
            "Sharding rule built"
        );

        Ok(Self { data_sources, tables, binding_groups, broadcast_tables, single_tables, generation })
    }

    pub fn data_source_names(&self) -> &[String] {
        &self.data_sources
    }

    /// Unique per built rule; clones share it
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn sharding_tables(&self) -> impl Iterator<Item = &ShardingTable> {
        self.tables.values()
    }

    pub fn find_sharding_table(&self, name: &str) -> Option<&ShardingTable> {
        self.tables.get(&name.to_ascii_lowercase())
    }

    pub fn is_sharding_table(&self, name: &str) -> bool {
        self.tables.contains_key(&name.to_ascii_lowercase())
    }

    pub fn is_broadcast_table(&self, name: &str) -> bool {
        self.broadcast_tables.iter().any(|t| t.eq_ignore_ascii_case(name))
    }

    /// Non-empty and every table is a broadcast table
    pub fn is_all_broadcast_tables(&self, names: &[&str]) -> bool {
        !names.is_empty() && names.iter().all(|n| self.is_broadcast_table(n))
    }

    pub fn single_table_data_source(&self, name: &str) -> Option<&str> {
        self.single_tables.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn is_single_table(&self, name: &str) -> bool {
        self.single_tables.contains_key(&name.to_ascii_lowercase())
    }

    /// Table is known to the rule in any role
    pub fn contains_table(&self, name: &str) -> bool {
        self.is_sharding_table(name) || self.is_broadcast_table(name) || self.is_single_table(name)
    }

    pub fn binding_groups(&self) -> &[BindingTableGroup] {
        &self.binding_groups
    }

    pub fn find_binding_group(&self, table: &str) -> Option<&BindingTableGroup> {
        self.binding_groups.iter().find(|g| g.contains(table))
    }

    /// More than one table, all of them in the same binding group
    pub fn is_all_binding_tables(&self, names: &[&str]) -> bool {
        let Some(first) = names.first() else { return false };
        match self.find_binding_group(first) {
            Some(group) => names.len() > 1 && names.iter().all(|n| group.contains(n)),
            None => false,
        }
    }

    /// Actual table of `bound_table` at the same per-data-source index as
    /// `actual_table` of `primary_table`
    pub fn binding_actual_table(
        &self,
        data_source: &str,
        primary_table: &str,
        actual_table: &str,
        bound_table: &str,
    ) -> Option<&str> {
        let primary = self.find_sharding_table(primary_table)?;
        let bound = self.find_sharding_table(bound_table)?;
        let index = primary.actual_table_index(data_source, actual_table)?;
        bound.actual_tables(data_source).get(index).map(String::as_str)
    }

    /// Generate keys for `rows` rows of `table`, if the table has a
    /// key-generate strategy
    pub fn generate_keys(&self, table: &str, rows: usize) -> Option<(&str, Vec<Value>)> {
        let strategy = self.find_sharding_table(table)?.generate_key()?;
        Some((strategy.column.as_str(), strategy.generator.generate_many(rows)))
    }
}

fn actual_data_nodes(config: &TableRuleConfiguration, data_sources: &[String]) -> Result<Vec<DataNode>, ConfigError> {
    let nodes = match &config.actual_data_nodes {
        Some(expression) => {
            let names = InlineExpression::parse(expression)?
                .expand(&EvalLimits::default())
                .map_err(|e| ConfigError::MalformedInlineExpression {
                    expression: expression.clone(),
                    reason: e.to_string(),
                })?;
            names.iter().map(|n| DataNode::parse(n)).collect::<Result<Vec<_>, _>>()?
        }
        None => data_sources
            .iter()
            .map(|ds| DataNode::new(ds.clone(), config.logic_table.clone()))
            .collect(),
    };

    if nodes.is_empty() {
        return Err(ConfigError::InvalidDataNode(format!(
            "{} has no actual data nodes",
            config.logic_table
        )));
    }
    Ok(nodes)
}

fn binding_group(group: &str, tables: &IndexMap<String, ShardingTable>) -> Result<BindingTableGroup, ConfigError> {
    let names: Vec<String> = group
        .split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    let mut members: Vec<&ShardingTable> = Vec::with_capacity(names.len());
    for name in &names {
        let table = tables
            .get(&name.to_ascii_lowercase())
            .ok_or_else(|| ConfigError::UnknownTable(name.clone()))?;
        members.push(table);
    }

    if let Some((first, rest)) = members.split_first() {
        if let Some(other) = rest.iter().find(|t| !first.is_congruent_with(t)) {
            return Err(ConfigError::IncongruentBindingGroup {
                left: first.logic_table.clone(),
                right: other.logic_table.clone(),
            });
        }
    }

    Ok(BindingTableGroup { tables: names })
}
