//! Execution units handed to the executor

use std::fmt;
use std::sync::Arc;

use strata_router_core::{RouteContext, RouteMapper};
use strata_types::Value;

/// SQL to run on one data source
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SqlUnit {
    pub sql: String,
    pub parameters: Vec<Value>,
    /// Logic to actual table names this SQL was rewritten with
    pub table_route_mappers: Vec<RouteMapper>,
}

/// Equality covers the data source, SQL and parameters; two units equal
/// under it would run the same statement twice
#[derive(Debug, Clone)]
pub struct ExecutionUnit {
    pub data_source: String,
    pub sql_unit: SqlUnit,
}

impl ExecutionUnit {
    pub fn new(data_source: impl Into<String>, sql_unit: SqlUnit) -> Self {
        Self { data_source: data_source.into(), sql_unit }
    }
}

impl PartialEq for ExecutionUnit {
    fn eq(&self, other: &Self) -> bool {
        self.data_source == other.data_source
            && self.sql_unit.sql == other.sql_unit.sql
            && self.sql_unit.parameters == other.sql_unit.parameters
    }
}

impl Eq for ExecutionUnit {}

impl std::hash::Hash for ExecutionUnit {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.data_source.hash(state);
        self.sql_unit.sql.hash(state);
        self.sql_unit.parameters.hash(state);
    }
}

impl fmt::Display for ExecutionUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ::: {}", self.data_source, self.sql_unit.sql)
    }
}

/// Result of compiling one query
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub execution_units: Vec<ExecutionUnit>,
    pub route_context: Arc<RouteContext>,
}

impl ExecutionContext {
    pub fn len(&self) -> usize {
        self.execution_units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.execution_units.is_empty()
    }

    pub fn data_sources(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for unit in &self.execution_units {
            if !names.contains(&unit.data_source.as_str()) {
                names.push(&unit.data_source);
            }
        }
        names
    }

    pub fn sqls(&self) -> Vec<&str> {
        self.execution_units.iter().map(|u| u.sql_unit.sql.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(ds: &str, sql: &str, mappers: Vec<RouteMapper>) -> ExecutionUnit {
        ExecutionUnit::new(ds, SqlUnit { sql: sql.into(), parameters: vec![Value::Int(1)], table_route_mappers: mappers })
    }

    #[test]
    fn test_equality_ignores_mappers() {
        let a = unit("ds_0", "SELECT 1", vec![RouteMapper::identity("t")]);
        let b = unit("ds_0", "SELECT 1", vec![]);
        assert_eq!(a, b);
        assert_ne!(a, unit("ds_1", "SELECT 1", vec![]));
        assert_eq!(a.to_string(), "ds_0 ::: SELECT 1");
    }
}
