//! Per-query statement context shared by routing and rewriting

use strata_core::{SchemaMetaData, ShardingRule};
use strata_types::{BoundStatement, QueryContext, StatementKind, Value};
use tracing::debug;

/// Keys generated for an INSERT that omits its generate-key column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedKeyContext {
    pub table: String,
    pub column: String,
    /// One key per INSERT row, in row order
    pub values: Vec<Value>,
}

/// A query plus everything derived from it once, before routing
#[derive(Debug, Clone)]
pub struct StatementContext<'a> {
    query: &'a QueryContext,
    generated_keys: Option<GeneratedKeyContext>,
}

impl<'a> StatementContext<'a> {
    /// Derive the context. Keys are generated here so that routing and
    /// rewriting see the same values.
    pub fn new(query: &'a QueryContext, rule: &ShardingRule) -> Self {
        Self { query, generated_keys: generate_keys(&query.statement, rule) }
    }

    pub fn query(&self) -> &'a QueryContext {
        self.query
    }

    pub fn statement(&self) -> &'a BoundStatement {
        &self.query.statement
    }

    pub fn sql(&self) -> &'a str {
        &self.query.sql
    }

    pub fn parameters(&self) -> &'a [Value] {
        &self.query.parameters
    }

    pub fn generated_keys(&self) -> Option<&GeneratedKeyContext> {
        self.generated_keys.as_ref()
    }

    /// Columns of the INSERT target: the explicit list, else the columns
    /// known from schema metadata
    pub fn insert_columns(&self, schema: &'a SchemaMetaData) -> Vec<&'a str> {
        let Some(insert) = &self.query.statement.insert else {
            return vec![];
        };
        if !insert.columns.is_empty() {
            return insert.columns.iter().map(String::as_str).collect();
        }
        schema
            .table(&insert.table)
            .map(|t| t.columns.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }
}

fn generate_keys(statement: &BoundStatement, rule: &ShardingRule) -> Option<GeneratedKeyContext> {
    if statement.kind != StatementKind::Insert {
        return None;
    }
    let insert = statement.insert.as_ref()?;
    // without an explicit column list there is nowhere to add the key column
    if insert.columns.is_empty() {
        return None;
    }
    let strategy = rule.find_sharding_table(&insert.table)?.generate_key()?;
    if insert.column_index(&strategy.column).is_some() {
        return None;
    }

    let (column, values) = rule.generate_keys(&insert.table, insert.rows.len())?;
    debug!(table = %insert.table, column = %column, rows = values.len(), "Generated keys for INSERT");
    Some(GeneratedKeyContext { table: insert.table.clone(), column: column.to_string(), values })
}
