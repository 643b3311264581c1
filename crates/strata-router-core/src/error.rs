//! Error types for the routing module

use strata_core::AlgorithmError;
use thiserror::Error;

/// Routing-time errors. Each one aborts the query before any shard is
/// touched.
#[derive(Debug, Error)]
pub enum RouteError {
    /// Statement references a table unknown to the rule and the schema
    #[error("Table or view `{0}` does not exist")]
    NoSuchTable(String),

    /// CREATE TABLE for a table that already exists
    #[error("Table `{0}` already exists")]
    TableExists(String),

    /// Operation cannot be applied to a sharding table
    #[error("Unsupported operation on sharding table: {0}")]
    UnsupportedShardingOperation(String),

    /// One DML statement over several independent sharding tables
    #[error("Cannot route DML statement over multiple independent sharding tables: {}", .0.join(", "))]
    DmlWithMultipleShardingTables(Vec<String>),

    /// Sharding algorithm failed on the query's values
    #[error(transparent)]
    Algorithm(#[from] AlgorithmError),

    /// The caller's deadline expired before routing finished
    #[error("Deadline exceeded while routing")]
    DeadlineExceeded,
}
