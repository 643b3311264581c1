//! Error types for the topology and algorithm layer

use thiserror::Error;

/// Rule configuration errors
///
/// Only ever produced while a `ShardingRule` is being built, never while a
/// query is being routed.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A strategy references an algorithm name that is not configured
    #[error("Sharding algorithm not found: {0}")]
    MissingAlgorithm(String),

    /// A key-generate strategy references an unknown generator
    #[error("Key generator not found: {0}")]
    MissingKeyGenerator(String),

    /// Algorithm type name is not known to the registry
    #[error("Unknown algorithm type: {0}")]
    UnknownAlgorithmType(String),

    /// Required property missing or unparsable
    #[error("Invalid property `{property}` for algorithm {algorithm}: {reason}")]
    InvalidAlgorithmProperty {
        algorithm: String,
        property: String,
        reason: String,
    },

    /// Inline expression could not be parsed
    #[error("Malformed inline expression `{expression}`: {reason}")]
    MalformedInlineExpression { expression: String, reason: String },

    /// Data node is not `data_source.table`
    #[error("Invalid data node: {0}")]
    InvalidDataNode(String),

    /// Data node points at a data source that is not configured
    #[error("Data node {node} references unknown data source {data_source}")]
    UnknownDataSource { node: String, data_source: String },

    /// Binding group references a table that is not a sharding table
    #[error("Binding group references unknown sharding table: {0}")]
    UnknownTable(String),

    /// Tables in a binding group expose different actual-node layouts
    #[error("Binding tables {left} and {right} do not have congruent data nodes")]
    IncongruentBindingGroup { left: String, right: String },

    /// Table configured twice, or as both sharding and single/broadcast
    #[error("Table configured more than once: {0}")]
    DuplicateTable(String),

    /// Algorithm cannot serve the strategy that references it, e.g. a
    /// `HINT_INLINE` algorithm behind a standard strategy
    #[error("Algorithm {algorithm} cannot be used by a {strategy} strategy")]
    AlgorithmKindMismatch { algorithm: String, strategy: &'static str },

    /// Rule configuration document could not be deserialized
    #[error("Invalid rule configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Query-time algorithm evaluation failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AlgorithmError {
    /// Expression could not be evaluated against the sharding value
    #[error("Algorithm evaluation failed: {0}")]
    Evaluation(String),

    /// Algorithm cannot route range conditions
    #[error("Algorithm {0} does not support range sharding values")]
    UnsupportedRange(String),

    /// The caller's deadline expired during evaluation
    #[error("Deadline exceeded during algorithm evaluation")]
    DeadlineExceeded,
}
