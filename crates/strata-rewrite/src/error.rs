//! Error types for the rewrite module

use strata_types::Span;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RewriteError {
    /// Two generated tokens cover the same part of the SQL
    #[error("SQL tokens overlap: [{}, {}) and [{}, {})", .first.start, .first.end, .second.start, .second.end)]
    OverlappingTokens { first: Span, second: Span },

    /// Token span outside the SQL text or not on a character boundary
    #[error("SQL token [{}, {}) is outside the SQL text of length {len}", .span.start, .span.end)]
    TokenOutOfBounds { span: Span, len: usize },

    /// A parameter marker has no bound value
    #[error("Parameter marker {0} has no bound value")]
    MissingParameter(usize),

    /// LIMIT values that cannot be merged across shards
    #[error("Invalid pagination: {0}")]
    InvalidPagination(String),
}
