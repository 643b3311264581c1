//! Kernel error types

use strata_core::ConfigError;
use strata_rewrite::RewriteError;
use strata_router_core::RouteError;
use thiserror::Error;

/// Any failure while compiling a query. Compilation has no side effects, so
/// an error here means no data source was touched.
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Route error: {0}")]
    Route(#[from] RouteError),

    #[error("Rewrite error: {0}")]
    Rewrite(#[from] RewriteError),

    #[error("Query deadline exceeded before {stage}")]
    DeadlineExceeded { stage: &'static str },

    /// Neither the route nor the rule names a data source to run on
    #[error("No data source available for generic execution")]
    NoDataSource,
}
