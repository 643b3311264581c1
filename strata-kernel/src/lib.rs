//! Strata Kernel - query compilation for a sharded database
//!
//! The kernel takes a bound statement with its parameters and produces the
//! physical statements to run:
//! - Routing the statement to actual data nodes (with a route cache)
//! - Rewriting the SQL and parameters for every route unit
//! - Assembling deduplicated execution units
//!
//! Compilation has no side effects. Executing the units and merging their
//! results is left to the caller.

mod context;
mod error;
mod execution;
mod kernel;

pub use context::{ExecutionContext, ExecutionUnit, SqlUnit};
pub use error::KernelError;
pub use execution::ExecutionContextBuilder;
pub use kernel::Kernel;

// Re-exports for callers that only depend on the kernel
pub use strata_core::{ConfigProperties, SchemaMetaData, ShardingRule, ShardingRuleConfiguration, TableMetaData};
pub use strata_router_core::CacheStatsSnapshot;
pub use strata_types::{BoundStatement, QueryContext, Value};
