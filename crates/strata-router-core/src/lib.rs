//! Strata Router Core - statement routing
//!
//! Turns a bound statement into a `RouteContext`: the data sources and
//! actual tables that must execute it.
//!
//! # Architecture
//!
//! ```text
//! QueryContext
//!     │
//!     ▼
//! ┌─────────────────────────┐
//! │    StatementContext     │  Generated keys, INSERT columns
//! └───────────┬─────────────┘
//!             │
//!             ▼
//! ┌─────────────────────────┐
//! │      RouteCache         │  Gates, then single-shard lookup
//! └───────────┬─────────────┘
//!             │ miss
//!             ▼
//! ┌─────────────────────────┐
//! │     ShardingRouter      │  Engine selection + sharding conditions
//! └───────────┬─────────────┘
//!             │
//!             ▼
//! ┌─────────────────────────┐
//! │      RouteEngine        │  Standard / Cartesian / Broadcast / ...
//! └───────────┬─────────────┘
//!             │
//!             ▼
//!        RouteContext
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use strata_router_core::{ShardingRouter, StatementContext};
//!
//! let router = ShardingRouter::new(&props);
//! let ctx = StatementContext::new(&query, &rule);
//! let route = router.route(&ctx, &rule, &schema)?;
//! ```

mod cache;
mod condition;
mod context;
mod engine;
mod error;
mod router;
mod types;


// Re-exports: Error types
pub use error::RouteError;

// Re-exports: Route results
pub use types::{RouteContext, RouteContextBuilder, RouteMapper, RouteUnit};

// Re-exports: Per-query context
pub use condition::{ConditionValue, ShardingCondition, ShardingConditions};
pub use context::{GeneratedKeyContext, StatementContext};

// Re-exports: Routing
pub use engine::{RouteEngine, RouteEnv};
pub use router::{select_engine, ShardingRouter};

// Re-exports: Route cache
pub use cache::{
    CacheLookup, CacheStats, CacheStatsSnapshot, CacheabilityCheck, RouteCache, RouteCacheKey,
    RouteCacheValue, SegmentedLru,
};
