//! Strata Rewrite - per-shard SQL rewriting
//!
//! Produces, for every route unit, the SQL text and parameters that unit
//! executes. The original SQL is never re-parsed: generators mark spans of
//! it with tokens and the builder splices their renderings in.
//!
//! # Example
//!
//! ```rust,ignore
//! use strata_rewrite::{RewriteContext, RewriteEngine};
//!
//! let engine = RewriteEngine::new();
//! let result = engine.rewrite(&RewriteContext::new(&ctx, &rule, &schema, &route))?;
//! ```

mod builder;
mod context;
mod engine;
mod error;
mod generator;
mod parameter;
mod token;


// Re-exports: Error types
pub use error::RewriteError;

// Re-exports: Tokens and builder
pub use builder::build_sql;
pub use token::{InsertRowText, RouteAwareText, SqlToken, TokenText};

// Re-exports: Generators
pub use generator::{Generated, TokenGenerator, TokenGeneratorRegistry};

// Re-exports: Parameters
pub use parameter::{GroupedParameterBuilder, ParameterBuilder, ParameterRewriter, StandardParameterBuilder};

// Re-exports: Engine
pub use context::RewriteContext;
pub use engine::{RewriteEngine, SqlRewriteResult, SqlRewriteUnit};
