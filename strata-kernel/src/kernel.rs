//! Query compilation pipeline
//!
//! ```text
//! QueryContext ──► ShardingRouter ──► RouteContext ──► RewriteEngine
//!                        │ (cache)                          │
//!                                                           ▼
//! ExecutionContext ◄── ExecutionContextBuilder ◄── SqlRewriteResult
//! ```
//!
//! The rule and schema are read once per query; a reload swaps them for
//! later queries and drops every cached route.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use strata_core::{AlgorithmRegistry, ConfigProperties, SchemaMetaData, ShardingRule, ShardingRuleConfiguration};
use strata_rewrite::{RewriteContext, RewriteEngine};
use strata_router_core::{CacheStatsSnapshot, ShardingRouter, StatementContext};
use strata_types::{QueryContext, Value};
use tracing::{debug, info, warn};

use crate::context::ExecutionContext;
use crate::error::KernelError;
use crate::execution::ExecutionContextBuilder;

/// Compiles queries against one sharding rule
pub struct Kernel {
    props: ConfigProperties,
    rule: RwLock<Arc<ShardingRule>>,
    schema: RwLock<Arc<SchemaMetaData>>,
    router: ShardingRouter,
    rewrite: RewriteEngine,
}

impl Kernel {
    pub fn new(props: ConfigProperties, rule: ShardingRule, schema: SchemaMetaData) -> Self {
        info!(
            data_sources = rule.data_source_names().len(),
            sharding_tables = rule.sharding_tables().count(),
            route_cache = props.route_cache.enabled,
            "Creating kernel"
        );
        let router = ShardingRouter::new(&props);
        Self {
            props,
            rule: RwLock::new(Arc::new(rule)),
            schema: RwLock::new(Arc::new(schema)),
            router,
            rewrite: RewriteEngine::new(),
        }
    }

    /// Build the rule from configuration with the built-in algorithms
    pub fn from_config(
        props: ConfigProperties,
        config: &ShardingRuleConfiguration,
        schema: SchemaMetaData,
    ) -> Result<Self, KernelError> {
        let rule = ShardingRule::new(config, &AlgorithmRegistry::new())?;
        Ok(Self::new(props, rule, schema))
    }

    pub fn props(&self) -> &ConfigProperties {
        &self.props
    }

    pub fn rule(&self) -> Arc<ShardingRule> {
        self.rule.read().clone()
    }

    pub fn schema(&self) -> Arc<SchemaMetaData> {
        self.schema.read().clone()
    }

    pub fn compile(&self, query: &QueryContext) -> Result<ExecutionContext, KernelError> {
        let started = Instant::now();
        let rule = self.rule();
        let schema = self.schema();

        if query.deadline_exceeded() {
            return Err(KernelError::DeadlineExceeded { stage: "routing" });
        }
        let statement = StatementContext::new(query, &rule);
        let route = self.router.route(&statement, &rule, &schema)?;

        if query.deadline_exceeded() {
            return Err(KernelError::DeadlineExceeded { stage: "rewriting" });
        }
        let result = self.rewrite.rewrite(&RewriteContext::new(&statement, &rule, &schema, &route))?;
        let execution_units = ExecutionContextBuilder::build(&rule, &route, result, &query.statement)?;

        let context = ExecutionContext { execution_units, route_context: route };
        debug!(units = context.len(), "Compiled query");
        if self.props.sql_show {
            self.log_sql(query, &context, started.elapsed());
        }
        Ok(context)
    }

    /// Swap in a new rule, e.g. after shards were added or removed
    pub fn reload_rule(&self, rule: ShardingRule) {
        let data_sources = rule.data_source_names().len();
        *self.rule.write() = Arc::new(rule);
        self.router.invalidate_cache();
        info!(data_sources, "Sharding rule reloaded");
        warn!("Route cache invalidated after topology change");
    }

    pub fn reload_schema(&self, schema: SchemaMetaData) {
        *self.schema.write() = Arc::new(schema);
        self.router.invalidate_cache();
        info!("Schema metadata reloaded");
    }

    pub fn cache_stats(&self) -> CacheStatsSnapshot {
        self.router.cache_stats()
    }

    fn log_sql(&self, query: &QueryContext, context: &ExecutionContext, elapsed: Duration) {
        info!("Logic SQL: {}", query.sql);
        for unit in &context.execution_units {
            if self.props.sql_simple || unit.sql_unit.parameters.is_empty() {
                info!("Actual SQL: {unit}");
            } else {
                info!("Actual SQL: {unit} ::: [{}]", format_parameters(&unit.sql_unit.parameters));
            }
        }
        info!(elapsed_us = elapsed.as_micros() as u64, units = context.len(), "Query compiled");
    }
}

fn format_parameters(parameters: &[Value]) -> String {
    parameters.iter().map(Value::to_sql_literal).collect::<Vec<_>>().join(", ")
}
