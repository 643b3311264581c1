//! Sharding Router
//!
//! Picks a routing engine for a statement and runs it, going through the
//! route cache where possible.
//!
//! # Routing Decision Tree
//!
//! ```text
//! Statement arrives
//!        │
//!        ▼
//! DDL? ──Yes──► validate ──► TableBroadcast
//!        │
//! DCL? ──Yes──► DatabaseBroadcast
//! DAL? ──Yes──► Unicast
//!        │
//!        ▼
//! Any sharding table? ──No──► all broadcast? ──Yes──► SELECT: Unicast
//!        │                         │                   DML:    DatabaseBroadcast
//!        │                         No
//!        │                         ▼
//!        │                       Single
//!        Yes
//!        │
//!        ▼
//! One table or one binding group? ──Yes──► Standard
//!        │
//!        No ──► DML? ──Yes──► reject
//!                 │
//!                 No ──► Cartesian
//! ```
//!
//! Single and broadcast tables referenced next to sharding tables are merged
//! into the sharding route afterwards.

use std::sync::Arc;

use strata_core::{ConfigProperties, EvalLimits, SchemaMetaData, ShardingRule};
use strata_types::{BoundStatement, DdlKind, StatementKind};
use tracing::debug;

use crate::cache::{CacheLookup, CacheStatsSnapshot, RouteCache};
use crate::condition::ShardingConditions;
use crate::context::StatementContext;
use crate::engine::{merge_single_and_broadcast_tables, RouteEngine, RouteEnv};
use crate::error::RouteError;
use crate::types::RouteContext;

/// Router shared by every query of one rule generation
pub struct ShardingRouter {
    props: ConfigProperties,
    cache: RouteCache,
}

impl ShardingRouter {
    pub fn new(props: &ConfigProperties) -> Self {
        Self { props: props.clone(), cache: RouteCache::new(&props.route_cache) }
    }

    pub fn props(&self) -> &ConfigProperties {
        &self.props
    }

    /// Route through the cache: a cached single-shard route is returned as
    /// is, otherwise the statement is routed and the result offered to the
    /// cache.
    pub fn route(
        &self,
        ctx: &StatementContext<'_>,
        rule: &ShardingRule,
        schema: &SchemaMetaData,
    ) -> Result<Arc<RouteContext>, RouteError> {
        if ctx.query().deadline_exceeded() {
            return Err(RouteError::DeadlineExceeded);
        }

        let Some(key) = self.cache.cache_key(ctx, rule) else {
            return self.route_uncached(ctx, rule, schema).map(Arc::new);
        };
        match self.cache.lookup(&key) {
            CacheLookup::Hit(route) => {
                debug!(units = route.route_units().len(), "Route cache hit");
                Ok(route)
            }
            CacheLookup::Uncacheable => self.route_uncached(ctx, rule, schema).map(Arc::new),
            CacheLookup::Miss => {
                let route = Arc::new(self.route_uncached(ctx, rule, schema)?);
                let stored = self.cache.insert(key, &route);
                debug!(stored, units = route.route_units().len(), "Route cache miss");
                Ok(route)
            }
        }
    }

    /// Route without consulting the cache
    pub fn route_uncached(
        &self,
        ctx: &StatementContext<'_>,
        rule: &ShardingRule,
        schema: &SchemaMetaData,
    ) -> Result<RouteContext, RouteError> {
        let statement = ctx.statement();
        let engine = select_engine(statement, rule, schema)?;

        let conditions = if statement.kind.is_dml() || statement.kind == StatementKind::Select {
            ShardingConditions::extract(ctx, rule, schema)?
        } else {
            ShardingConditions::default()
        };

        let env = RouteEnv {
            ctx,
            rule,
            conditions: &conditions,
            limits: EvalLimits {
                max_expansion: self.props.max_inline_expansion,
                deadline: ctx.query().deadline,
            },
        };
        debug!(engine = engine.name(), conditions = conditions.conditions().len(), "Routing statement");
        let route = engine.route(&env)?;

        match engine {
            RouteEngine::Standard { .. } | RouteEngine::Cartesian { .. } => {
                let others: Vec<&str> = statement
                    .table_names()
                    .into_iter()
                    .filter(|t| !rule.is_sharding_table(t))
                    .collect();
                merge_single_and_broadcast_tables(route, rule, &others)
            }
            _ => Ok(route),
        }
    }

    /// Forget every cached route, e.g. after a topology change
    pub fn invalidate_cache(&self) {
        self.cache.invalidate_all();
    }

    pub fn cache_stats(&self) -> CacheStatsSnapshot {
        self.cache.stats()
    }

    pub fn cached_routes(&self) -> usize {
        self.cache.len()
    }
}

/// Choose the engine for `statement`, rejecting what cannot be routed
pub fn select_engine(
    statement: &BoundStatement,
    rule: &ShardingRule,
    schema: &SchemaMetaData,
) -> Result<RouteEngine, RouteError> {
    let names: Vec<String> = statement.table_names().into_iter().map(str::to_string).collect();

    match statement.kind {
        StatementKind::Ddl(kind) => {
            validate_ddl(kind, &names, rule, schema)?;
            let mut tables = names;
            for table in index_tables(statement, schema) {
                if !tables.iter().any(|t| t.eq_ignore_ascii_case(&table)) {
                    tables.push(table);
                }
            }
            if tables.is_empty() {
                Ok(RouteEngine::DatabaseBroadcast { tables })
            } else {
                Ok(RouteEngine::TableBroadcast { tables })
            }
        }
        StatementKind::Dcl => Ok(RouteEngine::DatabaseBroadcast { tables: names }),
        StatementKind::Dal => Ok(RouteEngine::Unicast { tables: names }),
        StatementKind::Select | StatementKind::Insert | StatementKind::Update | StatementKind::Delete => {
            select_dml_engine(statement.kind, names, rule)
        }
    }
}

fn select_dml_engine(kind: StatementKind, names: Vec<String>, rule: &ShardingRule) -> Result<RouteEngine, RouteError> {
    if names.is_empty() {
        return Ok(RouteEngine::Unicast { tables: names });
    }
    if let Some(unknown) = names.iter().find(|n| !rule.contains_table(n)) {
        return Err(RouteError::NoSuchTable(unknown.clone()));
    }

    let sharding: Vec<&str> = names
        .iter()
        .map(String::as_str)
        .filter(|n| rule.is_sharding_table(n))
        .collect();

    if sharding.is_empty() {
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        return Ok(if !rule.is_all_broadcast_tables(&refs) {
            RouteEngine::Single { tables: names }
        } else if kind == StatementKind::Select {
            RouteEngine::Unicast { tables: names }
        } else {
            RouteEngine::DatabaseBroadcast { tables: names }
        });
    }

    if sharding.len() == 1 || rule.is_all_binding_tables(&sharding) {
        return Ok(RouteEngine::Standard { tables: to_owned(&sharding) });
    }
    if kind.is_dml() {
        return Err(RouteError::DmlWithMultipleShardingTables(to_owned(&sharding)));
    }

    // group bound tables so each group routes through its first member
    let mut groups: Vec<Vec<String>> = Vec::new();
    for table in &sharding {
        let group = rule.find_binding_group(table);
        let existing = group.and_then(|g| {
            groups
                .iter_mut()
                .find(|members| members.first().is_some_and(|m| g.contains(m)))
        });
        match existing {
            Some(members) => members.push(table.to_string()),
            None => groups.push(vec![table.to_string()]),
        }
    }

    if groups.len() == 1 {
        Ok(RouteEngine::Standard { tables: groups.remove(0) })
    } else {
        Ok(RouteEngine::Cartesian { groups })
    }
}

fn validate_ddl(kind: DdlKind, names: &[String], rule: &ShardingRule, schema: &SchemaMetaData) -> Result<(), RouteError> {
    let exists = |name: &str| rule.contains_table(name) || schema.contains_table(name);

    match kind {
        DdlKind::CreateTable { if_not_exists } => {
            if let Some(name) = names.first() {
                if !if_not_exists && schema.contains_table(name) {
                    return Err(RouteError::TableExists(name.clone()));
                }
            }
        }
        DdlKind::DropTable { if_exists, cascade } => {
            if cascade {
                if let Some(name) = names.iter().find(|n| rule.is_sharding_table(n)) {
                    return Err(RouteError::UnsupportedShardingOperation(format!(
                        "DROP TABLE ... CASCADE on sharding table `{name}`"
                    )));
                }
            }
            if !if_exists {
                if let Some(name) = names.iter().find(|n| !exists(n)) {
                    return Err(RouteError::NoSuchTable(name.clone()));
                }
            }
        }
        DdlKind::RenameTable => {
            if let Some(name) = names.iter().find(|n| rule.is_sharding_table(n)) {
                return Err(RouteError::UnsupportedShardingOperation(format!(
                    "RENAME TABLE on sharding table `{name}`"
                )));
            }
            if let Some(name) = names.first().filter(|n| !exists(n)) {
                return Err(RouteError::NoSuchTable(name.clone()));
            }
        }
        DdlKind::AlterTable | DdlKind::TruncateTable | DdlKind::CreateIndex => {
            if let Some(name) = names.iter().find(|n| !exists(n)) {
                return Err(RouteError::NoSuchTable(name.clone()));
            }
        }
        DdlKind::DropIndex => {}
    }
    Ok(())
}

/// Tables owning the statement's indexes, resolved from schema metadata
/// when the statement does not name them
fn index_tables(statement: &BoundStatement, schema: &SchemaMetaData) -> Vec<String> {
    statement
        .indexes
        .iter()
        .filter_map(|index| match &index.table {
            Some(table) => Some(table.clone()),
            None => schema.find_table_by_index(&index.name).map(str::to_string),
        })
        .collect()
}

fn to_owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}
