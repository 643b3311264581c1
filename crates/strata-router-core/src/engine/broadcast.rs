//! Broadcast and unicast routes

use tracing::debug;

use super::RouteEnv;
use crate::types::{RouteContext, RouteContextBuilder, RouteMapper, RouteUnit};

/// Every actual node of every table. Tables unknown to the rule (a CREATE
/// TABLE for a new plain table) go to the first data source.
pub(super) fn route_tables(env: &RouteEnv<'_>, tables: &[String]) -> RouteContext {
    if tables.is_empty() {
        return route_databases(env, tables);
    }

    let mut builder = RouteContextBuilder::new();
    for name in tables {
        if let Some(table) = env.rule.find_sharding_table(name) {
            for node in table.actual_data_nodes() {
                builder.add_unit(RouteUnit::new(
                    RouteMapper::identity(node.data_source.clone()),
                    vec![RouteMapper::new(table.logic_table(), node.table.clone())],
                ));
            }
        } else if env.rule.is_broadcast_table(name) {
            for data_source in env.rule.data_source_names() {
                builder.add_unit(RouteUnit::new(
                    RouteMapper::identity(data_source.clone()),
                    vec![RouteMapper::identity(name.clone())],
                ));
            }
        } else {
            let data_source = env
                .rule
                .single_table_data_source(name)
                .or_else(|| env.rule.data_source_names().first().map(String::as_str));
            if let Some(data_source) = data_source {
                builder.add_unit(RouteUnit::new(
                    RouteMapper::identity(data_source),
                    vec![RouteMapper::identity(name.clone())],
                ));
            }
        }
    }

    let context = builder.build();
    debug!(tables = tables.len(), units = context.route_units().len(), "Table broadcast route");
    context
}

/// One unit per data source, tables unchanged
pub(super) fn route_databases(env: &RouteEnv<'_>, tables: &[String]) -> RouteContext {
    let mut builder = RouteContextBuilder::new();
    for data_source in env.rule.data_source_names() {
        builder.add_unit(RouteUnit::new(
            RouteMapper::identity(data_source.clone()),
            tables.iter().map(|t| RouteMapper::identity(t.clone())).collect(),
        ));
    }
    debug!(data_sources = env.rule.data_source_names().len(), "Database broadcast route");
    builder.build()
}

/// The first data source, tables unchanged
pub(super) fn route_unicast(env: &RouteEnv<'_>, tables: &[String]) -> RouteContext {
    let mut builder = RouteContextBuilder::new();
    if let Some(data_source) = env.rule.data_source_names().first() {
        builder.add_unit(RouteUnit::new(
            RouteMapper::identity(data_source.clone()),
            tables.iter().map(|t| RouteMapper::identity(t.clone())).collect(),
        ));
        debug!(data_source = %data_source, "Unicast route");
    }
    builder.build()
}
