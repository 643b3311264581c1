//! Standard route: one sharding table, or one binding group routed through
//! its primary table

use strata_core::{DataNode, ShardingTable};
use strata_types::StatementKind;
use tracing::debug;

use super::RouteEnv;
use crate::condition::ShardingCondition;
use crate::error::RouteError;
use crate::types::{RouteContext, RouteContextBuilder, RouteMapper, RouteUnit};

pub(super) fn route(env: &RouteEnv<'_>, tables: &[String]) -> Result<RouteContext, RouteError> {
    let Some((primary_name, bound_names)) = tables.split_first() else {
        return Ok(RouteContext::empty());
    };
    let primary = env
        .rule
        .find_sharding_table(primary_name)
        .ok_or_else(|| RouteError::NoSuchTable(primary_name.clone()))?;

    let mut bound = Vec::with_capacity(bound_names.len());
    for name in bound_names {
        let table = env
            .rule
            .find_sharding_table(name)
            .ok_or_else(|| RouteError::NoSuchTable(name.clone()))?;
        bound.push(table);
    }

    let group: Vec<&str> = tables.iter().map(String::as_str).collect();
    let (nodes, original) = route_data_nodes(env, primary, &group)?;

    let mut builder = RouteContextBuilder::new();
    for node in &nodes {
        let mut mappers = vec![RouteMapper::new(primary.logic_table(), node.table.clone())];
        for table in &bound {
            let actual = env.rule.binding_actual_table(
                &node.data_source,
                primary.logic_table(),
                &node.table,
                table.logic_table(),
            );
            if let Some(actual) = actual {
                mappers.push(RouteMapper::new(table.logic_table(), actual));
            }
        }
        builder.add_unit(RouteUnit::new(RouteMapper::identity(node.data_source.clone()), mappers));
    }
    for group in original {
        builder.add_original_data_nodes(group);
    }

    debug!(table = %primary.logic_table(), bound = bound.len(), nodes = nodes.len(), "Standard route");
    Ok(builder.build())
}

/// Route `table` under every sharding condition. Returns the union of the
/// nodes and the nodes of each condition.
pub(super) fn route_data_nodes(
    env: &RouteEnv<'_>,
    table: &ShardingTable,
    binding_tables: &[&str],
) -> Result<(Vec<DataNode>, Vec<Vec<DataNode>>), RouteError> {
    let is_insert = env.ctx.statement().kind == StatementKind::Insert;
    let unconditioned = ShardingCondition::default();
    let conditions: Vec<&ShardingCondition> = if env.conditions.is_empty() {
        vec![&unconditioned]
    } else {
        env.conditions.conditions().iter().collect()
    };

    let mut all: Vec<DataNode> = Vec::new();
    let mut original: Vec<Vec<DataNode>> = Vec::with_capacity(conditions.len());

    for (index, condition) in conditions.into_iter().enumerate() {
        if condition.always_false {
            continue;
        }
        env.check_deadline()?;

        let nodes = route_condition(env, table, condition, binding_tables)?;
        if is_insert && nodes.len() != 1 {
            return Err(RouteError::UnsupportedShardingOperation(format!(
                "INSERT row {index} of `{}` must route to exactly one data node, found {}",
                table.logic_table(),
                nodes.len()
            )));
        }

        for node in &nodes {
            if !all.contains(node) {
                all.push(node.clone());
            }
        }
        original.push(nodes);
    }

    if all.is_empty() {
        // nothing can match: run against one node so the statement still
        // executes and returns its empty result
        if let Some(first) = table.actual_data_nodes().first() {
            debug!(table = %table.logic_table(), node = %first, "No data node matched, routing to first node");
            all.push(first.clone());
            original = vec![vec![first.clone()]];
        }
    }

    Ok((all, original))
}

fn route_condition(
    env: &RouteEnv<'_>,
    table: &ShardingTable,
    condition: &ShardingCondition,
    binding_tables: &[&str],
) -> Result<Vec<DataNode>, RouteError> {
    let hint = env.ctx.query().hint.as_ref();
    let database_hints = hint.map(|h| h.database.as_slice()).unwrap_or_default();
    let table_hints = hint.map(|h| h.table.as_slice()).unwrap_or_default();
    let values = condition.column_values(binding_tables);

    let data_sources = table.data_source_names();
    let routed_sources = table
        .database_strategy()
        .do_sharding(&data_sources, &values, database_hints, &env.limits)?;

    let mut nodes = Vec::new();
    for data_source in routed_sources {
        let actual_tables = table.actual_tables(&data_source);
        let routed_tables = table
            .table_strategy()
            .do_sharding(actual_tables, &values, table_hints, &env.limits)?;
        nodes.extend(routed_tables.into_iter().map(|t| DataNode::new(data_source.clone(), t)));
    }
    Ok(nodes)
}
