//! Single tables: non-sharded tables living on exactly one data source

use strata_core::ShardingRule;

use super::RouteEnv;
use crate::error::RouteError;
use crate::types::{RouteContext, RouteContextBuilder, RouteMapper, RouteUnit};

/// Statement over single (and broadcast) tables only. All single tables
/// must live on the same data source.
pub(super) fn route(env: &RouteEnv<'_>, tables: &[String]) -> Result<RouteContext, RouteError> {
    let mut data_source: Option<&str> = None;
    for name in tables {
        let Some(location) = env.rule.single_table_data_source(name) else {
            continue;
        };
        match data_source {
            Some(existing) if existing != location => {
                return Err(RouteError::UnsupportedShardingOperation(format!(
                    "single tables span data sources {existing} and {location}"
                )));
            }
            _ => data_source = Some(location),
        }
    }

    let mut builder = RouteContextBuilder::new();
    if let Some(data_source) = data_source {
        builder.add_unit(RouteUnit::new(
            RouteMapper::identity(data_source),
            tables.iter().map(|t| RouteMapper::identity(t.clone())).collect(),
        ));
    }
    Ok(builder.build())
}

/// Add the single and broadcast tables of a statement to a sharding route.
/// A single table joins the route only when every unit sits on its data
/// source; a broadcast table exists everywhere and joins every unit.
pub(crate) fn merge_single_and_broadcast_tables(
    context: RouteContext,
    rule: &ShardingRule,
    tables: &[&str],
) -> Result<RouteContext, RouteError> {
    let mut builder = RouteContextBuilder::from(context);
    for name in tables {
        if let Some(data_source) = rule.single_table_data_source(name) {
            if let Some(unit) = builder.units().iter().find(|u| u.data_source() != data_source) {
                return Err(RouteError::UnsupportedShardingOperation(format!(
                    "single table {name} on {data_source} cannot join sharding tables routed to {}",
                    unit.data_source()
                )));
            }
            let mapper = RouteMapper::identity(*name);
            if !builder.append_table_mapper(data_source, &mapper) {
                builder.add_unit(RouteUnit::new(RouteMapper::identity(data_source), vec![mapper]));
            }
        } else if rule.is_broadcast_table(name) {
            builder.append_table_mapper_to_all(&RouteMapper::identity(*name));
        }
    }
    Ok(builder.build())
}
