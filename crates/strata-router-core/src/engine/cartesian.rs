//! Cartesian route: a SELECT joining independent sharding tables
//!
//! Each table (or binding group) is routed on its own. On every data source
//! that all of them reach, the actual tables are combined pairwise:
//!
//! ```text
//! t_order  ─► ds_0: [t_order_0, t_order_1]
//! t_user   ─► ds_0: [t_user_0]
//!
//! ds_0: (t_order_0, t_user_0), (t_order_1, t_user_0)
//! ```

use tracing::debug;

use super::{standard, RouteEnv};
use crate::error::RouteError;
use crate::types::{RouteContext, RouteContextBuilder, RouteMapper, RouteUnit};

pub(super) fn route(env: &RouteEnv<'_>, groups: &[Vec<String>]) -> Result<RouteContext, RouteError> {
    let mut contexts = Vec::with_capacity(groups.len());
    for group in groups {
        contexts.push(standard::route(env, group)?);
    }
    let Some(first) = contexts.first() else {
        return Ok(RouteContext::empty());
    };

    let common: Vec<&str> = first
        .actual_data_source_names()
        .into_iter()
        .filter(|ds| contexts.iter().all(|c| c.actual_data_source_names().contains(ds)))
        .collect();
    if common.is_empty() {
        let tables: Vec<String> = groups.iter().map(|g| g.join("+")).collect();
        return Err(RouteError::UnsupportedShardingOperation(format!(
            "tables {} share no data source",
            tables.join(", ")
        )));
    }

    let mut builder = RouteContextBuilder::new();
    for data_source in &common {
        let mut combinations: Vec<Vec<RouteMapper>> = vec![Vec::new()];
        for context in &contexts {
            let options: Vec<&[RouteMapper]> = context
                .route_units()
                .iter()
                .filter(|u| u.data_source() == *data_source)
                .map(|u| u.table_mappers())
                .collect();

            let size = combinations.len().saturating_mul(options.len());
            if size > env.limits.max_expansion {
                return Err(RouteError::UnsupportedShardingOperation(format!(
                    "cartesian route on {data_source} produces {size} units"
                )));
            }
            combinations = combinations
                .iter()
                .flat_map(|prefix| {
                    options.iter().map(move |mappers| {
                        let mut next = prefix.clone();
                        next.extend(mappers.iter().cloned());
                        next
                    })
                })
                .collect();
        }

        for mappers in combinations {
            builder.add_unit(RouteUnit::new(RouteMapper::identity(*data_source), mappers));
        }
    }

    for context in &contexts {
        for nodes in context.original_data_nodes() {
            builder.add_original_data_nodes(nodes.clone());
        }
    }

    let context = builder.build();
    debug!(groups = groups.len(), units = context.route_units().len(), "Cartesian route");
    Ok(context)
}
