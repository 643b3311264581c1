//! Execution context builder
//!
//! Turns a rewrite result into the units the executor runs. A generic
//! rewrite runs once on a representative data source; a routed rewrite runs
//! once per route unit. Units that would run the same SQL with the same
//! parameters on the same data source are collapsed.

use indexmap::IndexSet;
use strata_core::ShardingRule;
use strata_rewrite::{SqlRewriteResult, SqlRewriteUnit};
use strata_router_core::{RouteContext, RouteMapper};
use strata_types::BoundStatement;
use tracing::debug;

use crate::context::{ExecutionUnit, SqlUnit};
use crate::error::KernelError;

pub struct ExecutionContextBuilder;

impl ExecutionContextBuilder {
    pub fn build(
        rule: &ShardingRule,
        route: &RouteContext,
        result: SqlRewriteResult,
        statement: &BoundStatement,
    ) -> Result<Vec<ExecutionUnit>, KernelError> {
        match result {
            SqlRewriteResult::Generic(unit) => Ok(vec![generic_unit(rule, route, unit, statement)?]),
            SqlRewriteResult::Routed(units) => {
                let total = units.len();
                let units: IndexSet<ExecutionUnit> = units
                    .into_iter()
                    .map(|(route_unit, rewritten)| {
                        ExecutionUnit::new(
                            route_unit.data_source(),
                            SqlUnit {
                                sql: rewritten.sql,
                                parameters: rewritten.parameters,
                                table_route_mappers: route_unit.table_mappers().to_vec(),
                            },
                        )
                    })
                    .collect();
                if units.len() < total {
                    debug!(collapsed = total - units.len(), "Collapsed duplicate execution units");
                }
                Ok(units.into_iter().collect())
            }
        }
    }
}

fn generic_unit(
    rule: &ShardingRule,
    route: &RouteContext,
    unit: SqlRewriteUnit,
    statement: &BoundStatement,
) -> Result<ExecutionUnit, KernelError> {
    let data_source = route
        .route_units()
        .first()
        .map(|u| u.data_source())
        .or_else(|| rule.data_source_names().first().map(String::as_str))
        .ok_or(KernelError::NoDataSource)?;

    let table_route_mappers = statement.table_names().into_iter().map(RouteMapper::identity).collect();
    Ok(ExecutionUnit::new(
        data_source,
        SqlUnit { sql: unit.sql, parameters: unit.parameters, table_route_mappers },
    ))
}
