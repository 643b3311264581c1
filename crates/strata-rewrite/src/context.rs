//! Inputs shared by token generators and parameter rewriters

use strata_core::{SchemaMetaData, ShardingRule};
use strata_router_core::{RouteContext, StatementContext};
use strata_types::{BoundStatement, ConnectionContext};

/// Everything a rewrite step may read: statement and parameters, the rule,
/// schema metadata, the connection and the route being rewritten for
#[derive(Clone, Copy)]
pub struct RewriteContext<'a> {
    pub statement: &'a StatementContext<'a>,
    pub rule: &'a ShardingRule,
    pub schema: &'a SchemaMetaData,
    pub route: &'a RouteContext,
}

impl<'a> RewriteContext<'a> {
    pub fn new(
        statement: &'a StatementContext<'a>,
        rule: &'a ShardingRule,
        schema: &'a SchemaMetaData,
        route: &'a RouteContext,
    ) -> Self {
        Self { statement, rule, schema, route }
    }

    pub fn bound(&self) -> &'a BoundStatement {
        self.statement.statement()
    }

    pub fn sql(&self) -> &'a str {
        self.statement.sql()
    }

    pub fn connection(&self) -> &'a ConnectionContext {
        &self.statement.query().connection
    }

    /// The route fans out to more than one unit
    pub fn is_multi_unit(&self) -> bool {
        self.route.route_units().len() > 1
    }
}
