//! Rewrite engine
//!
//! ```text
//! RewriteContext ──► TokenGeneratorRegistry ──► sorted tokens
//!        │                                         │
//!        ▼                                         ▼
//! ParameterBuilder ◄── ParameterRewriters      build_sql(unit)
//!        │                                         │
//!        └────────────────► SqlRewriteResult ◄─────┘
//! ```
//!
//! An empty route, or one unit that renames nothing, needs one rewrite
//! (`Generic`). Anything else is rewritten once per unit (`Routed`).

use indexmap::IndexMap;
use strata_router_core::RouteUnit;
use strata_types::Value;
use tracing::debug;

use crate::builder::build_sql;
use crate::context::RewriteContext;
use crate::error::RewriteError;
use crate::generator::TokenGeneratorRegistry;
use crate::parameter::{ParameterBuilder, ParameterRewriter};
use crate::token::{unit_rows, SqlToken};

/// SQL and parameters for one execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlRewriteUnit {
    pub sql: String,
    pub parameters: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlRewriteResult {
    Generic(SqlRewriteUnit),
    Routed(IndexMap<RouteUnit, SqlRewriteUnit>),
}

impl SqlRewriteResult {
    pub fn is_generic(&self) -> bool {
        matches!(self, SqlRewriteResult::Generic(_))
    }

    pub fn len(&self) -> usize {
        match self {
            SqlRewriteResult::Generic(_) => 1,
            SqlRewriteResult::Routed(units) => units.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Token generators plus parameter rewriters, shared by every query
#[derive(Debug, Clone, Default)]
pub struct RewriteEngine {
    registry: TokenGeneratorRegistry,
}

impl RewriteEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(registry: TokenGeneratorRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &TokenGeneratorRegistry {
        &self.registry
    }

    pub fn rewrite(&self, ctx: &RewriteContext<'_>) -> Result<SqlRewriteResult, RewriteError> {
        let tokens = self.registry.generate_tokens(ctx)?;

        let mut parameters = ParameterBuilder::new(ctx.statement)?;
        for rewriter in ParameterRewriter::ALL {
            rewriter.rewrite(&mut parameters, ctx)?;
        }

        let units = ctx.route.route_units();
        let generic = match units {
            [] => true,
            [unit] => unit.is_identity(),
            _ => false,
        };
        if generic {
            let sql = build_sql(ctx.sql(), &tokens, None, ctx.route)?;
            debug!(tokens = tokens.len(), "Generic rewrite");
            return Ok(SqlRewriteResult::Generic(SqlRewriteUnit { sql, parameters: parameters.parameters() }));
        }

        let mut routed = IndexMap::with_capacity(units.len());
        for unit in units {
            let sql = build_sql(ctx.sql(), &tokens, Some(unit), ctx.route)?;
            let parameters = unit_parameters(ctx, &tokens, &parameters, unit);
            routed.insert(unit.clone(), SqlRewriteUnit { sql, parameters });
        }
        debug!(tokens = tokens.len(), units = routed.len(), "Routed rewrite");
        Ok(SqlRewriteResult::Routed(routed))
    }
}

/// All parameters, unless the INSERT rows were split across units
fn unit_parameters(
    ctx: &RewriteContext<'_>,
    tokens: &[SqlToken],
    parameters: &ParameterBuilder,
    unit: &RouteUnit,
) -> Vec<Value> {
    match (parameters, &ctx.bound().insert) {
        (ParameterBuilder::Grouped(grouped), Some(insert)) if tokens.iter().any(SqlToken::is_insert_values) => {
            let rows = unit_rows(ctx.route, unit, &insert.table, insert.rows.len());
            grouped.parameters_for_groups(&rows)
        }
        _ => parameters.parameters(),
    }
}
