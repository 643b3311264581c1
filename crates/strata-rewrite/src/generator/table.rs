//! Table, index and schema-owner tokens

use crate::context::RewriteContext;
use crate::token::{RouteAwareText, SqlToken};

/// Every occurrence of a sharding table
pub(super) fn table_tokens(ctx: &RewriteContext<'_>) -> Vec<SqlToken> {
    ctx.bound()
        .tables
        .iter()
        .filter(|segment| ctx.rule.is_sharding_table(&segment.name))
        .map(|segment| {
            SqlToken::route_aware(segment.span, RouteAwareText::Table { logic_table: segment.name.clone() })
        })
        .collect()
}

/// Index names of sharding tables, so each actual table gets its own index
pub(super) fn index_tokens(ctx: &RewriteContext<'_>) -> Vec<SqlToken> {
    ctx.bound()
        .indexes
        .iter()
        .filter_map(|index| {
            let logic_table = match &index.table {
                Some(table) => table.clone(),
                None => ctx.schema.find_table_by_index(&index.name)?.to_string(),
            };
            ctx.rule.is_sharding_table(&logic_table).then(|| {
                SqlToken::route_aware(index.span, RouteAwareText::Index { index: index.name.clone(), logic_table })
            })
        })
        .collect()
}

/// `logic_db.t_order` with `logic_db` selected: the owner is dropped since
/// no physical database carries the logic name
pub(super) fn owner_tokens(ctx: &RewriteContext<'_>) -> Vec<SqlToken> {
    let Some(current) = ctx.connection().current_database.as_deref() else {
        return vec![];
    };
    ctx.bound()
        .tables
        .iter()
        .filter_map(|segment| segment.owner.as_ref())
        .filter(|owner| owner.name.eq_ignore_ascii_case(current))
        .map(|owner| SqlToken::literal(owner.span, ""))
        .collect()
}
