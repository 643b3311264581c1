//! Pagination tokens
//!
//! A page over several shards can only be cut after merging, so every shard
//! returns the rows up to the end of the page: `LIMIT o, n` becomes
//! `LIMIT 0, o + n`. Literal values are rewritten in the SQL text; marker
//! values are replaced by the pagination parameter rewriter.

use strata_types::{ExprValue, PaginationValue};

use crate::context::RewriteContext;
use crate::error::RewriteError;
use crate::token::SqlToken;

/// Offset and row count every shard runs with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MergedPagination {
    pub offset: i64,
    pub row_count: Option<i64>,
}

/// `None` when the statement needs no pagination rewrite
pub(crate) fn merged_pagination(ctx: &RewriteContext<'_>) -> Result<Option<MergedPagination>, RewriteError> {
    if !ctx.is_multi_unit() {
        return Ok(None);
    }
    let Some(limit) = &ctx.bound().limit else {
        return Ok(None);
    };
    let Some(offset) = &limit.offset else {
        return Ok(None);
    };

    let offset = resolve(ctx, offset)?;
    if offset == 0 {
        return Ok(None);
    }
    let row_count = match &limit.row_count {
        Some(row_count) => Some(
            resolve(ctx, row_count)?
                .checked_add(offset)
                .ok_or_else(|| RewriteError::InvalidPagination(format!("offset {offset} overflows row count")))?,
        ),
        None => None,
    };
    Ok(Some(MergedPagination { offset: 0, row_count }))
}

fn resolve(ctx: &RewriteContext<'_>, value: &PaginationValue) -> Result<i64, RewriteError> {
    let resolved = ctx.statement.query().resolve(&value.value).ok_or_else(|| {
        RewriteError::MissingParameter(value.value.parameter_index().unwrap_or_default())
    })?;
    match resolved.as_i64() {
        Some(v) if v >= 0 => Ok(v),
        _ => Err(RewriteError::InvalidPagination(format!("`{resolved}` is not a row count"))),
    }
}

pub(super) fn offset_token(ctx: &RewriteContext<'_>) -> Result<Option<SqlToken>, RewriteError> {
    let Some(merged) = merged_pagination(ctx)? else {
        return Ok(None);
    };
    Ok(ctx
        .bound()
        .limit
        .as_ref()
        .and_then(|l| l.offset.as_ref())
        .filter(|o| matches!(o.value, ExprValue::Literal(_)))
        .map(|o| SqlToken::literal(o.span, merged.offset.to_string())))
}

pub(super) fn row_count_token(ctx: &RewriteContext<'_>) -> Result<Option<SqlToken>, RewriteError> {
    let Some(MergedPagination { row_count: Some(row_count), .. }) = merged_pagination(ctx)? else {
        return Ok(None);
    };
    Ok(ctx
        .bound()
        .limit
        .as_ref()
        .and_then(|l| l.row_count.as_ref())
        .filter(|r| matches!(r.value, ExprValue::Literal(_)))
        .map(|r| SqlToken::literal(r.span, row_count.to_string())))
}
