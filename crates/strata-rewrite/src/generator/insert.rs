//! INSERT tokens: values per unit and generated keys

use strata_router_core::GeneratedKeyContext;
use strata_types::{InsertRowSegment, InsertSegment, Span};

use crate::context::RewriteContext;
use crate::error::RewriteError;
use crate::token::{InsertRowText, RouteAwareText, SqlToken};

/// Text of the generated key for `row`: a marker when the row is
/// parameterised (the value travels as a parameter), else a literal
fn generated_key_text(keys: &GeneratedKeyContext, row_index: usize, row: &InsertRowSegment) -> Option<String> {
    let key = keys.values.get(row_index)?;
    Some(if row.parameter_count() > 0 { "?".to_string() } else { key.to_sql_literal() })
}

fn generated_keys<'a>(ctx: &RewriteContext<'a>, insert: &InsertSegment) -> Option<&'a GeneratedKeyContext> {
    ctx.statement
        .generated_keys()
        .filter(|keys| keys.table.eq_ignore_ascii_case(&insert.table))
}

/// All rows as one route-aware token, so each unit only receives its own
/// rows. Needed only when several rows fan out over several units.
pub(super) fn insert_values_token(ctx: &RewriteContext<'_>) -> Result<Option<SqlToken>, RewriteError> {
    let Some(insert) = &ctx.bound().insert else {
        return Ok(None);
    };
    let (Some(first), Some(last)) = (insert.rows.first(), insert.rows.last()) else {
        return Ok(None);
    };
    if insert.rows.len() < 2 || !ctx.is_multi_unit() {
        return Ok(None);
    }

    let sql = ctx.sql();
    let keys = generated_keys(ctx, insert);
    let mut rows = Vec::with_capacity(insert.rows.len());
    for (row_index, row) in insert.rows.iter().enumerate() {
        let mut values = Vec::with_capacity(row.values.len() + 1);
        for value in &row.values {
            let text = value
                .span
                .slice(sql)
                .ok_or(RewriteError::TokenOutOfBounds { span: value.span, len: sql.len() })?;
            values.push(text.to_string());
        }
        if let Some(key) = keys.and_then(|k| generated_key_text(k, row_index, row)) {
            values.push(key);
        }
        rows.push(InsertRowText { values });
    }

    Ok(Some(SqlToken::route_aware(
        Span::new(first.span.start, last.span.end),
        RouteAwareText::InsertValues { table: insert.table.clone(), rows },
    )))
}

/// `, key_column` appended inside the column list
pub(super) fn generated_key_column_token(ctx: &RewriteContext<'_>) -> Option<SqlToken> {
    let insert = ctx.bound().insert.as_ref()?;
    let keys = generated_keys(ctx, insert)?;
    let closing = insert.columns_span?.end.checked_sub(1)?;
    Some(SqlToken::insert_at(closing, format!(", {}", keys.column)))
}

/// `, key` appended inside every row, unless an INSERT values token already
/// renders the rows with their keys
pub(super) fn generated_key_value_tokens(ctx: &RewriteContext<'_>, previous: &[SqlToken]) -> Vec<SqlToken> {
    if previous.iter().any(SqlToken::is_insert_values) {
        return vec![];
    }
    let Some(insert) = &ctx.bound().insert else {
        return vec![];
    };
    let Some(keys) = generated_keys(ctx, insert) else {
        return vec![];
    };

    insert
        .rows
        .iter()
        .enumerate()
        .filter_map(|(row_index, row)| {
            let closing = row.span.end.checked_sub(1)?;
            let text = generated_key_text(keys, row_index, row)?;
            Some(SqlToken::insert_at(closing, format!(", {text}")))
        })
        .collect()
}
