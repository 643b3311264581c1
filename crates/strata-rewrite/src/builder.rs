//! SQL builder: original text plus sorted tokens

use strata_router_core::{RouteContext, RouteUnit};
use strata_types::Span;

use crate::error::RewriteError;
use crate::token::SqlToken;

/// Walk `sql` left to right, copying text between tokens verbatim and
/// rendering each token for `unit`.
///
/// Tokens must be sorted by start and must not overlap; the generator
/// registry guarantees both.
pub fn build_sql(
    sql: &str,
    tokens: &[SqlToken],
    unit: Option<&RouteUnit>,
    route: &RouteContext,
) -> Result<String, RewriteError> {
    if tokens.is_empty() {
        return Ok(sql.to_string());
    }

    let mut result = String::with_capacity(sql.len() + 16 * tokens.len());
    let mut cursor = 0;
    for token in tokens {
        let between = sql
            .get(cursor..token.span.start)
            .ok_or(RewriteError::TokenOutOfBounds { span: token.span, len: sql.len() })?;
        result.push_str(between);
        result.push_str(&token.render(unit, route));
        cursor = token.span.end;
    }
    let rest = sql
        .get(cursor..)
        .ok_or(RewriteError::TokenOutOfBounds { span: Span::at(cursor), len: sql.len() })?;
    result.push_str(rest);
    Ok(result)
}
