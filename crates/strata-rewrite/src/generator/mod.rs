//! Token Generators
//!
//! A closed set of generators, each producing tokens for one aspect of the
//! statement. The registry runs them in fixed priority order so generators
//! that look at earlier tokens (generated-key values look for an INSERT
//! values token) always see them, then sorts and validates the result once.

mod insert;
mod pagination;
mod table;

pub(crate) use pagination::merged_pagination;

use tracing::trace;

use crate::context::RewriteContext;
use crate::error::RewriteError;
use crate::token::SqlToken;

/// Output of one generator: zero-or-one versus many tokens per statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generated {
    Optional(Option<SqlToken>),
    Collection(Vec<SqlToken>),
}

impl Generated {
    fn into_tokens(self) -> Vec<SqlToken> {
        match self {
            Generated::Optional(token) => token.into_iter().collect(),
            Generated::Collection(tokens) => tokens,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenGenerator {
    /// Drops a schema owner equal to the session's current database
    RemoveOwner,
    TableName,
    IndexName,
    /// Multi-row INSERT spread over several units
    InsertValues,
    GeneratedKeyColumn,
    GeneratedKeyValues,
    Offset,
    RowCount,
}

impl TokenGenerator {
    pub const ALL: [TokenGenerator; 8] = [
        TokenGenerator::RemoveOwner,
        TokenGenerator::TableName,
        TokenGenerator::IndexName,
        TokenGenerator::InsertValues,
        TokenGenerator::GeneratedKeyColumn,
        TokenGenerator::GeneratedKeyValues,
        TokenGenerator::Offset,
        TokenGenerator::RowCount,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TokenGenerator::RemoveOwner => "remove-owner",
            TokenGenerator::TableName => "table-name",
            TokenGenerator::IndexName => "index-name",
            TokenGenerator::InsertValues => "insert-values",
            TokenGenerator::GeneratedKeyColumn => "generated-key-column",
            TokenGenerator::GeneratedKeyValues => "generated-key-values",
            TokenGenerator::Offset => "offset",
            TokenGenerator::RowCount => "row-count",
        }
    }

    /// Lower runs first
    pub fn priority(&self) -> u8 {
        match self {
            TokenGenerator::RemoveOwner => 0,
            TokenGenerator::TableName => 10,
            TokenGenerator::IndexName => 20,
            TokenGenerator::InsertValues => 30,
            TokenGenerator::GeneratedKeyColumn => 40,
            TokenGenerator::GeneratedKeyValues => 50,
            TokenGenerator::Offset => 60,
            TokenGenerator::RowCount => 70,
        }
    }

    /// Output depends on tokens of higher-priority generators. Only these
    /// are handed the tokens generated so far.
    pub fn uses_previous_tokens(&self) -> bool {
        matches!(self, TokenGenerator::GeneratedKeyValues)
    }

    pub fn generate(&self, ctx: &RewriteContext<'_>, previous: &[SqlToken]) -> Result<Generated, RewriteError> {
        Ok(match self {
            TokenGenerator::RemoveOwner => Generated::Collection(table::owner_tokens(ctx)),
            TokenGenerator::TableName => Generated::Collection(table::table_tokens(ctx)),
            TokenGenerator::IndexName => Generated::Collection(table::index_tokens(ctx)),
            TokenGenerator::InsertValues => Generated::Optional(insert::insert_values_token(ctx)?),
            TokenGenerator::GeneratedKeyColumn => Generated::Optional(insert::generated_key_column_token(ctx)),
            TokenGenerator::GeneratedKeyValues => {
                Generated::Collection(insert::generated_key_value_tokens(ctx, previous))
            }
            TokenGenerator::Offset => Generated::Optional(pagination::offset_token(ctx)?),
            TokenGenerator::RowCount => Generated::Optional(pagination::row_count_token(ctx)?),
        })
    }
}

/// Ordered generators, built once and shared by every query
#[derive(Debug, Clone)]
pub struct TokenGeneratorRegistry {
    generators: Vec<TokenGenerator>,
}

impl Default for TokenGeneratorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenGeneratorRegistry {
    /// Every generator
    pub fn new() -> Self {
        Self::with_generators(TokenGenerator::ALL.to_vec())
    }

    pub fn with_generators(mut generators: Vec<TokenGenerator>) -> Self {
        generators.sort_by_key(TokenGenerator::priority);
        generators.dedup();
        Self { generators }
    }

    pub fn generators(&self) -> &[TokenGenerator] {
        &self.generators
    }

    /// Tokens sorted by start, checked to lie inside the SQL and not to
    /// overlap
    pub fn generate_tokens(&self, ctx: &RewriteContext<'_>) -> Result<Vec<SqlToken>, RewriteError> {
        let mut tokens: Vec<SqlToken> = Vec::new();
        for generator in &self.generators {
            let previous: &[SqlToken] = if generator.uses_previous_tokens() { &tokens } else { &[] };
            let generated = generator.generate(ctx, previous)?.into_tokens();
            if !generated.is_empty() {
                trace!(generator = generator.name(), tokens = generated.len(), "Generated SQL tokens");
            }
            tokens.extend(generated);
        }

        tokens.sort_by_key(|t| (t.span.start, t.span.end));
        validate(&tokens, ctx.sql().len())?;
        Ok(tokens)
    }
}

fn validate(tokens: &[SqlToken], len: usize) -> Result<(), RewriteError> {
    for token in tokens {
        if token.span.start > token.span.end || token.span.end > len {
            return Err(RewriteError::TokenOutOfBounds { span: token.span, len });
        }
    }
    for pair in tokens.windows(2) {
        if pair[0].span.end > pair[1].span.start {
            return Err(RewriteError::OverlappingTokens { first: pair[0].span, second: pair[1].span });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_types::Span;

    #[test]
    fn test_registry_orders_by_priority() {
        let registry = TokenGeneratorRegistry::with_generators(vec![
            TokenGenerator::RowCount,
            TokenGenerator::GeneratedKeyValues,
            TokenGenerator::InsertValues,
            TokenGenerator::TableName,
            TokenGenerator::TableName,
        ]);
        assert_eq!(
            registry.generators(),
            [
                TokenGenerator::TableName,
                TokenGenerator::InsertValues,
                TokenGenerator::GeneratedKeyValues,
                TokenGenerator::RowCount
            ]
        );

        let all = TokenGeneratorRegistry::new();
        let position = |g: TokenGenerator| all.generators().iter().position(|x| *x == g);
        assert!(position(TokenGenerator::InsertValues) < position(TokenGenerator::GeneratedKeyValues));
    }

    #[test]
    fn test_validate_rejects_overlap() {
        let tokens = vec![SqlToken::literal(Span::new(0, 5), "a"), SqlToken::literal(Span::new(3, 8), "b")];
        assert!(matches!(validate(&tokens, 10), Err(RewriteError::OverlappingTokens { .. })));

        let adjacent = vec![
            SqlToken::literal(Span::new(0, 5), "a"),
            SqlToken::insert_at(5, "b"),
            SqlToken::literal(Span::new(5, 8), "c"),
        ];
        assert!(validate(&adjacent, 10).is_ok());
        assert!(matches!(validate(&adjacent, 6), Err(RewriteError::TokenOutOfBounds { .. })));
    }
}
