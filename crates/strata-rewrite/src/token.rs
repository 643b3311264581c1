//! SQL tokens
//!
//! A token marks a half-open span of the original SQL text and says what to
//! put there instead. Literal tokens render the same text for every route
//! unit; route-aware tokens depend on the unit being built.

use strata_core::DataNode;
use strata_router_core::{RouteContext, RouteUnit};
use strata_types::Span;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlToken {
    pub span: Span,
    pub text: TokenText,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenText {
    /// Fixed replacement; empty removes the span
    Literal(String),
    RouteAware(RouteAwareText),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteAwareText {
    /// Logic table name replaced by the unit's actual table
    Table { logic_table: String },
    /// Index name suffixed with the unit's actual table
    Index { index: String, logic_table: String },
    /// INSERT rows, filtered to the rows routed to the unit
    InsertValues { table: String, rows: Vec<InsertRowText> },
}

/// One rendered INSERT row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertRowText {
    pub values: Vec<String>,
}

impl SqlToken {
    pub fn literal(span: Span, text: impl Into<String>) -> Self {
        Self { span, text: TokenText::Literal(text.into()) }
    }

    pub fn route_aware(span: Span, text: RouteAwareText) -> Self {
        Self { span, text: TokenText::RouteAware(text) }
    }

    /// Zero-length insertion before `position`
    pub fn insert_at(position: usize, text: impl Into<String>) -> Self {
        Self::literal(Span::at(position), text)
    }

    pub fn is_insert_values(&self) -> bool {
        matches!(self.text, TokenText::RouteAware(RouteAwareText::InsertValues { .. }))
    }

    /// Text for `unit`. Without a unit, route-aware tokens keep logic names.
    pub fn render(&self, unit: Option<&RouteUnit>, route: &RouteContext) -> String {
        match &self.text {
            TokenText::Literal(text) => text.clone(),
            TokenText::RouteAware(RouteAwareText::Table { logic_table }) => unit
                .and_then(|u| u.actual_table(logic_table))
                .unwrap_or(logic_table)
                .to_string(),
            TokenText::RouteAware(RouteAwareText::Index { index, logic_table }) => {
                match unit.and_then(|u| u.find_table_mapper(logic_table)) {
                    Some(mapper) if !mapper.is_identity() => format!("{index}_{}", mapper.actual_name),
                    _ => index.clone(),
                }
            }
            TokenText::RouteAware(RouteAwareText::InsertValues { table, rows }) => {
                let selected = match unit {
                    Some(unit) => unit_rows(route, unit, table, rows.len()),
                    None => (0..rows.len()).collect(),
                };
                selected
                    .iter()
                    .filter_map(|i| rows.get(*i))
                    .map(|row| format!("({})", row.values.join(", ")))
                    .collect::<Vec<_>>()
                    .join(", ")
            }
        }
    }
}

/// Indexes of the INSERT rows routed to `unit`. Every row goes everywhere
/// when the route did not record one node group per row.
pub(crate) fn unit_rows(route: &RouteContext, unit: &RouteUnit, table: &str, row_count: usize) -> Vec<usize> {
    let groups = route.original_data_nodes();
    if groups.len() != row_count {
        return (0..row_count).collect();
    }
    let actual_table = unit.actual_table(table).unwrap_or(table);
    groups
        .iter()
        .enumerate()
        .filter(|(_, nodes)| nodes.iter().any(|n: &DataNode| n.matches(unit.data_source(), actual_table)))
        .map(|(i, _)| i)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_router_core::{RouteContextBuilder, RouteMapper};

    fn unit(ds: &str, logic: &str, actual: &str) -> RouteUnit {
        RouteUnit::new(RouteMapper::identity(ds), vec![RouteMapper::new(logic, actual)])
    }

    #[test]
    fn test_render_table_and_index() {
        let route = RouteContext::empty();
        let unit = unit("ds_0", "t_order", "t_order_1");

        let table = SqlToken::route_aware(Span::new(0, 7), RouteAwareText::Table { logic_table: "t_order".into() });
        assert_eq!(table.render(Some(&unit), &route), "t_order_1");
        assert_eq!(table.render(None, &route), "t_order");

        let index = SqlToken::route_aware(
            Span::new(0, 3),
            RouteAwareText::Index { index: "idx".into(), logic_table: "t_order".into() },
        );
        assert_eq!(index.render(Some(&unit), &route), "idx_t_order_1");
        assert_eq!(index.render(None, &route), "idx");
    }

    #[test]
    fn test_render_insert_values_per_unit() {
        let first = unit("ds_0", "t_order", "t_order_0");
        let second = unit("ds_1", "t_order", "t_order_1");
        let mut builder = RouteContextBuilder::new();
        builder.add_unit(first.clone());
        builder.add_unit(second.clone());
        builder.add_original_data_nodes(vec![DataNode::new("ds_0", "t_order_0")]);
        builder.add_original_data_nodes(vec![DataNode::new("ds_1", "t_order_1")]);
        builder.add_original_data_nodes(vec![DataNode::new("ds_0", "t_order_0")]);
        let route = builder.build();

        let rows = ["(0, 'a')", "(1, 'b')", "(2, 'c')"]
            .iter()
            .map(|r| InsertRowText {
                values: r.trim_matches(|c| c == '(' || c == ')').split(", ").map(str::to_string).collect(),
            })
            .collect();
        let token = SqlToken::route_aware(
            Span::new(10, 40),
            RouteAwareText::InsertValues { table: "t_order".into(), rows },
        );

        assert_eq!(token.render(Some(&first), &route), "(0, 'a'), (2, 'c')");
        assert_eq!(token.render(Some(&second), &route), "(1, 'b')");
        assert_eq!(token.render(None, &route), "(0, 'a'), (1, 'b'), (2, 'c')");
    }
}
