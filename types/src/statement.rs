//! Bound statement model
//!
//! The parser and binder are external collaborators. What they hand to the
//! pipeline is a `BoundStatement`: the statement kind, every table occurrence
//! with its source span, predicates already flattened into OR-of-AND groups,
//! INSERT rows, index names and pagination. Spans index into the original SQL
//! text and are never adjusted after binding.

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Half-open byte range `[start, end)` into the original SQL text.
///
/// A zero-length span marks an insertion point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Zero-length span at `position`
    pub fn at(position: usize) -> Self {
        Self { start: position, end: position }
    }

    /// Span of the first occurrence of `needle` in `sql` at or after `from`
    pub fn find(sql: &str, needle: &str, from: usize) -> Option<Self> {
        let start = from + sql.get(from..)?.find(needle)?;
        Some(Self::new(start, start + needle.len()))
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn slice<'a>(&self, sql: &'a str) -> Option<&'a str> {
        sql.get(self.start..self.end)
    }
}

/// Top level statement classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Ddl(DdlKind),
    /// SHOW, SET, DESCRIBE ...
    Dal,
    /// GRANT, REVOKE ...
    Dcl,
}

impl StatementKind {
    /// Data-modifying statement (INSERT, UPDATE, DELETE)
    pub fn is_dml(&self) -> bool {
        matches!(self, Self::Insert | Self::Update | Self::Delete)
    }

    pub fn is_ddl(&self) -> bool {
        matches!(self, Self::Ddl(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DdlKind {
    CreateTable { if_not_exists: bool },
    AlterTable,
    DropTable { if_exists: bool, cascade: bool },
    TruncateTable,
    RenameTable,
    CreateIndex,
    DropIndex,
}

/// Schema qualifier in front of a table name, e.g. `logic_db.` in
/// `logic_db.t_order`. The span covers the trailing dot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerSegment {
    pub name: String,
    pub span: Span,
}

/// One occurrence of a table name in the SQL text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSegment {
    pub name: String,
    pub span: Span,
    pub owner: Option<OwnerSegment>,
}

impl TableSegment {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self { name: name.into(), span, owner: None }
    }

    pub fn with_owner(mut self, name: impl Into<String>, span: Span) -> Self {
        self.owner = Some(OwnerSegment { name: name.into(), span });
        self
    }
}

/// Index name in a DDL statement. `table` is set when the statement names it
/// (`CREATE INDEX idx ON t_order`); otherwise it is resolved from schema
/// metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSegment {
    pub name: String,
    pub span: Span,
    pub table: Option<String>,
}

/// A literal baked into the SQL or a positional parameter marker (0-based)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExprValue {
    Literal(Value),
    Parameter(usize),
}

impl ExprValue {
    pub fn parameter_index(&self) -> Option<usize> {
        match self {
            ExprValue::Parameter(idx) => Some(*idx),
            ExprValue::Literal(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    Eq,
    In,
    /// Two values: lower and upper, both inclusive
    Between,
    Lt,
    Le,
    Gt,
    Ge,
}

/// `table.column <op> values`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnPredicate {
    pub table: String,
    pub column: String,
    pub operator: Operator,
    pub values: Vec<ExprValue>,
}

impl ColumnPredicate {
    pub fn new(
        table: impl Into<String>,
        column: impl Into<String>,
        operator: Operator,
        values: Vec<ExprValue>,
    ) -> Self {
        Self { table: table.into(), column: column.into(), operator, values }
    }
}

/// Conjunction of predicates. A statement's WHERE clause is a disjunction of
/// these groups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AndPredicate {
    pub predicates: Vec<ColumnPredicate>,
}

impl AndPredicate {
    pub fn new(predicates: Vec<ColumnPredicate>) -> Self {
        Self { predicates }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertValueSegment {
    pub span: Span,
    pub value: ExprValue,
}

/// One parenthesised row of an INSERT ... VALUES list. The span covers the
/// parentheses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertRowSegment {
    pub span: Span,
    pub values: Vec<InsertValueSegment>,
}

impl InsertRowSegment {
    /// Number of parameter markers in this row
    pub fn parameter_count(&self) -> usize {
        self.values
            .iter()
            .filter(|v| matches!(v.value, ExprValue::Parameter(_)))
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertSegment {
    pub table: String,
    /// Explicit column names, in order
    pub columns: Vec<String>,
    /// Span of the parenthesised column list, if the statement has one
    pub columns_span: Option<Span>,
    pub rows: Vec<InsertRowSegment>,
}

impl InsertSegment {
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(column))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginationValue {
    pub span: Span,
    pub value: ExprValue,
}

/// `LIMIT [offset,] row_count` / `LIMIT row_count OFFSET offset`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LimitSegment {
    pub offset: Option<PaginationValue>,
    pub row_count: Option<PaginationValue>,
}

/// Output of the external parser + binder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundStatement {
    pub kind: StatementKind,
    pub tables: Vec<TableSegment>,
    pub where_groups: Vec<AndPredicate>,
    pub insert: Option<InsertSegment>,
    pub indexes: Vec<IndexSegment>,
    pub limit: Option<LimitSegment>,
    pub has_subquery: bool,
    /// Set by the binder when the statement calls a non-deterministic
    /// function anywhere outside the projection list
    pub contains_non_deterministic: bool,
}

impl BoundStatement {
    pub fn new(kind: StatementKind) -> Self {
        Self {
            kind,
            tables: vec![],
            where_groups: vec![],
            insert: None,
            indexes: vec![],
            limit: None,
            has_subquery: false,
            contains_non_deterministic: false,
        }
    }

    pub fn with_table(mut self, table: TableSegment) -> Self {
        self.tables.push(table);
        self
    }

    pub fn with_where(mut self, group: AndPredicate) -> Self {
        self.where_groups.push(group);
        self
    }

    pub fn with_insert(mut self, insert: InsertSegment) -> Self {
        self.insert = Some(insert);
        self
    }

    pub fn with_index(mut self, index: IndexSegment) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn with_limit(mut self, limit: LimitSegment) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Distinct referenced table names in order of first appearance
    /// (case-insensitive)
    pub fn table_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::with_capacity(self.tables.len());
        for table in &self.tables {
            if !names.iter().any(|n| n.eq_ignore_ascii_case(&table.name)) {
                names.push(&table.name);
            }
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_find_and_slice() {
        let sql = "SELECT * FROM t_order WHERE t_order.id = ?";
        let first = Span::find(sql, "t_order", 0).unwrap();
        assert_eq!(first, Span::new(14, 21));
        assert_eq!(first.slice(sql), Some("t_order"));

        let second = Span::find(sql, "t_order", first.end).unwrap();
        assert_eq!(second.start, 28);
        assert!(Span::at(5).is_empty());
    }

    #[test]
    fn test_table_names_dedup_case_insensitive() {
        let stmt = BoundStatement::new(StatementKind::Select)
            .with_table(TableSegment::new("t_order", Span::new(0, 7)))
            .with_table(TableSegment::new("T_ORDER", Span::new(10, 17)))
            .with_table(TableSegment::new("t_user", Span::new(20, 26)));

        assert_eq!(stmt.table_names(), vec!["t_order", "t_user"]);
    }
}
