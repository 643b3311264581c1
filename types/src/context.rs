//! Per-query input handed to the compilation pipeline

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::statement::{BoundStatement, ExprValue};
use crate::value::Value;

/// Explicit sharding values supplied by the caller, consumed by Hint
/// strategies instead of values extracted from the SQL
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HintValues {
    pub database: Vec<Value>,
    pub table: Vec<Value>,
}

/// Session state of the client connection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionContext {
    /// Logical database selected by the session (`USE logic_db`)
    pub current_database: Option<String>,
}

/// A SQL statement, its binding and its parameters
#[derive(Debug, Clone)]
pub struct QueryContext {
    /// Original SQL text; spans in `statement` index into it
    pub sql: String,
    pub statement: BoundStatement,
    pub parameters: Vec<Value>,
    pub hint: Option<HintValues>,
    pub connection: ConnectionContext,
    /// Caller-imposed deadline, checked before expensive compilation steps
    pub deadline: Option<Instant>,
}

impl QueryContext {
    pub fn new(sql: impl Into<String>, statement: BoundStatement, parameters: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            statement,
            parameters,
            hint: None,
            connection: ConnectionContext::default(),
            deadline: None,
        }
    }

    pub fn with_hint(mut self, hint: HintValues) -> Self {
        self.hint = Some(hint);
        self
    }

    pub fn with_connection(mut self, connection: ConnectionContext) -> Self {
        self.connection = connection;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Resolve a literal or parameter marker to its value. `None` when the
    /// marker index is outside the parameter list.
    pub fn resolve(&self, value: &ExprValue) -> Option<Value> {
        match value {
            ExprValue::Literal(v) => Some(v.clone()),
            ExprValue::Parameter(idx) => self.parameters.get(*idx).cloned(),
        }
    }

    pub fn deadline_exceeded(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::StatementKind;
    use std::time::Duration;

    #[test]
    fn test_resolve_parameter_and_literal() {
        let ctx = QueryContext::new(
            "SELECT 1",
            BoundStatement::new(StatementKind::Select),
            vec![Value::Int(7)],
        );

        assert_eq!(ctx.resolve(&ExprValue::Parameter(0)), Some(Value::Int(7)));
        assert_eq!(ctx.resolve(&ExprValue::Parameter(3)), None);
        assert_eq!(ctx.resolve(&ExprValue::Literal(Value::Int(1))), Some(Value::Int(1)));
    }

    #[test]
    fn test_deadline() {
        let stmt = BoundStatement::new(StatementKind::Select);
        let past = Instant::now() - Duration::from_millis(1);
        assert!(QueryContext::new("SELECT 1", stmt.clone(), vec![]).with_deadline(past).deadline_exceeded());
        assert!(!QueryContext::new("SELECT 1", stmt, vec![]).deadline_exceeded());
    }
}
