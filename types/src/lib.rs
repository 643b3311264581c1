//! Strata Types - data handed across the compilation pipeline boundary
//!
//! The SQL parser, binder and metadata store are external collaborators. This
//! crate holds what they produce (`BoundStatement`, `QueryContext`) together
//! with the scalar `Value` used for parameters and literals.

// ========== Core Modules ==========
pub mod context;
pub mod statement;
pub mod value;

// Export commonly used types
pub use context::{ConnectionContext, HintValues, QueryContext};
pub use statement::{
    AndPredicate, BoundStatement, ColumnPredicate, DdlKind, ExprValue, IndexSegment,
    InsertRowSegment, InsertSegment, InsertValueSegment, LimitSegment, Operator, OwnerSegment,
    PaginationValue, Span, StatementKind, TableSegment,
};
pub use value::Value;
