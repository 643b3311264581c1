//! Sharding condition extraction
//!
//! Turns the bound statement into sharding conditions:
//!
//! - WHERE: one condition per OR group; predicates on the same column
//!   within a group are intersected
//! - INSERT: one condition per row, including generated keys
//!
//! Only predicates on sharding columns of sharding tables are kept. A
//! condition without values routes to every node of its table.

use strata_core::{ColumnValues, SchemaMetaData, ShardingRule, ShardingValues, ValueRange};
use strata_types::{AndPredicate, ColumnPredicate, ExprValue, Operator, QueryContext, Value};
use tracing::debug;

use crate::context::StatementContext;
use crate::error::RouteError;

/// Values of one sharding column in one condition
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionValue {
    pub table: String,
    pub column: String,
    pub values: ShardingValues,
    /// Parameter markers the values were read from
    pub parameter_markers: Vec<usize>,
    /// Some value was a literal baked into the SQL text
    pub has_literal: bool,
}

/// Conditions of one OR group or one INSERT row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShardingCondition {
    pub values: Vec<ConditionValue>,
    /// Conflicting predicates: no row can match this group
    pub always_false: bool,
}

impl ShardingCondition {
    /// Values that apply to any of `tables` (a logic table and its binding
    /// partners), keyed by lower-cased column. Values of the same column are
    /// intersected; an empty intersection yields an empty list.
    pub fn column_values(&self, tables: &[&str]) -> ColumnValues {
        let mut result = ColumnValues::new();
        for value in &self.values {
            if !tables.iter().any(|t| t.eq_ignore_ascii_case(&value.table)) {
                continue;
            }
            let key = value.column.to_ascii_lowercase();
            let merged = match result.get(&key) {
                Some(existing) => existing
                    .intersect(&value.values)
                    .unwrap_or_else(|| ShardingValues::List(vec![])),
                None => value.values.clone(),
            };
            result.insert(key, merged);
        }
        result
    }
}

/// All sharding conditions of a statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShardingConditions {
    conditions: Vec<ShardingCondition>,
}

impl ShardingConditions {
    pub fn new(conditions: Vec<ShardingCondition>) -> Self {
        Self { conditions }
    }

    pub fn extract(
        ctx: &StatementContext<'_>,
        rule: &ShardingRule,
        schema: &SchemaMetaData,
    ) -> Result<Self, RouteError> {
        let statement = ctx.statement();
        let conditions = match &statement.insert {
            Some(_) => insert_conditions(ctx, rule, schema)?,
            None => statement
                .where_groups
                .iter()
                .map(|group| where_condition(ctx.query(), group, rule))
                .collect(),
        };
        Ok(Self { conditions })
    }

    pub fn conditions(&self) -> &[ShardingCondition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

fn where_condition(query: &QueryContext, group: &AndPredicate, rule: &ShardingRule) -> ShardingCondition {
    let mut condition = ShardingCondition::default();

    for predicate in &group.predicates {
        let is_sharding_column = rule
            .find_sharding_table(&predicate.table)
            .is_some_and(|t| t.is_sharding_column(&predicate.column));
        if !is_sharding_column {
            continue;
        }
        let Some(value) = predicate_value(query, predicate) else {
            continue;
        };

        let existing = condition
            .values
            .iter_mut()
            .find(|v| v.table.eq_ignore_ascii_case(&value.table) && v.column.eq_ignore_ascii_case(&value.column));
        match existing {
            Some(existing) => match existing.values.intersect(&value.values) {
                Some(merged) => {
                    existing.values = merged;
                    existing.parameter_markers.extend(value.parameter_markers);
                    existing.has_literal |= value.has_literal;
                }
                None => {
                    debug!(table = %value.table, column = %value.column, "Conflicting predicates, condition is always false");
                    condition.always_false = true;
                }
            },
            None => {
                if value.values.is_empty() {
                    condition.always_false = true;
                }
                condition.values.push(value);
            }
        }
    }

    condition
}

fn predicate_value(query: &QueryContext, predicate: &ColumnPredicate) -> Option<ConditionValue> {
    let mut resolved = Vec::with_capacity(predicate.values.len());
    let mut parameter_markers = Vec::new();
    let mut has_literal = false;

    for expr in &predicate.values {
        match expr {
            ExprValue::Parameter(idx) => parameter_markers.push(*idx),
            ExprValue::Literal(_) => has_literal = true,
        }
        match query.resolve(expr) {
            Some(value) => resolved.push(value),
            None => {
                debug!(column = %predicate.column, ?expr, "Unresolvable parameter marker, ignoring predicate");
                return None;
            }
        }
    }

    let single = |values: &[Value]| values.first().filter(|v| !v.is_null()).cloned();
    let values = match predicate.operator {
        Operator::Eq | Operator::In => {
            ShardingValues::List(resolved.into_iter().filter(|v| !v.is_null()).collect())
        }
        Operator::Between => match resolved.as_slice() {
            [lower, upper] if !lower.is_null() && !upper.is_null() => {
                ShardingValues::Range(ValueRange::closed(lower.clone(), upper.clone()))
            }
            _ => return None,
        },
        Operator::Lt => ShardingValues::Range(ValueRange::less_than(single(&resolved)?)),
        Operator::Le => ShardingValues::Range(ValueRange::at_most(single(&resolved)?)),
        Operator::Gt => ShardingValues::Range(ValueRange::greater_than(single(&resolved)?)),
        Operator::Ge => ShardingValues::Range(ValueRange::at_least(single(&resolved)?)),
    };

    Some(ConditionValue {
        table: predicate.table.clone(),
        column: predicate.column.clone(),
        values,
        parameter_markers,
        has_literal,
    })
}

fn insert_conditions(
    ctx: &StatementContext<'_>,
    rule: &ShardingRule,
    schema: &SchemaMetaData,
) -> Result<Vec<ShardingCondition>, RouteError> {
    let Some(insert) = &ctx.statement().insert else {
        return Ok(vec![]);
    };
    let Some(table) = rule.find_sharding_table(&insert.table) else {
        return Ok(vec![]);
    };

    let columns = ctx.insert_columns(schema);
    if columns.is_empty() {
        return Err(RouteError::UnsupportedShardingOperation(format!(
            "INSERT into sharding table `{}` must name its columns",
            insert.table
        )));
    }

    let generated = ctx
        .generated_keys()
        .filter(|keys| table.is_sharding_column(&keys.column));

    let mut conditions = Vec::with_capacity(insert.rows.len());
    for (row_index, row) in insert.rows.iter().enumerate() {
        let mut condition = ShardingCondition::default();

        for (column_index, column) in columns.iter().enumerate() {
            if !table.is_sharding_column(column) {
                continue;
            }
            let Some(segment) = row.values.get(column_index) else {
                continue;
            };
            let value = ctx.query().resolve(&segment.value).ok_or_else(|| {
                RouteError::UnsupportedShardingOperation(format!(
                    "INSERT row {row_index} references a missing parameter for `{column}`"
                ))
            })?;
            if value.is_null() {
                return Err(RouteError::UnsupportedShardingOperation(format!(
                    "sharding column `{column}` of INSERT cannot be null"
                )));
            }

            condition.values.push(ConditionValue {
                table: insert.table.clone(),
                column: column.to_string(),
                values: ShardingValues::List(vec![value]),
                parameter_markers: segment.value.parameter_index().into_iter().collect(),
                has_literal: matches!(segment.value, ExprValue::Literal(_)),
            });
        }

        if let Some(keys) = generated {
            if let Some(key) = keys.values.get(row_index) {
                condition.values.push(ConditionValue {
                    table: insert.table.clone(),
                    column: keys.column.clone(),
                    values: ShardingValues::List(vec![key.clone()]),
                    parameter_markers: vec![],
                    has_literal: false,
                });
            }
        }

        conditions.push(condition);
    }

    Ok(conditions)
}
