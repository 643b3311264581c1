//! Inline expression algorithms (`INLINE`, `COMPLEX_INLINE`, `HINT_INLINE`)

use strata_types::Value;
use tracing::trace;

use super::{AlgorithmProps, PropReader};
use crate::error::{AlgorithmError, ConfigError};
use crate::expression::{EvalLimits, InlineExpression};
use crate::sharding_value::{ColumnValues, ShardingValues};

const ALGORITHM_EXPRESSION: &str = "algorithm-expression";
const ALLOW_RANGE_QUERY: &str = "allow-range-query-with-inline-sharding";
const SHARDING_COLUMNS: &str = "sharding-columns";
const DEFAULT_HINT_EXPRESSION: &str = "${value}";

/// `t_order_${order_id % 4}`
#[derive(Debug, Clone)]
pub struct InlineAlgorithm {
    expression: InlineExpression,
    allow_range: bool,
}

impl InlineAlgorithm {
    pub fn from_props(props: &AlgorithmProps) -> Result<Self, ConfigError> {
        let reader = PropReader::new("INLINE", props);
        Ok(Self {
            expression: InlineExpression::parse(&reader.string(ALGORITHM_EXPRESSION)?)?,
            allow_range: reader.bool_or(ALLOW_RANGE_QUERY, false)?,
        })
    }

    pub fn expression(&self) -> &InlineExpression {
        &self.expression
    }

    pub(super) fn precise(
        &self,
        column: &str,
        value: &Value,
        limits: &EvalLimits,
    ) -> Result<Vec<String>, AlgorithmError> {
        trace!(column = %column, value = %value, expression = %self.expression, "Evaluating inline algorithm");
        self.expression.evaluate(&[(column, value)], limits)
    }

    /// An expression cannot be inverted over a range: either every target
    /// qualifies or the query is rejected
    pub(super) fn range(&self, targets: &[String]) -> Result<Vec<String>, AlgorithmError> {
        if self.allow_range {
            Ok(targets.to_vec())
        } else {
            Err(AlgorithmError::UnsupportedRange(format!("INLINE `{}`", self.expression)))
        }
    }
}

/// Inline expression over several columns, e.g.
/// `t_order_${user_id % 2}_${order_id % 2}`
#[derive(Debug, Clone)]
pub struct ComplexInlineAlgorithm {
    expression: InlineExpression,
    columns: Vec<String>,
    allow_range: bool,
}

impl ComplexInlineAlgorithm {
    pub fn from_props(props: &AlgorithmProps) -> Result<Self, ConfigError> {
        let reader = PropReader::new("COMPLEX_INLINE", props);
        let expression = InlineExpression::parse(&reader.string(ALGORITHM_EXPRESSION)?)?;
        let columns = match reader.optional_string(SHARDING_COLUMNS) {
            Some(columns) => columns
                .split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
            None => expression.variables().into_iter().map(str::to_string).collect(),
        };

        Ok(Self { expression, columns, allow_range: reader.bool_or(ALLOW_RANGE_QUERY, false)? })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub(super) fn evaluate(
        &self,
        targets: &[String],
        values: &ColumnValues,
        limits: &EvalLimits,
    ) -> Result<Vec<String>, AlgorithmError> {
        let mut lists: Vec<(&str, &[Value])> = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            match values.get(&column.to_ascii_lowercase()) {
                // partial conditions cannot narrow a multi-column expression
                None => {
                    trace!(column = %column, "Complex inline column has no condition, routing to all targets");
                    return Ok(targets.to_vec());
                }
                Some(ShardingValues::Range(_)) if self.allow_range => return Ok(targets.to_vec()),
                Some(ShardingValues::Range(_)) => {
                    return Err(AlgorithmError::UnsupportedRange(format!(
                        "COMPLEX_INLINE `{}`",
                        self.expression
                    )));
                }
                Some(ShardingValues::List(list)) => lists.push((column.as_str(), list.as_slice())),
            }
        }

        let combinations = lists.iter().map(|(_, l)| l.len()).fold(1usize, usize::saturating_mul);
        if combinations > limits.max_expansion {
            return Err(AlgorithmError::Evaluation(format!(
                "{combinations} value combinations exceed the limit of {}",
                limits.max_expansion
            )));
        }

        let mut bindings: Vec<Vec<(&str, &Value)>> = vec![Vec::new()];
        for (column, list) in &lists {
            bindings = bindings
                .iter()
                .flat_map(|prefix| {
                    list.iter().map(move |value| {
                        let mut next = prefix.clone();
                        next.push((*column, value));
                        next
                    })
                })
                .collect();
        }

        let mut candidates = Vec::new();
        for binding in &bindings {
            candidates.extend(self.expression.evaluate(binding, limits)?);
        }
        Ok(candidates)
    }
}

/// Inline expression over hint values, bound to the variable `value`
#[derive(Debug, Clone)]
pub struct HintInlineAlgorithm {
    expression: InlineExpression,
}

impl HintInlineAlgorithm {
    pub fn from_props(props: &AlgorithmProps) -> Result<Self, ConfigError> {
        let reader = PropReader::new("HINT_INLINE", props);
        let source = reader
            .optional_string(ALGORITHM_EXPRESSION)
            .unwrap_or_else(|| DEFAULT_HINT_EXPRESSION.to_string());
        Ok(Self { expression: InlineExpression::parse(&source)? })
    }

    pub(super) fn evaluate(&self, hints: &[Value], limits: &EvalLimits) -> Result<Vec<String>, AlgorithmError> {
        let mut candidates = Vec::new();
        for hint in hints {
            candidates.extend(self.expression.evaluate(&[("value", hint)], limits)?);
        }
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::StandardAlgorithm;
    use crate::sharding_value::ValueRange;

    fn props(json: &str) -> AlgorithmProps {
        serde_json::from_str(json).unwrap()
    }

    fn targets(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("t_order_{i}")).collect()
    }

    #[test]
    fn test_inline_all_four_targets() {
        let algorithm = StandardAlgorithm::Inline(
            InlineAlgorithm::from_props(&props(r#"{"algorithm-expression": "t_order_$->{order_id % 4}"}"#)).unwrap(),
        );
        let values = ShardingValues::List((0..4).map(Value::Int).collect());

        let all = algorithm.do_sharding(&targets(4), "order_id", &values, &EvalLimits::default()).unwrap();
        assert_eq!(all, targets(4));

        let partial = algorithm.do_sharding(&targets(2), "order_id", &values, &EvalLimits::default()).unwrap();
        assert_eq!(partial, vec!["t_order_0", "t_order_1"]);
    }

    #[test]
    fn test_inline_range_requires_opt_in() {
        let strict = StandardAlgorithm::Inline(
            InlineAlgorithm::from_props(&props(r#"{"algorithm-expression": "t_order_${id % 2}"}"#)).unwrap(),
        );
        let range = ShardingValues::Range(ValueRange::closed(Value::Int(1), Value::Int(9)));
        assert!(matches!(
            strict.do_sharding(&targets(2), "id", &range, &EvalLimits::default()),
            Err(AlgorithmError::UnsupportedRange(_))
        ));

        let lenient = StandardAlgorithm::Inline(
            InlineAlgorithm::from_props(&props(
                r#"{"algorithm-expression": "t_order_${id % 2}", "allow-range-query-with-inline-sharding": true}"#,
            ))
            .unwrap(),
        );
        assert_eq!(lenient.do_sharding(&targets(2), "id", &range, &EvalLimits::default()).unwrap(), targets(2));
    }

    #[test]
    fn test_inline_missing_expression() {
        assert!(matches!(
            InlineAlgorithm::from_props(&props("{}")),
            Err(ConfigError::InvalidAlgorithmProperty { .. })
        ));
        assert!(matches!(
            InlineAlgorithm::from_props(&props(r#"{"algorithm-expression": "t_${id.hash()}"}"#)),
            Err(ConfigError::MalformedInlineExpression { .. })
        ));
    }

    #[test]
    fn test_complex_inline_cartesian() {
        let algorithm = ComplexInlineAlgorithm::from_props(&props(
            r#"{"algorithm-expression": "t_${user_id % 2}_${order_id % 2}"}"#,
        ))
        .unwrap();
        assert_eq!(algorithm.columns(), ["user_id", "order_id"]);

        let available: Vec<String> = ["t_0_0", "t_0_1", "t_1_0", "t_1_1"].iter().map(|s| s.to_string()).collect();
        let mut values = ColumnValues::new();
        values.insert("user_id".into(), ShardingValues::List(vec![Value::Int(1)]));
        values.insert("order_id".into(), ShardingValues::List(vec![Value::Int(2), Value::Int(3)]));

        let result = algorithm.evaluate(&available, &values, &EvalLimits::default()).unwrap();
        assert_eq!(result, vec!["t_1_0", "t_1_1"]);

        values.shift_remove("order_id");
        let result = algorithm.evaluate(&available, &values, &EvalLimits::default()).unwrap();
        assert_eq!(result, available);
    }

    #[test]
    fn test_hint_inline_default_expression() {
        let algorithm = HintInlineAlgorithm::from_props(&props("{}")).unwrap();
        let result = algorithm
            .evaluate(&[Value::Text("ds_1".into())], &EvalLimits::default())
            .unwrap();
        assert_eq!(result, vec!["ds_1"]);
    }
}
