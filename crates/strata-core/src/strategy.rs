//! Sharding strategies
//!
//! A strategy names the sharding column(s) of a table and owns the algorithm
//! that maps their values onto targets. When a strategy receives no usable
//! value it routes to every target.

use indexmap::IndexMap;
use strata_types::Value;
use tracing::trace;

use crate::algorithm::{ComplexAlgorithm, HintAlgorithm, ShardingAlgorithm, StandardAlgorithm};
use crate::error::{AlgorithmError, ConfigError};
use crate::expression::EvalLimits;
use crate::rule_config::StrategyConfiguration;
use crate::sharding_value::ColumnValues;

#[derive(Debug, Clone)]
pub enum ShardingStrategy {
    /// One sharding column
    Standard { column: String, algorithm: StandardAlgorithm },
    /// Several sharding columns evaluated together
    Complex { columns: Vec<String>, algorithm: ComplexAlgorithm },
    /// Values supplied by the caller instead of the SQL
    Hint { algorithm: HintAlgorithm },
    None,
}

impl ShardingStrategy {
    /// Build a strategy, resolving its algorithm by name
    pub fn build(
        config: &StrategyConfiguration,
        algorithms: &IndexMap<String, ShardingAlgorithm>,
    ) -> Result<Self, ConfigError> {
        let lookup = |name: &str| {
            algorithms
                .get(name)
                .ok_or_else(|| ConfigError::MissingAlgorithm(name.to_string()))
        };
        let mismatch = |name: &str, strategy: &'static str| ConfigError::AlgorithmKindMismatch {
            algorithm: name.to_string(),
            strategy,
        };

        match config {
            StrategyConfiguration::Standard { sharding_column, sharding_algorithm_name } => {
                match lookup(sharding_algorithm_name)? {
                    ShardingAlgorithm::Standard(algorithm) => Ok(ShardingStrategy::Standard {
                        column: sharding_column.trim().to_string(),
                        algorithm: algorithm.clone(),
                    }),
                    _ => Err(mismatch(sharding_algorithm_name, "standard")),
                }
            }
            StrategyConfiguration::Complex { sharding_columns, sharding_algorithm_name } => {
                match lookup(sharding_algorithm_name)? {
                    ShardingAlgorithm::Complex(algorithm) => Ok(ShardingStrategy::Complex {
                        columns: sharding_columns
                            .split(',')
                            .map(|c| c.trim().to_string())
                            .filter(|c| !c.is_empty())
                            .collect(),
                        algorithm: algorithm.clone(),
                    }),
                    _ => Err(mismatch(sharding_algorithm_name, "complex")),
                }
            }
            StrategyConfiguration::Hint { sharding_algorithm_name } => match lookup(sharding_algorithm_name)? {
                ShardingAlgorithm::Hint(algorithm) => Ok(ShardingStrategy::Hint { algorithm: algorithm.clone() }),
                _ => Err(mismatch(sharding_algorithm_name, "hint")),
            },
            StrategyConfiguration::None => Ok(ShardingStrategy::None),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            ShardingStrategy::Standard { .. } => "standard",
            ShardingStrategy::Complex { .. } => "complex",
            ShardingStrategy::Hint { .. } => "hint",
            ShardingStrategy::None => "none",
        }
    }

    pub fn sharding_columns(&self) -> Vec<&str> {
        match self {
            ShardingStrategy::Standard { column, .. } => vec![column.as_str()],
            ShardingStrategy::Complex { columns, .. } => columns.iter().map(String::as_str).collect(),
            ShardingStrategy::Hint { .. } | ShardingStrategy::None => vec![],
        }
    }

    pub fn is_hint(&self) -> bool {
        matches!(self, ShardingStrategy::Hint { .. })
    }

    /// Route onto `targets`. `values` holds conditions keyed by lower-cased
    /// column; `hints` is only consulted by hint strategies.
    pub fn do_sharding(
        &self,
        targets: &[String],
        values: &ColumnValues,
        hints: &[Value],
        limits: &EvalLimits,
    ) -> Result<Vec<String>, AlgorithmError> {
        match self {
            ShardingStrategy::None => Ok(targets.to_vec()),
            ShardingStrategy::Standard { column, algorithm } => {
                match values.get(&column.to_ascii_lowercase()) {
                    Some(column_values) => algorithm.do_sharding(targets, column, column_values, limits),
                    None => {
                        trace!(column = %column, "No condition on sharding column, routing to all targets");
                        Ok(targets.to_vec())
                    }
                }
            }
            ShardingStrategy::Complex { columns, algorithm } => {
                if columns.iter().any(|c| values.contains_key(&c.to_ascii_lowercase())) {
                    algorithm.do_sharding(targets, values, limits)
                } else {
                    Ok(targets.to_vec())
                }
            }
            ShardingStrategy::Hint { algorithm } => {
                if hints.is_empty() {
                    Ok(targets.to_vec())
                } else {
                    algorithm.do_sharding(targets, hints, limits)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::AlgorithmRegistry;
    use crate::rule_config::AlgorithmConfiguration;
    use crate::sharding_value::ShardingValues;

    fn algorithms() -> IndexMap<String, ShardingAlgorithm> {
        let registry = AlgorithmRegistry::new();
        let mut algorithms = IndexMap::new();
        algorithms.insert(
            "t_inline".to_string(),
            registry
                .create_algorithm(
                    &AlgorithmConfiguration::new("INLINE").with_prop("algorithm-expression", "t_${id % 2}"),
                )
                .unwrap(),
        );
        algorithms.insert(
            "hint".to_string(),
            registry.create_algorithm(&AlgorithmConfiguration::new("HINT_INLINE")).unwrap(),
        );
        algorithms
    }

    fn targets() -> Vec<String> {
        vec!["t_0".to_string(), "t_1".to_string()]
    }

    #[test]
    fn test_standard_strategy() {
        let strategy = ShardingStrategy::build(
            &StrategyConfiguration::Standard {
                sharding_column: "ID".into(),
                sharding_algorithm_name: "t_inline".into(),
            },
            &algorithms(),
        )
        .unwrap();
        assert_eq!(strategy.sharding_columns(), vec!["ID"]);

        let mut values = ColumnValues::new();
        assert_eq!(strategy.do_sharding(&targets(), &values, &[], &EvalLimits::default()).unwrap(), targets());

        values.insert("id".into(), ShardingValues::List(vec![Value::Int(3)]));
        assert_eq!(strategy.do_sharding(&targets(), &values, &[], &EvalLimits::default()).unwrap(), vec!["t_1"]);
    }

    #[test]
    fn test_hint_strategy() {
        let strategy = ShardingStrategy::build(
            &StrategyConfiguration::Hint { sharding_algorithm_name: "hint".into() },
            &algorithms(),
        )
        .unwrap();
        assert!(strategy.is_hint());

        let values = ColumnValues::new();
        let hints = [Value::Text("t_0".into())];
        assert_eq!(strategy.do_sharding(&targets(), &values, &hints, &EvalLimits::default()).unwrap(), vec!["t_0"]);
        assert_eq!(strategy.do_sharding(&targets(), &values, &[], &EvalLimits::default()).unwrap(), targets());
    }

    #[test]
    fn test_build_errors() {
        let missing = ShardingStrategy::build(
            &StrategyConfiguration::Hint { sharding_algorithm_name: "nope".into() },
            &algorithms(),
        );
        assert!(matches!(missing, Err(ConfigError::MissingAlgorithm(name)) if name == "nope"));

        let mismatch = ShardingStrategy::build(
            &StrategyConfiguration::Standard {
                sharding_column: "id".into(),
                sharding_algorithm_name: "hint".into(),
            },
            &algorithms(),
        );
        assert!(matches!(mismatch, Err(ConfigError::AlgorithmKindMismatch { strategy: "standard", .. })));
    }
}
