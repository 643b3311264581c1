//! Modulo algorithms (`MOD`, `HASH_MOD`)

use strata_types::Value;

use super::{target_with_index, AlgorithmProps, PropReader};
use crate::error::{AlgorithmError, ConfigError};
use crate::sharding_value::ValueRange;

const SHARDING_COUNT: &str = "sharding-count";

/// `value % sharding-count`, matched against the target's numeric suffix
#[derive(Debug, Clone)]
pub struct ModAlgorithm {
    count: u64,
}

impl ModAlgorithm {
    pub fn from_props(props: &AlgorithmProps) -> Result<Self, ConfigError> {
        let reader = PropReader::new("MOD", props);
        Ok(Self { count: reader.positive(SHARDING_COUNT)? })
    }

    pub fn sharding_count(&self) -> u64 {
        self.count
    }

    fn index_of(&self, value: i64) -> u64 {
        // count fits in i64: it was parsed from a positive i64
        value.rem_euclid(self.count as i64) as u64
    }

    pub(super) fn precise(&self, targets: &[String], value: &Value) -> Result<Vec<String>, AlgorithmError> {
        let number = value
            .as_i64()
            .ok_or_else(|| AlgorithmError::Evaluation(format!("MOD requires an integer sharding value, got `{value}`")))?;
        Ok(target_with_index(targets, self.index_of(number)).cloned().into_iter().collect())
    }

    /// A closed integer range shorter than the modulus hits only the
    /// residues it covers; anything else hits every target
    pub(super) fn range(&self, targets: &[String], range: &ValueRange) -> Vec<String> {
        let (Some(lower), Some(upper)) = range.integer_bounds() else {
            return targets.to_vec();
        };
        if upper < lower {
            return Vec::new();
        }
        if upper.abs_diff(lower) >= self.count - 1 {
            return targets.to_vec();
        }

        (lower..=upper)
            .filter_map(|v| target_with_index(targets, self.index_of(v)).cloned())
            .collect()
    }
}

/// Stable hash of the value, then modulo
#[derive(Debug, Clone)]
pub struct HashModAlgorithm {
    count: u64,
}

impl HashModAlgorithm {
    pub fn from_props(props: &AlgorithmProps) -> Result<Self, ConfigError> {
        let reader = PropReader::new("HASH_MOD", props);
        Ok(Self { count: reader.positive(SHARDING_COUNT)? })
    }

    /// Index in `[0, count)`. Integral values hash the same whether bound as
    /// integer, float or text.
    pub fn index_of(&self, value: &Value) -> u64 {
        let canonical = match value.as_i64() {
            Some(v) => v.to_string(),
            None => value.to_string(),
        };
        let hash = blake3::hash(canonical.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(prefix) % self.count
    }

    pub(super) fn precise(&self, targets: &[String], value: &Value) -> Vec<String> {
        target_with_index(targets, self.index_of(value)).cloned().into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::StandardAlgorithm;
    use crate::expression::EvalLimits;
    use crate::sharding_value::ShardingValues;

    fn mod_algorithm(count: u64) -> ModAlgorithm {
        let props: AlgorithmProps = serde_json::from_str(&format!(r#"{{"sharding-count": {count}}}"#)).unwrap();
        ModAlgorithm::from_props(&props).unwrap()
    }

    fn targets(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("t_{i}")).collect()
    }

    #[test]
    fn test_mod_precise() {
        let algorithm = mod_algorithm(4);
        assert_eq!(algorithm.precise(&targets(4), &Value::Int(7)).unwrap(), vec!["t_3"]);
        assert_eq!(algorithm.precise(&targets(4), &Value::Text("8".into())).unwrap(), vec!["t_0"]);
        assert_eq!(algorithm.precise(&targets(4), &Value::Int(-1)).unwrap(), vec!["t_3"]);
        assert!(algorithm.precise(&targets(4), &Value::Text("abc".into())).is_err());
    }

    #[test]
    fn test_mod_range() {
        let algorithm = StandardAlgorithm::Mod(mod_algorithm(4));
        let narrow = ShardingValues::Range(ValueRange::closed(Value::Int(5), Value::Int(6)));
        assert_eq!(
            algorithm.do_sharding(&targets(4), "id", &narrow, &EvalLimits::default()).unwrap(),
            vec!["t_1", "t_2"]
        );

        let wide = ShardingValues::Range(ValueRange::closed(Value::Int(0), Value::Int(100)));
        assert_eq!(algorithm.do_sharding(&targets(4), "id", &wide, &EvalLimits::default()).unwrap(), targets(4));

        let open = ShardingValues::Range(ValueRange::at_least(Value::Int(3)));
        assert_eq!(algorithm.do_sharding(&targets(4), "id", &open, &EvalLimits::default()).unwrap(), targets(4));
    }

    #[test]
    fn test_mod_requires_positive_count() {
        let props: AlgorithmProps = serde_json::from_str(r#"{"sharding-count": 0}"#).unwrap();
        assert!(ModAlgorithm::from_props(&props).is_err());
    }

    #[test]
    fn test_hash_mod_is_stable() {
        let props: AlgorithmProps = serde_json::from_str(r#"{"sharding-count": "8"}"#).unwrap();
        let algorithm = HashModAlgorithm::from_props(&props).unwrap();

        let a = algorithm.index_of(&Value::Int(42));
        assert_eq!(a, algorithm.index_of(&Value::Text("42".into())));
        assert_eq!(a, algorithm.index_of(&Value::Float(42.0)));
        assert!(a < 8);
        assert_eq!(algorithm.precise(&targets(8), &Value::Int(42)), vec![format!("t_{a}")]);
    }
}
