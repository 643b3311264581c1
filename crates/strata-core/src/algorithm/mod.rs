//! Sharding Algorithms
//!
//! An algorithm is a pure function from sharding values to the subset of
//! available target names (data sources or actual tables) they map to:
//!
//! ```text
//!   available targets ──┐
//!                       ├──► algorithm ──► candidate names ──► ∩ available ──► result
//!   sharding values  ───┘
//! ```
//!
//! Candidate names that are not available are dropped, never fabricated.
//!
//! Algorithms are grouped by the strategy kind that can drive them:
//!
//! - `StandardAlgorithm`: one column (`INLINE`, `MOD`, `HASH_MOD`,
//!   `BOUNDARY_RANGE`, `VOLUME_RANGE`)
//! - `ComplexAlgorithm`: several columns (`COMPLEX_INLINE`)
//! - `HintAlgorithm`: values supplied out of band (`HINT_INLINE`)
//!
//! Instances are built from `{ type, props }` configuration through the
//! `AlgorithmRegistry`.

mod inline;
mod modulo;
mod range;
mod registry;

pub use inline::{ComplexInlineAlgorithm, HintInlineAlgorithm, InlineAlgorithm};
pub use modulo::{HashModAlgorithm, ModAlgorithm};
pub use range::{BoundaryRangeAlgorithm, RangePartitions, VolumeRangeAlgorithm};
pub use registry::{AlgorithmFactory, AlgorithmRegistry, KeyGeneratorFactory};

use indexmap::IndexMap;
use strata_types::Value;
use tracing::trace;

use crate::error::{AlgorithmError, ConfigError};
use crate::expression::EvalLimits;
use crate::sharding_value::{ColumnValues, ShardingValues, ValueRange};

/// Algorithm properties as configured
pub type AlgorithmProps = IndexMap<String, serde_json::Value>;

/// Any configured algorithm, as produced by the registry
#[derive(Debug, Clone)]
pub enum ShardingAlgorithm {
    Standard(StandardAlgorithm),
    Complex(ComplexAlgorithm),
    Hint(HintAlgorithm),
}

impl ShardingAlgorithm {
    pub fn type_name(&self) -> &'static str {
        match self {
            ShardingAlgorithm::Standard(a) => a.type_name(),
            ShardingAlgorithm::Complex(a) => a.type_name(),
            ShardingAlgorithm::Hint(a) => a.type_name(),
        }
    }
}

/// Single-column algorithms
#[derive(Debug, Clone)]
pub enum StandardAlgorithm {
    Inline(InlineAlgorithm),
    Mod(ModAlgorithm),
    HashMod(HashModAlgorithm),
    BoundaryRange(BoundaryRangeAlgorithm),
    VolumeRange(VolumeRangeAlgorithm),
}

impl StandardAlgorithm {
    pub fn type_name(&self) -> &'static str {
        match self {
            StandardAlgorithm::Inline(_) => "INLINE",
            StandardAlgorithm::Mod(_) => "MOD",
            StandardAlgorithm::HashMod(_) => "HASH_MOD",
            StandardAlgorithm::BoundaryRange(_) => "BOUNDARY_RANGE",
            StandardAlgorithm::VolumeRange(_) => "VOLUME_RANGE",
        }
    }

    /// Route the values of `column` onto `targets`
    pub fn do_sharding(
        &self,
        targets: &[String],
        column: &str,
        values: &ShardingValues,
        limits: &EvalLimits,
    ) -> Result<Vec<String>, AlgorithmError> {
        let candidates = match values {
            ShardingValues::List(values) => {
                let mut candidates = Vec::new();
                for value in values {
                    candidates.extend(self.precise(targets, column, value, limits)?);
                }
                candidates
            }
            ShardingValues::Range(range) => self.range(targets, range)?,
        };
        Ok(retain_available(targets, &candidates))
    }

    fn precise(
        &self,
        targets: &[String],
        column: &str,
        value: &Value,
        limits: &EvalLimits,
    ) -> Result<Vec<String>, AlgorithmError> {
        match self {
            StandardAlgorithm::Inline(a) => a.precise(column, value, limits),
            StandardAlgorithm::Mod(a) => a.precise(targets, value),
            StandardAlgorithm::HashMod(a) => Ok(a.precise(targets, value)),
            StandardAlgorithm::BoundaryRange(a) => a.partitions().precise(targets, value),
            StandardAlgorithm::VolumeRange(a) => a.partitions().precise(targets, value),
        }
    }

    fn range(&self, targets: &[String], range: &ValueRange) -> Result<Vec<String>, AlgorithmError> {
        match self {
            StandardAlgorithm::Inline(a) => a.range(targets),
            StandardAlgorithm::Mod(a) => Ok(a.range(targets, range)),
            StandardAlgorithm::HashMod(_) => Ok(targets.to_vec()),
            StandardAlgorithm::BoundaryRange(a) => Ok(a.partitions().range(targets, range)),
            StandardAlgorithm::VolumeRange(a) => Ok(a.partitions().range(targets, range)),
        }
    }
}

/// Multi-column algorithms
#[derive(Debug, Clone)]
pub enum ComplexAlgorithm {
    Inline(ComplexInlineAlgorithm),
}

impl ComplexAlgorithm {
    pub fn type_name(&self) -> &'static str {
        match self {
            ComplexAlgorithm::Inline(_) => "COMPLEX_INLINE",
        }
    }

    pub fn do_sharding(
        &self,
        targets: &[String],
        values: &ColumnValues,
        limits: &EvalLimits,
    ) -> Result<Vec<String>, AlgorithmError> {
        let candidates = match self {
            ComplexAlgorithm::Inline(a) => a.evaluate(targets, values, limits)?,
        };
        Ok(retain_available(targets, &candidates))
    }
}

/// Hint-driven algorithms
#[derive(Debug, Clone)]
pub enum HintAlgorithm {
    Inline(HintInlineAlgorithm),
}

impl HintAlgorithm {
    pub fn type_name(&self) -> &'static str {
        match self {
            HintAlgorithm::Inline(_) => "HINT_INLINE",
        }
    }

    pub fn do_sharding(
        &self,
        targets: &[String],
        hints: &[Value],
        limits: &EvalLimits,
    ) -> Result<Vec<String>, AlgorithmError> {
        let candidates = match self {
            HintAlgorithm::Inline(a) => a.evaluate(hints, limits)?,
        };
        Ok(retain_available(targets, &candidates))
    }
}

/// Keep the targets named by `candidates`, in target order. Candidate names
/// that are not available are dropped.
pub fn retain_available(targets: &[String], candidates: &[String]) -> Vec<String> {
    for candidate in candidates {
        if !targets.iter().any(|t| t.eq_ignore_ascii_case(candidate)) {
            trace!(target_name = %candidate, "Dropping unavailable sharding target");
        }
    }

    targets
        .iter()
        .filter(|t| candidates.iter().any(|c| c.eq_ignore_ascii_case(t)))
        .cloned()
        .collect()
}

/// Target whose trailing digits equal `index`, e.g. `t_order_3` for 3
pub(crate) fn target_with_index(targets: &[String], index: u64) -> Option<&String> {
    targets.iter().find(|t| numeric_suffix(t) == Some(index))
}

fn numeric_suffix(name: &str) -> Option<u64> {
    let digits = name.len() - name.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }
    name[name.len() - digits..].parse().ok()
}

/// Typed access to algorithm properties
pub(crate) struct PropReader<'a> {
    algorithm: &'a str,
    props: &'a AlgorithmProps,
}

impl<'a> PropReader<'a> {
    pub(crate) fn new(algorithm: &'a str, props: &'a AlgorithmProps) -> Self {
        Self { algorithm, props }
    }

    pub(crate) fn invalid(&self, property: &str, reason: impl Into<String>) -> ConfigError {
        ConfigError::InvalidAlgorithmProperty {
            algorithm: self.algorithm.to_string(),
            property: property.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn optional_string(&self, key: &str) -> Option<String> {
        match self.props.get(key)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    pub(crate) fn string(&self, key: &str) -> Result<String, ConfigError> {
        self.optional_string(key)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| self.invalid(key, "required property is missing"))
    }

    pub(crate) fn i64(&self, key: &str) -> Result<i64, ConfigError> {
        let raw = self.string(key)?;
        raw.trim().parse().map_err(|_| self.invalid(key, format!("`{raw}` is not an integer")))
    }

    pub(crate) fn positive(&self, key: &str) -> Result<u64, ConfigError> {
        let value = self.i64(key)?;
        u64::try_from(value)
            .ok()
            .filter(|v| *v > 0)
            .ok_or_else(|| self.invalid(key, "must be a positive integer"))
    }

    pub(crate) fn bool_or(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.optional_string(key) {
            None => Ok(default),
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| self.invalid(key, format!("`{raw}` is not a boolean"))),
        }
    }
}
