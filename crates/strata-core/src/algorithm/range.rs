//! Range partition algorithms (`BOUNDARY_RANGE`, `VOLUME_RANGE`)
//!
//! Both reduce to an ascending boundary list. With boundaries `[10, 20]`
//! the partitions are:
//!
//! ```text
//!   index 0: (-inf, 10)   index 1: [10, 20)   index 2: [20, +inf)
//! ```
//!
//! and partition `i` maps to the target whose numeric suffix is `i`.

use strata_types::Value;

use super::{target_with_index, AlgorithmProps, PropReader};
use crate::error::{AlgorithmError, ConfigError};
use crate::sharding_value::ValueRange;

const SHARDING_RANGES: &str = "sharding-ranges";
const RANGE_LOWER: &str = "range-lower";
const RANGE_UPPER: &str = "range-upper";
const SHARDING_VOLUME: &str = "sharding-volume";

/// Ascending partition boundaries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangePartitions {
    boundaries: Vec<i64>,
}

impl RangePartitions {
    pub fn partition_count(&self) -> usize {
        self.boundaries.len() + 1
    }

    pub fn partition_of(&self, value: i64) -> usize {
        self.boundaries.partition_point(|b| *b <= value)
    }

    pub(super) fn precise(&self, targets: &[String], value: &Value) -> Result<Vec<String>, AlgorithmError> {
        let number = value.as_i64().ok_or_else(|| {
            AlgorithmError::Evaluation(format!("range partitioning requires an integer value, got `{value}`"))
        })?;
        let index = self.partition_of(number) as u64;
        Ok(target_with_index(targets, index).cloned().into_iter().collect())
    }

    pub(super) fn range(&self, targets: &[String], range: &ValueRange) -> Vec<String> {
        let (lower, upper) = range.integer_bounds();
        let first = lower.map_or(0, |v| self.partition_of(v));
        let last = upper.map_or(self.partition_count() - 1, |v| self.partition_of(v));
        if last < first {
            return Vec::new();
        }
        (first..=last)
            .filter_map(|i| target_with_index(targets, i as u64).cloned())
            .collect()
    }
}

/// Explicit boundaries, `sharding-ranges: "10,20,30"`
#[derive(Debug, Clone)]
pub struct BoundaryRangeAlgorithm {
    partitions: RangePartitions,
}

impl BoundaryRangeAlgorithm {
    pub fn from_props(props: &AlgorithmProps) -> Result<Self, ConfigError> {
        let reader = PropReader::new("BOUNDARY_RANGE", props);
        let raw = reader.string(SHARDING_RANGES)?;

        let mut boundaries = Vec::new();
        for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let boundary: i64 = item
                .parse()
                .map_err(|_| reader.invalid(SHARDING_RANGES, format!("`{item}` is not an integer")))?;
            if boundaries.last().is_some_and(|last| *last >= boundary) {
                return Err(reader.invalid(SHARDING_RANGES, "boundaries must be strictly ascending"));
            }
            boundaries.push(boundary);
        }

        Ok(Self { partitions: RangePartitions { boundaries } })
    }

    pub fn partitions(&self) -> &RangePartitions {
        &self.partitions
    }
}

/// Equal-width partitions between `range-lower` and `range-upper`
#[derive(Debug, Clone)]
pub struct VolumeRangeAlgorithm {
    partitions: RangePartitions,
}

impl VolumeRangeAlgorithm {
    pub fn from_props(props: &AlgorithmProps) -> Result<Self, ConfigError> {
        let reader = PropReader::new("VOLUME_RANGE", props);
        let lower = reader.i64(RANGE_LOWER)?;
        let upper = reader.i64(RANGE_UPPER)?;
        let volume = i64::try_from(reader.positive(SHARDING_VOLUME)?)
            .map_err(|_| reader.invalid(SHARDING_VOLUME, "out of range"))?;
        if upper <= lower {
            return Err(reader.invalid(RANGE_UPPER, "must be greater than range-lower"));
        }

        let mut boundaries = Vec::new();
        let mut boundary = lower;
        while boundary < upper {
            boundaries.push(boundary);
            boundary = match boundary.checked_add(volume) {
                Some(next) => next,
                None => break,
            };
        }
        boundaries.push(upper);

        Ok(Self { partitions: RangePartitions { boundaries } })
    }

    pub fn partitions(&self) -> &RangePartitions {
        &self.partitions
    }
}
