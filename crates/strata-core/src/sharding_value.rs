//! Sharding values handed from condition extraction to algorithms

use std::cmp::Ordering;
use std::ops::Bound;

use indexmap::IndexMap;
use strata_types::Value;

/// A range of values, each bound inclusive, exclusive or open
#[derive(Debug, Clone, PartialEq)]
pub struct ValueRange {
    pub lower: Bound<Value>,
    pub upper: Bound<Value>,
}

impl ValueRange {
    pub fn unbounded() -> Self {
        Self { lower: Bound::Unbounded, upper: Bound::Unbounded }
    }

    /// `BETWEEN lower AND upper`
    pub fn closed(lower: Value, upper: Value) -> Self {
        Self { lower: Bound::Included(lower), upper: Bound::Included(upper) }
    }

    pub fn at_least(value: Value) -> Self {
        Self { lower: Bound::Included(value), upper: Bound::Unbounded }
    }

    pub fn greater_than(value: Value) -> Self {
        Self { lower: Bound::Excluded(value), upper: Bound::Unbounded }
    }

    pub fn at_most(value: Value) -> Self {
        Self { lower: Bound::Unbounded, upper: Bound::Included(value) }
    }

    pub fn less_than(value: Value) -> Self {
        Self { lower: Bound::Unbounded, upper: Bound::Excluded(value) }
    }

    pub fn contains(&self, value: &Value) -> bool {
        let above = match &self.lower {
            Bound::Unbounded => true,
            Bound::Included(l) => matches!(value.compare(l), Some(Ordering::Greater | Ordering::Equal)),
            Bound::Excluded(l) => matches!(value.compare(l), Some(Ordering::Greater)),
        };
        let below = match &self.upper {
            Bound::Unbounded => true,
            Bound::Included(u) => matches!(value.compare(u), Some(Ordering::Less | Ordering::Equal)),
            Bound::Excluded(u) => matches!(value.compare(u), Some(Ordering::Less)),
        };
        above && below
    }

    /// True when no value can satisfy the range
    pub fn is_empty(&self) -> bool {
        let (l, l_inclusive, u, u_inclusive) = match (&self.lower, &self.upper) {
            (Bound::Included(l), Bound::Included(u)) => (l, true, u, true),
            (Bound::Included(l), Bound::Excluded(u)) => (l, true, u, false),
            (Bound::Excluded(l), Bound::Included(u)) => (l, false, u, true),
            (Bound::Excluded(l), Bound::Excluded(u)) => (l, false, u, false),
            _ => return false,
        };
        match l.compare(u) {
            Some(Ordering::Greater) => true,
            Some(Ordering::Equal) => !(l_inclusive && u_inclusive),
            _ => false,
        }
    }

    /// Intersection of two ranges; `None` when it is empty
    pub fn intersect(&self, other: &ValueRange) -> Option<ValueRange> {
        let range = ValueRange {
            lower: tighter(&self.lower, &other.lower, Ordering::Greater),
            upper: tighter(&self.upper, &other.upper, Ordering::Less),
        };
        (!range.is_empty()).then_some(range)
    }

    /// Lower and upper bounds as integers, `None` for open or non-integral
    /// bounds. Exclusive bounds are tightened by one.
    pub fn integer_bounds(&self) -> (Option<i64>, Option<i64>) {
        let lower = match &self.lower {
            Bound::Included(v) => v.as_i64(),
            Bound::Excluded(v) => v.as_i64().and_then(|v| v.checked_add(1)),
            Bound::Unbounded => None,
        };
        let upper = match &self.upper {
            Bound::Included(v) => v.as_i64(),
            Bound::Excluded(v) => v.as_i64().and_then(|v| v.checked_sub(1)),
            Bound::Unbounded => None,
        };
        (lower, upper)
    }
}

/// Pick the more restrictive of two bounds. `prefer` is the ordering that
/// makes the left bound tighter (greater for lower bounds, less for upper).
fn tighter(a: &Bound<Value>, b: &Bound<Value>, prefer: Ordering) -> Bound<Value> {
    match (a, b) {
        (Bound::Unbounded, other) | (other, Bound::Unbounded) => other.clone(),
        (Bound::Included(x) | Bound::Excluded(x), Bound::Included(y) | Bound::Excluded(y)) => {
            match x.compare(y) {
                Some(ord) if ord == prefer => a.clone(),
                Some(Ordering::Equal) => {
                    if matches!(a, Bound::Excluded(_)) { a.clone() } else { b.clone() }
                }
                Some(_) => b.clone(),
                // incomparable values: keep the left bound
                None => a.clone(),
            }
        }
    }
}

/// Values of one sharding column
#[derive(Debug, Clone, PartialEq)]
pub enum ShardingValues {
    /// Discrete values from `=`, `IN` or INSERT rows
    List(Vec<Value>),
    Range(ValueRange),
}

impl ShardingValues {
    pub fn is_empty(&self) -> bool {
        match self {
            ShardingValues::List(values) => values.is_empty(),
            ShardingValues::Range(range) => range.is_empty(),
        }
    }

    /// Intersect two conditions on the same column; `None` when nothing can
    /// satisfy both
    pub fn intersect(&self, other: &ShardingValues) -> Option<ShardingValues> {
        let result = match (self, other) {
            (ShardingValues::List(a), ShardingValues::List(b)) => {
                ShardingValues::List(a.iter().filter(|v| b.contains(v)).cloned().collect())
            }
            (ShardingValues::List(list), ShardingValues::Range(range))
            | (ShardingValues::Range(range), ShardingValues::List(list)) => {
                ShardingValues::List(list.iter().filter(|v| range.contains(v)).cloned().collect())
            }
            (ShardingValues::Range(a), ShardingValues::Range(b)) => ShardingValues::Range(a.intersect(b)?),
        };
        (!result.is_empty()).then_some(result)
    }
}

/// Sharding values keyed by lower-cased column name
pub type ColumnValues = IndexMap<String, ShardingValues>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_contains() {
        let range = ValueRange::closed(Value::Int(10), Value::Int(20));
        assert!(range.contains(&Value::Int(10)));
        assert!(range.contains(&Value::Int(20)));
        assert!(!range.contains(&Value::Int(21)));
        assert!(ValueRange::greater_than(Value::Int(5)).contains(&Value::Float(5.5)));
        assert!(!ValueRange::less_than(Value::Int(5)).contains(&Value::Int(5)));
    }

    #[test]
    fn test_range_intersection() {
        let a = ValueRange::at_least(Value::Int(10));
        let b = ValueRange::less_than(Value::Int(15));
        let both = a.intersect(&b).unwrap();
        assert_eq!(both.integer_bounds(), (Some(10), Some(14)));

        let disjoint = ValueRange::greater_than(Value::Int(20));
        assert!(both.intersect(&disjoint).is_none());

        let point = ValueRange::at_least(Value::Int(3)).intersect(&ValueRange::less_than(Value::Int(3)));
        assert!(point.is_none());
    }

    #[test]
    fn test_values_intersection() {
        let list = ShardingValues::List(vec![Value::Int(1), Value::Int(5), Value::Int(9)]);
        let range = ShardingValues::Range(ValueRange::closed(Value::Int(2), Value::Int(9)));
        assert_eq!(
            list.intersect(&range),
            Some(ShardingValues::List(vec![Value::Int(5), Value::Int(9)]))
        );

        let other = ShardingValues::List(vec![Value::Int(2)]);
        assert_eq!(list.intersect(&other), None);
    }
}
