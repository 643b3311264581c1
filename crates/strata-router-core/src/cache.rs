//! Route cache
//!
//! Repeated hot queries reuse a previously computed route. A query is only
//! looked up after passing, in order:
//!
//! 1. SQL length within `allowed_max_sql_length`
//! 2. the statement is probably cacheable (memoised per SQL text)
//! 3. every sharding value comes from a parameter marker inside the
//!    parameter list
//!
//! Only single-shard routes are stored. Other routes are remembered as
//! uncacheable so the next call skips straight to a fresh route.
//!
//! Both maps are segmented LRUs: a key only ever locks its own segment.
//!
//! Routes and memoised checks are keyed by the generation of the rule they
//! were computed against, so a rule swap never serves an old route. Routes
//! computed before `invalidate_all` are refused on insert.

use std::borrow::Borrow;
use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use strata_core::{RouteCacheConfig, ShardingRule};
use strata_types::{BoundStatement, ExprValue, StatementKind, Value};
use tracing::debug;

use crate::context::StatementContext;
use crate::types::RouteContext;

const MAX_SEGMENTS: usize = 16;

/// Size-bounded LRU split into independently locked segments
pub struct SegmentedLru<K, V> {
    segments: Vec<Mutex<LruCache<K, V>>>,
    segment_capacity: NonZeroUsize,
    hasher: RandomState,
}

impl<K: Hash + Eq, V: Clone> SegmentedLru<K, V> {
    /// `initial_capacity` and `maximum_size` are totals across all segments
    pub fn new(initial_capacity: usize, maximum_size: usize) -> Self {
        let maximum_size = maximum_size.max(1);
        let segment_count = maximum_size.min(MAX_SEGMENTS);
        let segment_capacity = maximum_size.div_ceil(segment_count);
        let initial = initial_capacity.div_ceil(segment_count).clamp(1, segment_capacity);

        let segments = (0..segment_count)
            .map(|_| Mutex::new(LruCache::new(NonZeroUsize::new(initial).unwrap_or(NonZeroUsize::MIN))))
            .collect();
        Self {
            segments,
            segment_capacity: NonZeroUsize::new(segment_capacity).unwrap_or(NonZeroUsize::MIN),
            hasher: RandomState::new(),
        }
    }

    fn segment<Q: Hash + ?Sized>(&self, key: &Q) -> &Mutex<LruCache<K, V>> {
        let index = (self.hasher.hash_one(key) as usize) % self.segments.len();
        &self.segments[index]
    }

    /// Look up by any borrowed form of the key, e.g. `&str` for `String`
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.segment(key).lock().get(key).cloned()
    }

    pub fn put(&self, key: K, value: V) {
        let mut segment = self.segment(&key).lock();
        // grow towards the segment maximum before evicting
        if segment.len() >= segment.cap().get() && segment.cap() < self.segment_capacity {
            let grown = segment.cap().get().saturating_mul(2).min(self.segment_capacity.get());
            segment.resize(NonZeroUsize::new(grown).unwrap_or(self.segment_capacity));
        }
        segment.put(key, value);
    }

    pub fn len(&self) -> usize {
        self.segments.iter().map(|s| s.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        for segment in &self.segments {
            segment.lock().clear();
        }
    }
}

/// SQL text plus the parameter values at its sharding markers
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteCacheKey {
    pub sql: String,
    pub parameters: Vec<Value>,
    /// Generation of the rule the route is computed against
    pub rule_generation: u64,
    /// Cache epoch when the key was built
    pub epoch: u64,
}

/// Cached route; `None` marks a key whose route is not cacheable
#[derive(Debug, Clone)]
pub struct RouteCacheValue(pub Option<Arc<RouteContext>>);

/// Outcome of a cache lookup
#[derive(Debug, Clone)]
pub enum CacheLookup {
    Hit(Arc<RouteContext>),
    /// The key was routed before and did not hit a single shard
    Uncacheable,
    Miss,
}

/// Per-SQL result of the structural checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheabilityCheck {
    pub probably_cacheable: bool,
    /// Parameter markers feeding sharding conditions, ascending
    pub sharding_marker_indexes: Vec<usize>,
}

impl CacheabilityCheck {
    fn uncacheable() -> Self {
        Self { probably_cacheable: false, sharding_marker_indexes: vec![] }
    }

    /// Inspect a statement against the rule it will be routed with
    pub fn inspect(statement: &BoundStatement, rule: &ShardingRule) -> Self {
        let routable = matches!(
            statement.kind,
            StatementKind::Select | StatementKind::Insert | StatementKind::Update | StatementKind::Delete
        );
        if !routable || statement.has_subquery || statement.contains_non_deterministic {
            return Self::uncacheable();
        }

        let names = statement.table_names();
        let sharding: Vec<_> = names.iter().filter_map(|n| rule.find_sharding_table(n)).collect();
        if sharding.is_empty() || sharding.iter().any(|t| t.uses_hint()) {
            return Self::uncacheable();
        }
        if names.iter().any(|n| !rule.contains_table(n)) {
            return Self::uncacheable();
        }

        let mut markers = Vec::new();
        let mut sharding_value = |value: &ExprValue| -> bool {
            match value.parameter_index() {
                Some(index) => {
                    markers.push(index);
                    true
                }
                None => false,
            }
        };

        for predicate in statement.where_groups.iter().flat_map(|g| g.predicates.iter()) {
            let on_sharding_column = rule
                .find_sharding_table(&predicate.table)
                .is_some_and(|t| t.is_sharding_column(&predicate.column));
            if on_sharding_column && !predicate.values.iter().all(&mut sharding_value) {
                return Self::uncacheable();
            }
        }

        if let Some(insert) = &statement.insert {
            let Some(table) = rule.find_sharding_table(&insert.table) else {
                return Self::uncacheable();
            };
            if insert.columns.is_empty() {
                return Self::uncacheable();
            }
            // a generated sharding key differs on every call
            if let Some(key) = table.generate_key() {
                if insert.column_index(&key.column).is_none() && table.is_sharding_column(&key.column) {
                    return Self::uncacheable();
                }
            }
            for (index, column) in insert.columns.iter().enumerate() {
                if !table.is_sharding_column(column) {
                    continue;
                }
                for row in &insert.rows {
                    match row.values.get(index) {
                        Some(segment) if sharding_value(&segment.value) => {}
                        _ => return Self::uncacheable(),
                    }
                }
            }
        }

        markers.sort_unstable();
        markers.dedup();
        Self { probably_cacheable: true, sharding_marker_indexes: markers }
    }
}

/// Cache counters
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    skipped: AtomicU64,
    inserted: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    /// Calls that bypassed the cache (failed gate or uncacheable key)
    pub skipped: u64,
    pub inserted: u64,
}

impl CacheStats {
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            inserted: self.inserted.load(Ordering::Relaxed),
        }
    }
}

/// Route cache with its cacheability memo
pub struct RouteCache {
    config: RouteCacheConfig,
    routes: SegmentedLru<RouteCacheKey, RouteCacheValue>,
    /// SQL text -> (rule generation, check)
    checks: SegmentedLru<String, (u64, Arc<CacheabilityCheck>)>,
    epoch: AtomicU64,
    stats: CacheStats,
}

impl RouteCache {
    pub fn new(config: &RouteCacheConfig) -> Self {
        Self {
            config: config.clone(),
            routes: SegmentedLru::new(config.initial_capacity, config.maximum_size),
            checks: SegmentedLru::new(config.initial_capacity, config.maximum_size),
            epoch: AtomicU64::new(0),
            stats: CacheStats::default(),
        }
    }

    pub fn config(&self) -> &RouteCacheConfig {
        &self.config
    }

    /// Run the gates. `None` means the call must route without the cache.
    pub fn cache_key(&self, ctx: &StatementContext<'_>, rule: &ShardingRule) -> Option<RouteCacheKey> {
        let key = self.gate(ctx, rule);
        if key.is_none() {
            self.stats.skipped.fetch_add(1, Ordering::Relaxed);
        }
        key
    }

    fn gate(&self, ctx: &StatementContext<'_>, rule: &ShardingRule) -> Option<RouteCacheKey> {
        if !self.config.enabled {
            return None;
        }
        let sql = ctx.sql();
        if sql.len() > self.config.allowed_max_sql_length {
            debug!(length = sql.len(), max = self.config.allowed_max_sql_length, "SQL too long for route cache");
            return None;
        }
        // hint values are not part of the key
        if ctx.query().hint.is_some() {
            return None;
        }

        let epoch = self.epoch.load(Ordering::Acquire);
        let generation = rule.generation();
        let check = match self.checks.get(sql) {
            Some((checked, check)) if checked == generation => check,
            _ => {
                let check = Arc::new(CacheabilityCheck::inspect(ctx.statement(), rule));
                if self.epoch.load(Ordering::Acquire) == epoch {
                    self.checks.put(sql.to_string(), (generation, Arc::clone(&check)));
                }
                check
            }
        };
        if !check.probably_cacheable {
            debug!("Statement is not cacheable");
            return None;
        }

        let parameters = ctx.parameters();
        let mut values = Vec::with_capacity(check.sharding_marker_indexes.len());
        for index in &check.sharding_marker_indexes {
            let Some(value) = parameters.get(*index) else {
                debug!(index, parameters = parameters.len(), "Sharding parameter marker out of range, skipping route cache");
                return None;
            };
            values.push(value.clone());
        }

        Some(RouteCacheKey { sql: sql.to_string(), parameters: values, rule_generation: generation, epoch })
    }

    pub fn lookup(&self, key: &RouteCacheKey) -> CacheLookup {
        match self.routes.get(key) {
            Some(RouteCacheValue(Some(route))) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                CacheLookup::Hit(route)
            }
            Some(RouteCacheValue(None)) => {
                self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                CacheLookup::Uncacheable
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                CacheLookup::Miss
            }
        }
    }

    /// Store a freshly computed route. Only single-shard routes are kept;
    /// anything else is recorded as uncacheable. Keys built before the last
    /// `invalidate_all` are dropped. Returns whether the route was stored.
    pub fn insert(&self, key: RouteCacheKey, route: &Arc<RouteContext>) -> bool {
        if key.epoch != self.epoch.load(Ordering::Acquire) {
            debug!(epoch = key.epoch, "Route computed before invalidation, not cached");
            return false;
        }
        if route.is_single_shard() {
            self.routes.put(key, RouteCacheValue(Some(Arc::clone(route))));
            self.stats.inserted.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            self.routes.put(key, RouteCacheValue(None));
            false
        }
    }

    /// Drop every cached route and cacheability result
    pub fn invalidate_all(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.routes.clear();
        self.checks.clear();
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segmented_lru_grows_then_evicts() {
        let cache: SegmentedLru<u32, u32> = SegmentedLru::new(1, 64);
        for i in 0..4 {
            cache.put(i, i * 10);
        }
        assert_eq!(cache.len(), 4);
        assert_eq!(cache.get(&2), Some(20));

        let cache: SegmentedLru<u32, u32> = SegmentedLru::new(1, 4);
        for i in 0..100 {
            cache.put(i, i);
        }
        assert!(cache.len() <= 4);
        assert_eq!(cache.get(&99), Some(99));

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_segment_count_is_bounded() {
        let cache: SegmentedLru<u32, u32> = SegmentedLru::new(128, 1024);
        assert_eq!(cache.segments.len(), MAX_SEGMENTS);
        assert_eq!(cache.segment_capacity.get(), 64);
    }

    #[test]
    fn test_cache_key_equality_is_by_value() {
        let key = |value: i64, rule_generation: u64| RouteCacheKey {
            sql: "SELECT ?".into(),
            parameters: vec![Value::Int(value)],
            rule_generation,
            epoch: 0,
        };
        assert_eq!(key(1, 1), key(1, 1));
        assert_ne!(key(1, 1), key(2, 1));
        assert_ne!(key(1, 1), key(1, 2));
    }

    #[test]
    fn test_borrowed_lookup_hits_owned_key() {
        let cache: SegmentedLru<String, u32> = SegmentedLru::new(16, 16);
        cache.put("SELECT 1".to_string(), 1);
        assert_eq!(cache.get("SELECT 1"), Some(1));
        assert_eq!(cache.get("SELECT 2"), None);
    }
}
