//! Runtime properties of the compilation pipeline

use serde::{Deserialize, Serialize};

use crate::expression::DEFAULT_MAX_INLINE_EXPANSION;

/// Pipeline properties
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigProperties {
    /// Emit the diagnostic SQL log line for every compiled query
    pub sql_show: bool,

    /// Omit parameters from the diagnostic SQL log line
    pub sql_simple: bool,

    /// Route cache configuration
    pub route_cache: RouteCacheConfig,

    /// Maximum names a single inline expression evaluation may produce
    pub max_inline_expansion: usize,
}

/// Route cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteCacheConfig {
    pub enabled: bool,

    /// SQL longer than this (in bytes) is never cached
    pub allowed_max_sql_length: usize,

    /// Capacity reserved up front, spread over the cache segments
    pub initial_capacity: usize,

    /// Maximum number of cached entries across all segments
    pub maximum_size: usize,
}

impl Default for ConfigProperties {
    fn default() -> Self {
        Self {
            sql_show: false,
            sql_simple: false,
            route_cache: RouteCacheConfig::default(),
            max_inline_expansion: DEFAULT_MAX_INLINE_EXPANSION,
        }
    }
}

impl Default for RouteCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_max_sql_length: 4096,
            initial_capacity: 128,
            maximum_size: 1024,
        }
    }
}

impl ConfigProperties {
    /// Load properties from `STRATA_*` environment variables, falling back
    /// to defaults for anything unset or unparsable
    pub fn from_env() -> Self {
        let mut config = ConfigProperties::default();

        if let Some(v) = env_parse("STRATA_SQL_SHOW") {
            config.sql_show = v;
        }
        if let Some(v) = env_parse("STRATA_SQL_SIMPLE") {
            config.sql_simple = v;
        }
        if let Some(v) = env_parse("STRATA_MAX_INLINE_EXPANSION") {
            config.max_inline_expansion = v;
        }

        // Route cache
        if let Some(v) = env_parse("STRATA_ROUTE_CACHE_ENABLED") {
            config.route_cache.enabled = v;
        }
        if let Some(v) = env_parse("STRATA_ROUTE_CACHE_MAX_SQL_LENGTH") {
            config.route_cache.allowed_max_sql_length = v;
        }
        if let Some(v) = env_parse("STRATA_ROUTE_CACHE_INITIAL_CAPACITY") {
            config.route_cache.initial_capacity = v;
        }
        if let Some(v) = env_parse("STRATA_ROUTE_CACHE_MAXIMUM_SIZE") {
            config.route_cache.maximum_size = v;
        }

        config
    }

    pub fn with_sql_show(mut self, sql_show: bool) -> Self {
        self.sql_show = sql_show;
        self
    }

    pub fn with_route_cache(mut self, route_cache: RouteCacheConfig) -> Self {
        self.route_cache = route_cache;
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.trim().parse().ok()
}
