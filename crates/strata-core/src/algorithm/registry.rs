//! Algorithm registry
//!
//! Maps configured type names to constructors. A registry value is built at
//! startup and passed to `ShardingRule::new`; there is no process-wide
//! registration.

use std::collections::HashMap;

use tracing::debug;

use super::{
    AlgorithmProps, BoundaryRangeAlgorithm, ComplexAlgorithm, ComplexInlineAlgorithm, HashModAlgorithm,
    HintAlgorithm, HintInlineAlgorithm, InlineAlgorithm, ModAlgorithm, ShardingAlgorithm, StandardAlgorithm,
    VolumeRangeAlgorithm,
};
use crate::error::ConfigError;
use crate::keygen::{KeyGenerator, SnowflakeKeyGenerator};
use crate::rule_config::AlgorithmConfiguration;

pub type AlgorithmFactory = fn(&AlgorithmProps) -> Result<ShardingAlgorithm, ConfigError>;
pub type KeyGeneratorFactory = fn(&AlgorithmProps) -> Result<KeyGenerator, ConfigError>;

/// Registry of sharding algorithm and key generator constructors
#[derive(Debug, Clone)]
pub struct AlgorithmRegistry {
    algorithms: HashMap<String, AlgorithmFactory>,
    key_generators: HashMap<String, KeyGeneratorFactory>,
}

impl AlgorithmRegistry {
    /// Registry with every built-in type
    pub fn new() -> Self {
        let mut registry = Self::empty();

        registry.register_algorithm("INLINE", |p| {
            Ok(ShardingAlgorithm::Standard(StandardAlgorithm::Inline(InlineAlgorithm::from_props(p)?)))
        });
        registry.register_algorithm("MOD", |p| {
            Ok(ShardingAlgorithm::Standard(StandardAlgorithm::Mod(ModAlgorithm::from_props(p)?)))
        });
        registry.register_algorithm("HASH_MOD", |p| {
            Ok(ShardingAlgorithm::Standard(StandardAlgorithm::HashMod(HashModAlgorithm::from_props(p)?)))
        });
        registry.register_algorithm("BOUNDARY_RANGE", |p| {
            Ok(ShardingAlgorithm::Standard(StandardAlgorithm::BoundaryRange(
                BoundaryRangeAlgorithm::from_props(p)?,
            )))
        });
        registry.register_algorithm("VOLUME_RANGE", |p| {
            Ok(ShardingAlgorithm::Standard(StandardAlgorithm::VolumeRange(VolumeRangeAlgorithm::from_props(p)?)))
        });
        registry.register_algorithm("COMPLEX_INLINE", |p| {
            Ok(ShardingAlgorithm::Complex(ComplexAlgorithm::Inline(ComplexInlineAlgorithm::from_props(p)?)))
        });
        registry.register_algorithm("HINT_INLINE", |p| {
            Ok(ShardingAlgorithm::Hint(HintAlgorithm::Inline(HintInlineAlgorithm::from_props(p)?)))
        });

        registry.register_key_generator("SNOWFLAKE", |p| {
            Ok(KeyGenerator::Snowflake(SnowflakeKeyGenerator::from_props(p)?))
        });
        registry.register_key_generator("UUID", |_| Ok(KeyGenerator::Uuid));

        registry
    }

    /// Registry without any registered type
    pub fn empty() -> Self {
        Self { algorithms: HashMap::new(), key_generators: HashMap::new() }
    }

    pub fn register_algorithm(&mut self, type_name: &str, factory: AlgorithmFactory) {
        self.algorithms.insert(type_name.to_ascii_uppercase(), factory);
    }

    pub fn register_key_generator(&mut self, type_name: &str, factory: KeyGeneratorFactory) {
        self.key_generators.insert(type_name.to_ascii_uppercase(), factory);
    }

    pub fn create_algorithm(&self, config: &AlgorithmConfiguration) -> Result<ShardingAlgorithm, ConfigError> {
        let factory = self
            .algorithms
            .get(&config.algorithm_type.to_ascii_uppercase())
            .ok_or_else(|| ConfigError::UnknownAlgorithmType(config.algorithm_type.clone()))?;
        let algorithm = factory(&config.props)?;
        debug!(algorithm_type = %algorithm.type_name(), "Sharding algorithm created");
        Ok(algorithm)
    }

    pub fn create_key_generator(&self, config: &AlgorithmConfiguration) -> Result<KeyGenerator, ConfigError> {
        let factory = self
            .key_generators
            .get(&config.algorithm_type.to_ascii_uppercase())
            .ok_or_else(|| ConfigError::UnknownAlgorithmType(config.algorithm_type.clone()))?;
        factory(&config.props)
    }

    pub fn contains_algorithm(&self, type_name: &str) -> bool {
        self.algorithms.contains_key(&type_name.to_ascii_uppercase())
    }
}

impl Default for AlgorithmRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(json: &str) -> AlgorithmConfiguration {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_builtin_types() {
        let registry = AlgorithmRegistry::new();
        for name in ["INLINE", "mod", "HASH_MOD", "BOUNDARY_RANGE", "VOLUME_RANGE", "COMPLEX_INLINE", "HINT_INLINE"] {
            assert!(registry.contains_algorithm(name), "{name}");
        }

        let algorithm = registry
            .create_algorithm(&config(r#"{"type": "mod", "props": {"sharding-count": 2}}"#))
            .unwrap();
        assert_eq!(algorithm.type_name(), "MOD");
    }

    #[test]
    fn test_unknown_type() {
        let registry = AlgorithmRegistry::new();
        let result = registry.create_algorithm(&config(r#"{"type": "CLASS_BASED"}"#));
        assert!(matches!(result, Err(ConfigError::UnknownAlgorithmType(name)) if name == "CLASS_BASED"));
    }

    #[test]
    fn test_custom_registration() {
        let mut registry = AlgorithmRegistry::empty();
        assert!(!registry.contains_algorithm("INLINE"));

        registry.register_algorithm("FIRST_TWO", |_| {
            let props: AlgorithmProps = serde_json::from_str(r#"{"sharding-count": 2}"#)?;
            Ok(ShardingAlgorithm::Standard(StandardAlgorithm::Mod(ModAlgorithm::from_props(&props)?)))
        });
        assert!(registry.create_algorithm(&config(r#"{"type": "first_two"}"#)).is_ok());
    }

    #[test]
    fn test_key_generators() {
        let registry = AlgorithmRegistry::new();
        let uuid = registry.create_key_generator(&config(r#"{"type": "UUID"}"#)).unwrap();
        assert_eq!(uuid.type_name(), "UUID");
        assert!(registry.create_key_generator(&config(r#"{"type": "AUTO"}"#)).is_err());
    }
}
