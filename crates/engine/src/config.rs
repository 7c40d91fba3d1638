//! Engine configuration
//!
//! Small, serde-deserializable knob set. Defaults match the behavior the
//! engine is tested against: five-minute cache TTL, 100-record default
//! history page, three conflict retries.

use serde::Deserialize;
use std::time::Duration;

/// Tunables for [`TransitionEngine`](crate::TransitionEngine)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// TTL for write-through cache entries, in seconds
    pub cache_ttl_secs: u64,
    /// History page size used when callers pass no explicit limit
    pub history_limit: usize,
    /// Attempts made by `execute_with_retry` before surfacing `Conflict`
    pub conflict_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 300,
            history_limit: 100,
            conflict_retries: 3,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Cache TTL as a [`Duration`]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.cache_ttl(), Duration::from_secs(300));
        assert_eq!(config.history_limit, 100);
        assert_eq!(config.conflict_retries, 3);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str("cache_ttl_secs = 30").unwrap();
        assert_eq!(config.cache_ttl_secs, 30);
        assert_eq!(config.history_limit, 100);
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(EngineConfig::from_toml_str("cache_ttl = 30").is_err());
    }
}
