//! Cache configuration.
//!
//! Controls the result cache and the latest-date memoizer via `techreport.toml`.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

// Default values for cache configuration
const DEFAULT_RESULT_TTL_SECS: u64 = 60 * 60;
const DEFAULT_DATE_TTL_SECS: u64 = 60 * 60;
const DEFAULT_MAX_SIZE: NonZeroUsize = match NonZeroUsize::new(5000) {
    Some(size) => size,
    None => panic!("default cache size is non-zero"),
};

/// Cache configuration from `techreport.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Lifetime of a cached query result, in seconds.
    pub result_ttl_seconds: u64,
    /// Lifetime of a memoized latest date, in seconds.
    pub date_ttl_seconds: u64,
    /// Hard ceiling on result cache entries.
    pub max_size: NonZeroUsize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            result_ttl_seconds: DEFAULT_RESULT_TTL_SECS,
            date_ttl_seconds: DEFAULT_DATE_TTL_SECS,
            max_size: DEFAULT_MAX_SIZE,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            result_ttl_seconds: settings.result_ttl.as_secs(),
            date_ttl_seconds: settings.date_ttl.as_secs(),
            max_size: settings.max_size,
        }
    }
}

impl CacheConfig {
    pub fn result_ttl(&self) -> Duration {
        Duration::from_secs(self.result_ttl_seconds)
    }

    pub fn date_ttl(&self) -> Duration {
        Duration::from_secs(self.date_ttl_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert_eq!(config.result_ttl(), Duration::from_secs(3600));
        assert_eq!(config.date_ttl(), Duration::from_secs(3600));
        assert_eq!(config.max_size.get(), 5000);
    }

    #[test]
    fn zero_max_size_is_rejected_on_deserialize() {
        let parsed: Result<CacheConfig, _> =
            serde_json::from_value(serde_json::json!({ "max_size": 0 }));
        assert!(parsed.is_err());

        let parsed: CacheConfig = serde_json::from_value(serde_json::json!({ "max_size": 8 }))
            .expect("non-zero size");
        assert_eq!(parsed.max_size.get(), 8);
        assert_eq!(parsed.result_ttl_seconds, 3600);
    }
}
