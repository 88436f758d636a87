//! Process-wide cache bundle handed to the application services.

use std::time::Instant;

use serde::Serialize;
use tracing::info;

use super::config::CacheConfig;
use super::executor::CachedQuery;
use super::keys::QueryFilters;
use super::latest::LatestDateCache;
use super::store::{CacheStats, METRIC_CACHE_ENTRIES, ResultCache};

pub const EVICTION_STRATEGY: &str = "expired-first-then-oldest";

/// Result cache plus latest-date memoizer, created once at startup.
pub struct ReportCache {
    results: ResultCache,
    dates: LatestDateCache,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CacheReport {
    pub result_cache: CacheStats,
    pub date_cache: CacheStats,
    pub config: CachePolicy,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CachePolicy {
    pub max_size: usize,
    pub eviction_strategy: &'static str,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CacheSizes {
    pub result_cache: usize,
    pub date_cache: usize,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ResetReport {
    pub before: CacheSizes,
    pub after: CacheSizes,
}

impl ReportCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            results: ResultCache::new(config),
            dates: LatestDateCache::new(config),
        }
    }

    pub fn results(&self) -> &ResultCache {
        &self.results
    }

    pub fn dates(&self) -> &LatestDateCache {
        &self.dates
    }

    /// Start a cache-aware read against `table`.
    pub fn query(&self, table: &'static str, filters: QueryFilters) -> CachedQuery<'_> {
        CachedQuery::new(&self.results, table, filters)
    }

    pub fn stats(&self) -> CacheReport {
        self.stats_at(Instant::now())
    }

    pub fn stats_at(&self, now: Instant) -> CacheReport {
        CacheReport {
            result_cache: self.results.stats_at(now),
            date_cache: self.dates.stats_at(now),
            config: CachePolicy {
                max_size: self.results.max_size(),
                eviction_strategy: EVICTION_STRATEGY,
            },
        }
    }

    /// Clear both caches while holding both locks.
    pub fn reset(&self) -> ResetReport {
        let mut results = self.results.lock("reset_all");
        let mut dates = self.dates.lock("reset_all");
        let before = CacheSizes {
            result_cache: results.clear(),
            date_cache: dates.clear(),
        };
        let after = CacheSizes {
            result_cache: results.len(),
            date_cache: dates.len(),
        };
        drop(dates);
        drop(results);

        metrics::gauge!(METRIC_CACHE_ENTRIES, "cache" => "result").set(0.0);
        metrics::gauge!(METRIC_CACHE_ENTRIES, "cache" => "date").set(0.0);
        info!(
            result_cache = before.result_cache,
            date_cache = before.date_cache,
            "cache reset"
        );
        ResetReport { before, after }
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    fn bundle() -> ReportCache {
        ReportCache::new(&CacheConfig {
            result_ttl_seconds: 60,
            date_ttl_seconds: 120,
            max_size: NonZeroUsize::new(100).expect("non-zero"),
        })
    }

    #[test]
    fn stats_classify_live_and_expired_per_cache() {
        let cache = bundle();
        let t0 = Instant::now();
        cache.results().set_at("a", Arc::new(vec![json!(1)]), t0);
        cache
            .results()
            .set_at("b", Arc::new(vec![json!(2)]), t0 + Duration::from_secs(30));
        cache.dates().set_at("adoption", None, t0);

        let report = cache.stats_at(t0 + Duration::from_secs(60));

        assert_eq!(
            report.result_cache,
            CacheStats {
                total: 2,
                live: 1,
                expired: 1,
                ttl: 60
            }
        );
        assert_eq!(report.date_cache.live, 1);
        assert_eq!(report.date_cache.ttl, 120);
        assert_eq!(report.config.max_size, 100);
    }

    #[test]
    fn stats_serialize_in_camel_case() {
        let cache = bundle();
        let value = serde_json::to_value(cache.stats()).expect("serializable");

        assert_eq!(
            value,
            json!({
                "resultCache": {"total": 0, "live": 0, "expired": 0, "ttl": 60},
                "dateCache": {"total": 0, "live": 0, "expired": 0, "ttl": 120},
                "config": {"maxSize": 100, "evictionStrategy": "expired-first-then-oldest"}
            })
        );
    }

    #[test]
    fn reset_clears_both_caches_and_reports_sizes() {
        let cache = bundle();
        cache.results().set("a", Arc::new(Vec::new()));
        cache.results().set("b", Arc::new(Vec::new()));
        cache.dates().set("adoption", Some("2024-06-01".into()));

        let report = cache.reset();

        assert_eq!(
            serde_json::to_value(report).expect("serializable"),
            json!({
                "before": {"resultCache": 2, "dateCache": 1},
                "after": {"resultCache": 0, "dateCache": 0}
            })
        );
        let stats = cache.stats();
        assert_eq!(stats.result_cache.total, 0);
        assert_eq!(stats.date_cache.total, 0);
        assert!(cache.results().get("a").is_none());
        assert!(cache.dates().get("adoption").is_none());
    }
}
