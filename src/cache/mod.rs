//! Query result caching.
//!
//! Every read endpoint goes through a process-wide, TTL-bound, size-bounded
//! result cache. A second, much smaller cache memoizes the newest `date` per
//! table so `start=latest` does not cost a backend scan on every request.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! result_ttl_seconds = 3600
//! date_ttl_seconds = 3600
//! max_size = 5000
//! ```
//!
//! When a `set` finds the result cache full, an eviction pass shrinks it to half
//! of `max_size`, dropping expired entries first and then the oldest live ones.

mod config;
mod executor;
mod keys;
mod latest;
mod lock;
mod service;
mod store;

pub use config::CacheConfig;
pub use executor::CachedQuery;
pub use keys::{QueryFilters, cache_key, canonicalize};
pub use latest::LatestDateCache;
pub use service::{
    CachePolicy, CacheReport, CacheSizes, EVICTION_STRATEGY, ReportCache, ResetReport,
};
pub use store::{CacheStats, Records, ResultCache};

pub(crate) mod metric_names {
    pub(crate) use super::executor::METRIC_BACKEND_QUERY_MS;
    pub(crate) use super::store::{
        METRIC_CACHE_ENTRIES, METRIC_CACHE_EVICT, METRIC_CACHE_HIT, METRIC_CACHE_MISS,
    };
}
