//! Latest-date memoization.
//!
//! Resolving `start=latest` needs the newest `date` in a table. The lookup is an
//! ordered scan on the backend, so the answer is kept per table for `date_ttl`.
//! A table with no dates caches `None` like any other answer.

use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use metrics::{counter, gauge};
use tracing::debug;

use super::config::CacheConfig;
use super::lock::mutex_lock;
use super::store::{CacheStats, METRIC_CACHE_ENTRIES, METRIC_CACHE_HIT, METRIC_CACHE_MISS, TtlMap};

const SOURCE: &str = "cache::latest";

/// One memoized latest date per table; the key space is the fixed set of tables.
pub struct LatestDateCache {
    entries: Mutex<TtlMap<Option<String>>>,
}

impl LatestDateCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: Mutex::new(TtlMap::new(config.date_ttl())),
        }
    }

    /// Cached answer for `table`: `Some(None)` means "known to have no date".
    pub fn get(&self, table: &str) -> Option<Option<String>> {
        self.get_at(table, Instant::now())
    }

    pub fn get_at(&self, table: &str, now: Instant) -> Option<Option<String>> {
        let value = mutex_lock(&self.entries, SOURCE, "date_get").get(table, now);
        let outcome = if value.is_some() {
            METRIC_CACHE_HIT
        } else {
            METRIC_CACHE_MISS
        };
        counter!(outcome, "cache" => "date").increment(1);
        value
    }

    pub fn set(&self, table: &str, date: Option<String>) {
        self.set_at(table, date, Instant::now());
    }

    pub fn set_at(&self, table: &str, date: Option<String>, now: Instant) {
        let mut entries = mutex_lock(&self.entries, SOURCE, "date_set");
        entries.insert(table.to_string(), date, now);
        gauge!(METRIC_CACHE_ENTRIES, "cache" => "date").set(entries.len() as f64);
    }

    /// Return the memoized latest date for `table`, running `lookup` on a miss.
    ///
    /// The lock is not held across `lookup`; concurrent misses may both query.
    pub async fn latest_date<F, Fut, E>(&self, table: &str, lookup: F) -> Result<Option<String>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<String>, E>>,
    {
        if let Some(cached) = self.get(table) {
            return Ok(cached);
        }

        let date = lookup().await?;
        debug!(cache = "date", table, date = ?date, "memoized latest date");
        self.set(table, date.clone());
        Ok(date)
    }

    pub fn stats(&self) -> CacheStats {
        self.stats_at(Instant::now())
    }

    pub fn stats_at(&self, now: Instant) -> CacheStats {
        mutex_lock(&self.entries, SOURCE, "date_stats").stats(now)
    }

    pub fn reset(&self) -> usize {
        let mut entries = mutex_lock(&self.entries, SOURCE, "date_reset");
        let before = entries.clear();
        gauge!(METRIC_CACHE_ENTRIES, "cache" => "date").set(0.0);
        before
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.entries, SOURCE, "date_len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn lock(&self, op: &'static str) -> MutexGuard<'_, TtlMap<Option<String>>> {
        mutex_lock(&self.entries, SOURCE, op)
    }
}
