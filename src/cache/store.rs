//! Cache storage implementations.
//!
//! `TtlMap` holds timestamped entries and answers liveness questions.
//! `ResultCache` wraps one with a size ceiling and the eviction pass.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use metrics::{counter, gauge};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::config::CacheConfig;
use super::lock::mutex_lock;

const SOURCE: &str = "cache::store";

pub(crate) const METRIC_CACHE_HIT: &str = "techreport_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS: &str = "techreport_cache_miss_total";
pub(crate) const METRIC_CACHE_EVICT: &str = "techreport_cache_evict_total";
pub(crate) const METRIC_CACHE_ENTRIES: &str = "techreport_cache_entries";

/// A cached query result: the ordered records returned by the backend.
pub type Records = Arc<Vec<Value>>;

/// Live/expired breakdown of one cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total: usize,
    pub live: usize,
    pub expired: usize,
    /// TTL in seconds.
    pub ttl: u64,
}

struct Entry<V> {
    value: V,
    stored_at: Instant,
    seq: u64,
}

/// Timestamped entries keyed by string.
///
/// Expired entries stay in the map until they are evicted, overwritten or cleared.
pub(crate) struct TtlMap<V> {
    entries: HashMap<String, Entry<V>>,
    ttl: Duration,
    next_seq: u64,
}

impl<V: Clone> TtlMap<V> {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            next_seq: 0,
        }
    }

    fn is_live(&self, entry: &Entry<V>, now: Instant) -> bool {
        now.saturating_duration_since(entry.stored_at) < self.ttl
    }

    pub(crate) fn get(&self, key: &str, now: Instant) -> Option<V> {
        self.entries
            .get(key)
            .filter(|entry| self.is_live(entry, now))
            .map(|entry| entry.value.clone())
    }

    pub(crate) fn insert(&mut self, key: String, value: V, now: Instant) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(
            key,
            Entry {
                value,
                stored_at: now,
                seq,
            },
        );
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.clear();
        before
    }

    pub(crate) fn stats(&self, now: Instant) -> CacheStats {
        let live = self
            .entries
            .values()
            .filter(|entry| self.is_live(entry, now))
            .count();
        CacheStats {
            total: self.entries.len(),
            live,
            expired: self.entries.len() - live,
            ttl: self.ttl.as_secs(),
        }
    }

    /// Shrink the map to half of `max_size`, expired entries first, then oldest first.
    ///
    /// Returns the number of entries removed.
    pub(crate) fn evict(&mut self, max_size: usize, now: Instant) -> usize {
        let target = max_size / 2;
        let len = self.entries.len();
        if len <= target {
            return 0;
        }

        let mut order: Vec<(bool, Instant, u64, &String)> = self
            .entries
            .iter()
            .map(|(key, entry)| (self.is_live(entry, now), entry.stored_at, entry.seq, key))
            .collect();
        // `false < true`: expired entries sort ahead of live ones.
        order.sort_unstable_by(|a, b| (a.0, a.1, a.2).cmp(&(b.0, b.1, b.2)));

        let victims: Vec<String> = order
            .into_iter()
            .take(len - target)
            .map(|(_, _, _, key)| key.clone())
            .collect();
        for key in &victims {
            self.entries.remove(key);
        }
        victims.len()
    }
}

/// Size-bounded query result cache.
pub struct ResultCache {
    entries: Mutex<TtlMap<Records>>,
    max_size: NonZeroUsize,
}

impl ResultCache {
    /// Create an empty result cache with the given configuration.
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: Mutex::new(TtlMap::new(config.result_ttl())),
            max_size: config.max_size,
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size.get()
    }

    /// Return the stored records if the entry exists and is still live.
    pub fn get(&self, key: &str) -> Option<Records> {
        self.get_at(key, Instant::now())
    }

    /// Like [`ResultCache::get`] with an explicit clock reading.
    pub fn get_at(&self, key: &str, now: Instant) -> Option<Records> {
        let value = mutex_lock(&self.entries, SOURCE, "result_get").get(key, now);
        let outcome = if value.is_some() {
            METRIC_CACHE_HIT
        } else {
            METRIC_CACHE_MISS
        };
        counter!(outcome, "cache" => "result").increment(1);
        value
    }

    /// Store `records` under `key`, replacing any previous entry.
    pub fn set(&self, key: impl Into<String>, records: Records) {
        self.set_at(key, records, Instant::now());
    }

    /// Like [`ResultCache::set`] with an explicit clock reading.
    pub fn set_at(&self, key: impl Into<String>, records: Records, now: Instant) {
        let mut entries = mutex_lock(&self.entries, SOURCE, "result_set");
        if entries.len() >= self.max_size.get() {
            let evicted = entries.evict(self.max_size.get(), now);
            if evicted > 0 {
                counter!(METRIC_CACHE_EVICT).increment(evicted as u64);
                debug!(
                    cache = "result",
                    evicted,
                    remaining = entries.len(),
                    "eviction pass complete"
                );
            }
        }
        entries.insert(key.into(), records, now);
        gauge!(METRIC_CACHE_ENTRIES, "cache" => "result").set(entries.len() as f64);
    }

    pub fn stats(&self) -> CacheStats {
        self.stats_at(Instant::now())
    }

    pub fn stats_at(&self, now: Instant) -> CacheStats {
        mutex_lock(&self.entries, SOURCE, "result_stats").stats(now)
    }

    /// Remove every entry; returns the number removed.
    pub fn reset(&self) -> usize {
        let mut entries = mutex_lock(&self.entries, SOURCE, "result_reset");
        let before = entries.clear();
        gauge!(METRIC_CACHE_ENTRIES, "cache" => "result").set(0.0);
        before
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.entries, SOURCE, "result_len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn lock(&self, op: &'static str) -> std::sync::MutexGuard<'_, TtlMap<Records>> {
        mutex_lock(&self.entries, SOURCE, op)
    }
}
