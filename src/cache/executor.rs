//! Cache-aware query execution.
//!
//! Handlers describe a query by table and filters; [`CachedQuery`] derives the key,
//! answers from the result cache when it can and otherwise runs the backend call,
//! applies the optional transform and stores what came back.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use serde_json::Value;
use tracing::debug;

use crate::application::repos::{DocumentQuery, DocumentStore, StoreError};

use super::keys::{QueryFilters, cache_key};
use super::store::{Records, ResultCache};

pub(crate) const METRIC_BACKEND_QUERY_MS: &str = "techreport_backend_query_ms";

type Transform<'a> = Box<dyn FnOnce(Vec<Value>) -> Vec<Value> + Send + 'a>;

/// One cacheable read, built per request.
#[must_use = "a cached query does nothing until fetched"]
pub struct CachedQuery<'a> {
    cache: &'a ResultCache,
    table: &'static str,
    filters: QueryFilters,
    transform: Option<Transform<'a>>,
}

impl<'a> CachedQuery<'a> {
    pub fn new(cache: &'a ResultCache, table: &'static str, filters: QueryFilters) -> Self {
        Self {
            cache,
            table,
            filters,
            transform: None,
        }
    }

    /// Add key material that shapes the output but is not a filter, e.g. `onlyname`.
    pub fn extra(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.filters = self.filters.with_extra(name, value);
        self
    }

    /// Post-process backend records before they are cached.
    pub fn transform<F>(mut self, transform: F) -> Self
    where
        F: FnOnce(Vec<Value>) -> Vec<Value> + Send + 'a,
    {
        self.transform = Some(Box::new(transform));
        self
    }

    pub fn key(&self) -> String {
        cache_key(self.table, &self.filters)
    }

    /// Serve from cache or run `run` on a miss. Errors are returned and never cached.
    pub async fn fetch<F, Fut, E>(self, run: F) -> Result<Records, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Value>, E>>,
    {
        let key = self.key();
        if let Some(records) = self.cache.get(&key) {
            debug!(table = self.table, key_len = key.len(), outcome = "hit", "cached query");
            return Ok(records);
        }

        let started_at = Instant::now();
        let rows = run().await?;
        histogram!(METRIC_BACKEND_QUERY_MS, "table" => self.table)
            .record(started_at.elapsed().as_secs_f64() * 1000.0);

        let rows = match self.transform {
            Some(transform) => transform(rows),
            None => rows,
        };
        let records: Records = Arc::new(rows);
        debug!(
            table = self.table,
            key_len = key.len(),
            outcome = "miss",
            rows = records.len(),
            "cached query"
        );
        self.cache.set(key, Arc::clone(&records));
        Ok(records)
    }

    /// [`CachedQuery::fetch`] against a document store; `build` only runs on a miss.
    pub async fn documents<B>(
        self,
        store: &dyn DocumentStore,
        build: B,
    ) -> Result<Records, StoreError>
    where
        B: FnOnce() -> DocumentQuery,
    {
        self.fetch(|| async move {
            let query = build();
            store.find(&query).await
        })
        .await
    }
}
