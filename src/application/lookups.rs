use std::sync::Arc;

use crate::application::error::QueryError;
use crate::application::repos::LookupStore;
use crate::cache::{QueryFilters, Records, ReportCache};

/// Geo and rank lists from the analytics store, cached like any other read.
pub struct LookupService {
    store: Arc<dyn LookupStore>,
    cache: Arc<ReportCache>,
}

impl LookupService {
    pub fn new(store: Arc<dyn LookupStore>, cache: Arc<ReportCache>) -> Self {
        Self { store, cache }
    }

    pub async fn geos(&self) -> Result<Records, QueryError> {
        let records = self
            .cache
            .query("geos", QueryFilters::default())
            .fetch(|| self.store.geos())
            .await?;
        Ok(records)
    }

    pub async fn ranks(&self) -> Result<Records, QueryError> {
        let records = self
            .cache
            .query("ranks", QueryFilters::default())
            .fetch(|| self.store.ranks())
            .await?;
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::{Value, json};

    use super::*;
    use crate::application::repos::StoreError;
    use crate::cache::CacheConfig;

    #[derive(Default)]
    struct CountingLookups {
        geos: AtomicUsize,
        ranks: AtomicUsize,
    }

    #[async_trait]
    impl LookupStore for CountingLookups {
        async fn geos(&self) -> Result<Vec<Value>, StoreError> {
            self.geos.fetch_add(1, Ordering::SeqCst);
            Ok(vec![json!({"geo": "ALL"}), json!({"geo": "United States of America"})])
        }

        async fn ranks(&self) -> Result<Vec<Value>, StoreError> {
            if self.ranks.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(StoreError::analytics("quota exceeded"));
            }
            Ok(vec![json!({"rank": "ALL"})])
        }
    }

    #[tokio::test]
    async fn geos_hit_the_warehouse_once() {
        let store = Arc::new(CountingLookups::default());
        let service = LookupService::new(
            store.clone(),
            Arc::new(ReportCache::new(&CacheConfig::default())),
        );

        let first = service.geos().await.expect("geos");
        let second = service.geos().await.expect("geos");

        assert_eq!(first, second);
        assert_eq!(first[0], json!({"geo": "ALL"}));
        assert_eq!(store.geos.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_rank_lookup_is_retried() {
        let store = Arc::new(CountingLookups::default());
        let service = LookupService::new(
            store.clone(),
            Arc::new(ReportCache::new(&CacheConfig::default())),
        );

        let error = service.ranks().await.unwrap_err();
        assert!(!error.is_client_error());

        let ranks = service.ranks().await.expect("ranks");
        assert_eq!(*ranks, vec![json!({"rank": "ALL"})]);
        assert_eq!(store.ranks.load(Ordering::SeqCst), 2);
    }
}
