use std::sync::Arc;

use crate::application::catalog::CatalogService;
use crate::application::lookups::LookupService;
use crate::application::repos::{DocumentStore, LookupStore};
use crate::application::reports::ReportService;
use crate::cache::ReportCache;

#[derive(Clone)]
pub struct ApiState {
    pub reports: Arc<ReportService>,
    pub catalog: Arc<CatalogService>,
    pub lookups: Arc<LookupService>,
    pub cache: Arc<ReportCache>,
}

impl ApiState {
    /// Wire every service onto one shared cache.
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        lookups: Arc<dyn LookupStore>,
        cache: Arc<ReportCache>,
    ) -> Self {
        Self {
            reports: Arc::new(ReportService::new(documents.clone(), cache.clone())),
            catalog: Arc::new(CatalogService::new(documents, cache.clone())),
            lookups: Arc::new(LookupService::new(lookups, cache.clone())),
            cache,
        }
    }
}
