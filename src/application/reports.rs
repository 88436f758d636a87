//! Report endpoints: adoption, Core Web Vitals, Lighthouse, page weight and audits.
//!
//! All five share one document shape keyed by `(date, geo, rank, technology,
//! version)` and differ only in the collection and the field carrying the metrics.

use std::sync::Arc;

use serde_json::Value;

use crate::application::error::QueryError;
use crate::application::params::{ReportParams, StartDate};
use crate::application::repos::{DocumentQuery, DocumentStore, SortDirection, StoreError};
use crate::cache::{QueryFilters, Records, ReportCache};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Adoption,
    CoreWebVitals,
    Lighthouse,
    PageWeight,
    Audits,
}

impl ReportKind {
    pub const ALL: [ReportKind; 5] = [
        ReportKind::Adoption,
        ReportKind::CoreWebVitals,
        ReportKind::Lighthouse,
        ReportKind::PageWeight,
        ReportKind::Audits,
    ];

    pub fn table(self) -> &'static str {
        match self {
            ReportKind::Adoption => "adoption",
            ReportKind::CoreWebVitals => "core_web_vitals",
            ReportKind::Lighthouse => "lighthouse",
            ReportKind::PageWeight => "page_weight",
            ReportKind::Audits => "audits",
        }
    }

    pub fn data_field(self) -> &'static str {
        match self {
            ReportKind::Adoption => "adoption",
            ReportKind::CoreWebVitals => "vitals",
            ReportKind::Lighthouse => "lighthouse",
            ReportKind::PageWeight => "pageWeight",
            ReportKind::Audits => "audits",
        }
    }

    /// Human label used in generic failure messages.
    pub fn resource(self) -> &'static str {
        match self {
            ReportKind::Adoption => "adoption data",
            ReportKind::CoreWebVitals => "cwv data",
            ReportKind::Lighthouse => "lighthouse data",
            ReportKind::PageWeight => "pageWeight data",
            ReportKind::Audits => "audits data",
        }
    }
}

pub struct ReportService {
    store: Arc<dyn DocumentStore>,
    cache: Arc<ReportCache>,
}

impl ReportService {
    pub fn new(store: Arc<dyn DocumentStore>, cache: Arc<ReportCache>) -> Self {
        Self { store, cache }
    }

    /// Newest `date` in `table`, memoized per table.
    pub async fn latest_date(&self, table: &'static str) -> Result<Option<String>, StoreError> {
        let store = self.store.as_ref();
        self.cache
            .dates()
            .latest_date(table, || find_latest_date(store, table))
            .await
    }

    pub async fn report(
        &self,
        kind: ReportKind,
        params: &ReportParams,
    ) -> Result<Records, QueryError> {
        let start_date = match &params.start {
            Some(StartDate::Latest) => self.latest_date(kind.table()).await?,
            Some(StartDate::On(date)) => Some(date.clone()),
            None => None,
        };

        let filters = QueryFilters {
            geo: Some(params.geo.clone()),
            rank: Some(params.rank.clone()),
            technology: Some(params.technology.clone()),
            version: Some(params.version.clone()),
            start_date: start_date.clone(),
            end_date: params.end.clone(),
            ..Default::default()
        };

        let records = self
            .cache
            .query(kind.table(), filters)
            .documents(self.store.as_ref(), || {
                report_query(kind, params, start_date.as_deref())
            })
            .await?;
        Ok(records)
    }
}

/// Query for one report table; the projection adds `version` only for versioned requests.
pub fn report_query(
    kind: ReportKind,
    params: &ReportParams,
    start_date: Option<&str>,
) -> DocumentQuery {
    let mut query = DocumentQuery::new(kind.table())
        .eq("geo", params.geo.as_str())
        .eq("rank", params.rank.as_str())
        .is_in("technology", &params.technology)
        .is_in("version", &params.version);
    if let Some(start) = start_date {
        query = query.gte("date", start);
    }
    if let Some(end) = params.end.as_deref() {
        query = query.lte("date", end);
    }

    let mut fields = vec!["date", "technology", kind.data_field()];
    if params.is_versioned() {
        fields.push("version");
    }
    query.select(fields)
}

/// Newest `date` value in `table`, or `None` for an empty table.
pub async fn find_latest_date(
    store: &dyn DocumentStore,
    table: &'static str,
) -> Result<Option<String>, StoreError> {
    let query = DocumentQuery::new(table)
        .order_by("date", SortDirection::Desc)
        .limit(1)
        .select(["date"]);
    let rows = store.find(&query).await?;
    Ok(rows
        .first()
        .and_then(|row| row.get("date"))
        .and_then(Value::as_str)
        .map(str::to_string))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::application::params::ALL_VERSIONS;
    use crate::application::repos::Filter;
    use crate::cache::CacheConfig;

    #[derive(Default)]
    struct FakeStore {
        calls: AtomicUsize,
        seen: Mutex<Vec<DocumentQuery>>,
        latest: Option<&'static str>,
    }

    #[async_trait]
    impl DocumentStore for FakeStore {
        async fn find(&self, query: &DocumentQuery) -> Result<Vec<Value>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().expect("seen lock").push(query.clone());
            if query.max_rows() == Some(1) {
                return Ok(self
                    .latest
                    .map(|date| vec![json!({ "date": date })])
                    .unwrap_or_default());
            }
            Ok(vec![json!({"date": "2024-06-01", "technology": "WordPress"})])
        }
    }

    fn params(technology: &[&str]) -> ReportParams {
        ReportParams {
            geo: "ALL".into(),
            rank: "ALL".into(),
            technology: technology.iter().map(|t| t.to_string()).collect(),
            version: vec![ALL_VERSIONS.into()],
            start: None,
            end: None,
        }
    }

    fn service(store: Arc<FakeStore>) -> ReportService {
        ReportService::new(store, Arc::new(ReportCache::new(&CacheConfig::default())))
    }

    #[test]
    fn report_query_projects_data_field() {
        let query = report_query(
            ReportKind::PageWeight,
            &params(&["WordPress"]),
            Some("2024-01-01"),
        );

        assert_eq!(query.collection(), "page_weight");
        assert_eq!(
            query.projection(),
            Some(&["date", "technology", "pageWeight"][..])
        );
        assert!(query.filters().contains(&Filter::Gte {
            field: "date",
            value: json!("2024-01-01"),
        }));
    }

    #[test]
    fn versioned_report_projects_version() {
        let mut versioned = params(&["WordPress"]);
        versioned.version = vec!["6.4".into()];
        let query = report_query(ReportKind::CoreWebVitals, &versioned, None);

        assert_eq!(
            query.projection(),
            Some(&["date", "technology", "vitals", "version"][..])
        );
    }

    #[tokio::test]
    async fn repeated_report_is_served_from_cache() {
        let store = Arc::new(FakeStore::default());
        let service = service(Arc::clone(&store));

        for _ in 0..3 {
            let records = service
                .report(ReportKind::Adoption, &params(&["WordPress"]))
                .await
                .expect("report");
            assert_eq!(records.len(), 1);
        }

        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn latest_start_resolves_through_memoizer() {
        let store = Arc::new(FakeStore {
            latest: Some("2024-06-01"),
            ..Default::default()
        });
        let service = service(Arc::clone(&store));
        let mut latest = params(&["WordPress"]);
        latest.start = Some(StartDate::Latest);

        service.report(ReportKind::Lighthouse, &latest).await.expect("report");
        service.report(ReportKind::Lighthouse, &latest).await.expect("report");

        let seen = store.seen.lock().expect("seen lock");
        // one latest-date lookup, one report query
        assert_eq!(seen.len(), 2);
        assert!(seen[1].filters().contains(&Filter::Gte {
            field: "date",
            value: json!("2024-06-01"),
        }));
    }

    #[tokio::test]
    async fn empty_table_yields_no_start_bound() {
        let store = Arc::new(FakeStore::default());
        let service = service(Arc::clone(&store));

        assert_eq!(service.latest_date("audits").await.expect("lookup"), None);
        assert_eq!(service.latest_date("audits").await.expect("lookup"), None);
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }
}
