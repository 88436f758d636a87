use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Map, Value, json};
use tower::ServiceExt;

use tech_report_api::application::repos::{
    DocumentQuery, DocumentStore, Filter, LookupStore, SortDirection, StoreError,
};
use tech_report_api::cache::{CacheConfig, ReportCache};
use tech_report_api::infra::http::{ApiState, build_router};

/// Evaluates document queries over a fixed set of documents.
#[derive(Default)]
struct MemoryDocuments {
    docs: Vec<(&'static str, Value)>,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryDocuments {
    fn with(docs: Vec<(&'static str, Value)>) -> Self {
        Self {
            docs,
            ..Default::default()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn matches(doc: &Value, filter: &Filter) -> bool {
    let current = doc.get(filter.field());
    match (filter, current) {
        (Filter::Eq { value, .. }, Some(current)) => current == value,
        (Filter::In { values, .. }, Some(current)) => values.contains(current),
        (Filter::ArrayContainsAny { values, .. }, Some(Value::Array(items))) => {
            items.iter().any(|item| values.contains(item))
        }
        (Filter::Gte { value, .. }, Some(current)) => text(current) >= text(value),
        (Filter::Lte { value, .. }, Some(current)) => text(current) <= text(value),
        _ => false,
    }
}

fn project(doc: &Value, fields: Option<&[&'static str]>) -> Value {
    let Some(fields) = fields else {
        return doc.clone();
    };
    let mut projected = Map::new();
    for field in fields {
        if let Some(value) = doc.get(*field) {
            projected.insert(field.to_string(), value.clone());
        }
    }
    Value::Object(projected)
}

#[async_trait]
impl DocumentStore for MemoryDocuments {
    async fn find(&self, query: &DocumentQuery) -> Result<Vec<Value>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::from_persistence("connection refused"));
        }

        let mut rows: Vec<&Value> = self
            .docs
            .iter()
            .filter(|(collection, _)| *collection == query.collection())
            .map(|(_, doc)| doc)
            .filter(|doc| query.filters().iter().all(|filter| matches(doc, filter)))
            .collect();

        if let Some((field, direction)) = query.ordering() {
            rows.sort_by(|a, b| {
                let ordering = a
                    .get(field)
                    .map(text)
                    .cmp(&b.get(field).map(text));
                match direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            });
        }
        if let Some(limit) = query.max_rows() {
            rows.truncate(limit as usize);
        }

        Ok(rows
            .into_iter()
            .map(|doc| project(doc, query.projection()))
            .collect())
    }
}

#[derive(Default)]
struct StaticLookups {
    calls: AtomicUsize,
}

#[async_trait]
impl LookupStore for StaticLookups {
    async fn geos(&self) -> Result<Vec<Value>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![json!({"geo": "ALL"}), json!({"geo": "Japan"})])
    }

    async fn ranks(&self) -> Result<Vec<Value>, StoreError> {
        Err(StoreError::analytics("quota exceeded"))
    }
}

fn fixture_documents() -> Vec<(&'static str, Value)> {
    vec![
        (
            "technologies",
            json!({
                "technology": "WordPress",
                "category": "CMS, Blogs",
                "category_obj": ["CMS", "Blogs"],
                "description": "Blogging platform",
                "icon": "WordPress.svg",
                "origins": {"mobile": 100, "desktop": 90},
                "internal": true
            }),
        ),
        (
            "technologies",
            json!({
                "technology": "Drupal",
                "category": "CMS",
                "category_obj": ["CMS"],
                "description": "Content management",
                "icon": "Drupal.svg",
                "origins": {"mobile": 50, "desktop": 40}
            }),
        ),
        (
            "technologies",
            json!({
                "technology": "jQuery",
                "category": "JavaScript libraries",
                "category_obj": ["JavaScript libraries"],
                "description": "JS library",
                "icon": "jQuery.svg",
                "origins": {"mobile": 500, "desktop": 400}
            }),
        ),
        ("categories", json!({"category": "CMS", "description": "Content"})),
        ("categories", json!({"category": "Blogs", "description": "Writing"})),
        ("versions", json!({"technology": "WordPress", "version": "6.4"})),
        ("versions", json!({"technology": "Drupal", "version": "10"})),
        (
            "adoption",
            json!({"date": "2024-01-01", "geo": "ALL", "rank": "ALL", "technology": "WordPress",
                   "version": "ALL", "adoption": {"mobile": 1}}),
        ),
        (
            "adoption",
            json!({"date": "2024-02-01", "geo": "ALL", "rank": "ALL", "technology": "WordPress",
                   "version": "ALL", "adoption": {"mobile": 2}}),
        ),
        (
            "adoption",
            json!({"date": "2024-02-01", "geo": "Japan", "rank": "ALL", "technology": "WordPress",
                   "version": "ALL", "adoption": {"mobile": 3}}),
        ),
        (
            "lighthouse",
            json!({"date": "2024-03-01", "geo": "ALL", "rank": "ALL", "technology": "WordPress",
                   "version": "6.4", "lighthouse": [{"name": "performance"}]}),
        ),
    ]
}

struct Harness {
    router: Router,
    documents: Arc<MemoryDocuments>,
    lookups: Arc<StaticLookups>,
}

fn harness() -> Harness {
    let documents = Arc::new(MemoryDocuments::with(fixture_documents()));
    let lookups = Arc::new(StaticLookups::default());
    let cache = Arc::new(ReportCache::new(&CacheConfig::default()));
    let state = ApiState::new(documents.clone(), lookups.clone(), cache);
    Harness {
        router: build_router(state),
        documents,
        lookups,
    }
}

async fn send(router: &Router, method: Method, uri: &str) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("router response");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, body)
}

async fn get(router: &Router, uri: &str) -> (StatusCode, Value) {
    send(router, Method::GET, uri).await
}

#[tokio::test]
async fn health_reports_ok_with_common_headers() {
    let harness = harness();
    let response = harness
        .router
        .clone()
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers[header::CONTENT_TYPE], "application/json");
    assert_eq!(headers[header::CACHE_CONTROL], "public, max-age=21600");
    assert_eq!(headers["timing-allow-origin"], "*");

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body, json!({"status": "ok"}));
}

#[tokio::test]
async fn routes_are_mirrored_under_v1() {
    let harness = harness();

    let (root_status, root) = get(&harness.router, "/categories?onlyname").await;
    let (v1_status, v1) = get(&harness.router, "/v1/categories?onlyname").await;

    assert_eq!(root_status, StatusCode::OK);
    assert_eq!(v1_status, StatusCode::OK);
    assert_eq!(root, json!(["Blogs", "CMS"]));
    assert_eq!(root, v1);
    assert_eq!(harness.documents.calls(), 1, "second call is a cache hit");
}

#[tokio::test]
async fn technologies_filter_by_category_and_present_public_fields() {
    let harness = harness();

    let (status, body) = get(&harness.router, "/technologies?category=Blogs").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!([{
            "technology": "WordPress",
            "category": "CMS, Blogs",
            "description": "Blogging platform",
            "icon": "WordPress.svg",
            "origins": {"mobile": 100, "desktop": 90}
        }])
    );
}

#[tokio::test]
async fn technologies_onlyname_lists_sorted_names() {
    let harness = harness();

    let (status, body) = get(&harness.router, "/technologies?category=CMS&onlyname").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(["Drupal", "WordPress"]));
}

#[tokio::test]
async fn onlyname_variants_are_cached_separately() {
    let harness = harness();

    let (_, names) = get(&harness.router, "/technologies?technology=Drupal&onlyname").await;
    let (_, full) = get(&harness.router, "/technologies?technology=Drupal").await;

    assert_eq!(names, json!(["Drupal"]));
    assert_eq!(full[0]["technology"], json!("Drupal"));
    assert_eq!(harness.documents.calls(), 2);
}

#[tokio::test]
async fn versions_filter_by_technology() {
    let harness = harness();

    let (status, body) = get(&harness.router, "/versions?technology=Drupal").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([{"technology": "Drupal", "version": "10"}]));
}

#[tokio::test]
async fn report_requires_every_missing_parameter() {
    let harness = harness();

    let (status, body) = get(&harness.router, "/adoption?rank=ALL").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({
            "success": false,
            "errors": [
                {"geo": "missing geo parameter"},
                {"technology": "missing technology parameter"}
            ]
        })
    );
    assert_eq!(harness.documents.calls(), 0);
}

#[tokio::test]
async fn report_rejects_too_many_technologies() {
    let harness = harness();
    let technologies: Vec<String> = (0..31).map(|i| format!("tech{i}")).collect();
    let uri = format!(
        "/cwv?geo=ALL&rank=ALL&technology={}",
        technologies.join(",")
    );

    let (status, body) = get(&harness.router, &uri).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["errors"][0]["technology"],
        json!("Too many values specified for technology. Maximum 30 allowed.")
    );
}

#[tokio::test]
async fn adoption_report_filters_and_projects() {
    let harness = harness();

    let (status, body) = get(
        &harness.router,
        "/adoption?geo=ALL&rank=ALL&technology=WordPress&start=2024-02-01",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!([{"date": "2024-02-01", "technology": "WordPress", "adoption": {"mobile": 2}}])
    );
}

#[tokio::test]
async fn latest_start_resolves_once_per_table() {
    let harness = harness();
    let uri = "/lighthouse?geo=ALL&rank=ALL&technology=WordPress&version=6.4&start=latest";

    let (status, body) = get(&harness.router, uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!([{
            "date": "2024-03-01",
            "technology": "WordPress",
            "version": "6.4",
            "lighthouse": [{"name": "performance"}]
        }])
    );
    assert_eq!(harness.documents.calls(), 2, "latest-date lookup plus report query");

    let (_, again) = get(&harness.router, uri).await;
    assert_eq!(again, body);
    assert_eq!(harness.documents.calls(), 2);
}

#[tokio::test]
async fn backend_failures_use_generic_message() {
    let harness = harness();
    harness.documents.failing.store(true, Ordering::SeqCst);

    let (status, body) = get(
        &harness.router,
        "/page-weight?geo=ALL&rank=ALL&technology=WordPress",
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body,
        json!({"errors": [{"error": "Failed to fetch pageWeight data"}]})
    );
}

#[tokio::test]
async fn failures_are_not_cached() {
    let harness = harness();
    harness.documents.failing.store(true, Ordering::SeqCst);
    let (status, _) = get(&harness.router, "/categories").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    harness.documents.failing.store(false, Ordering::SeqCst);
    let (status, body) = get(&harness.router, "/categories").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(2));
    assert_eq!(harness.documents.calls(), 2);
}

#[tokio::test]
async fn geos_are_cached_and_ranks_fail_generically() {
    let harness = harness();

    let (status, geos) = get(&harness.router, "/geos").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(geos, json!([{"geo": "ALL"}, {"geo": "Japan"}]));
    let _ = get(&harness.router, "/v1/geos").await;
    assert_eq!(harness.lookups.calls.load(Ordering::SeqCst), 1);

    let (status, ranks) = get(&harness.router, "/ranks").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(ranks, json!({"errors": [{"error": "Failed to fetch ranks"}]}));
}

#[tokio::test]
async fn cache_stats_and_reset_report_sizes() {
    let harness = harness();
    let _ = get(&harness.router, "/categories").await;
    let _ = get(
        &harness.router,
        "/audits?geo=ALL&rank=ALL&technology=WordPress&start=latest",
    )
    .await;

    let (status, stats) = get(&harness.router, "/cache-stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["resultCache"]["total"], json!(2));
    assert_eq!(stats["resultCache"]["live"], json!(2));
    assert_eq!(stats["resultCache"]["ttl"], json!(3600));
    assert_eq!(stats["dateCache"]["total"], json!(1));
    assert_eq!(stats["config"]["maxSize"], json!(5000));
    assert_eq!(
        stats["config"]["evictionStrategy"],
        json!("expired-first-then-oldest")
    );

    let (status, reset) = send(&harness.router, Method::POST, "/cache-reset").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        reset,
        json!({
            "before": {"resultCache": 2, "dateCache": 1},
            "after": {"resultCache": 0, "dateCache": 0}
        })
    );

    let (_, stats) = get(&harness.router, "/cache-stats").await;
    assert_eq!(stats["resultCache"]["total"], json!(0));
}

#[tokio::test]
async fn cache_introspection_is_never_stored() {
    let harness = harness();
    for (method, uri) in [(Method::GET, "/cache-stats"), (Method::POST, "/v1/cache-reset")] {
        let response = harness
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK, "{uri}");
        let headers = response.headers();
        assert_eq!(headers[header::CACHE_CONTROL], "no-store", "{uri}");
        assert_eq!(headers.get_all(header::CACHE_CONTROL).iter().count(), 1);
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
    }
}

#[tokio::test]
async fn cors_preflight_is_answered() {
    let harness = harness();
    let response = harness
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/adoption")
                .header(header::ORIGIN, "https://example.org")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(headers[header::ACCESS_CONTROL_MAX_AGE], "86400");
    let methods = headers[header::ACCESS_CONTROL_ALLOW_METHODS]
        .to_str()
        .unwrap()
        .to_ascii_uppercase();
    assert!(methods.contains("GET"));
    assert!(methods.contains("OPTIONS"));
}
