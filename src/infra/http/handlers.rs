use axum::Json;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::application::error::QueryError;
use crate::application::params::{
    CategoryFilter, CategoryQueryParams, ReportParams, ReportQueryParams, TechnologyFilter,
    TechnologyQueryParams, VersionFilter, VersionQueryParams,
};
use crate::application::reports::ReportKind;
use crate::cache::Records;

use super::error::ApiError;
use super::state::ApiState;

const SOURCE: &str = "infra::http::handlers";

/// Cache introspection is live state and must not be stored by intermediaries.
const NO_STORE: &str = "no-store";

type ApiResult = Result<Response, ApiError>;

fn records(rows: Records) -> Response {
    Json(rows.as_slice()).into_response()
}

fn failed(resource: &'static str) -> impl FnOnce(QueryError) -> ApiError {
    move |error| ApiError::new(SOURCE, resource, error)
}

pub async fn health() -> Response {
    Json(json!({ "status": "ok" })).into_response()
}

pub async fn technologies(
    State(state): State<ApiState>,
    Query(raw): Query<TechnologyQueryParams>,
) -> ApiResult {
    let filter = TechnologyFilter::from_query(&raw).map_err(failed("technologies"))?;
    let rows = state
        .catalog
        .technologies(&filter)
        .await
        .map_err(failed("technologies"))?;
    Ok(records(rows))
}

pub async fn categories(
    State(state): State<ApiState>,
    Query(raw): Query<CategoryQueryParams>,
) -> ApiResult {
    let filter = CategoryFilter::from_query(&raw).map_err(failed("categories"))?;
    let rows = state
        .catalog
        .categories(&filter)
        .await
        .map_err(failed("categories"))?;
    Ok(records(rows))
}

pub async fn versions(
    State(state): State<ApiState>,
    Query(raw): Query<VersionQueryParams>,
) -> ApiResult {
    let filter = VersionFilter::from_query(&raw).map_err(failed("versions"))?;
    let rows = state
        .catalog
        .versions(&filter)
        .await
        .map_err(failed("versions"))?;
    Ok(records(rows))
}

async fn report(state: ApiState, kind: ReportKind, raw: ReportQueryParams) -> ApiResult {
    let params = ReportParams::from_query(&raw).map_err(failed(kind.resource()))?;
    let rows = state
        .reports
        .report(kind, &params)
        .await
        .map_err(failed(kind.resource()))?;
    Ok(records(rows))
}

pub async fn adoption(
    State(state): State<ApiState>,
    Query(raw): Query<ReportQueryParams>,
) -> ApiResult {
    report(state, ReportKind::Adoption, raw).await
}

pub async fn cwv(State(state): State<ApiState>, Query(raw): Query<ReportQueryParams>) -> ApiResult {
    report(state, ReportKind::CoreWebVitals, raw).await
}

pub async fn lighthouse(
    State(state): State<ApiState>,
    Query(raw): Query<ReportQueryParams>,
) -> ApiResult {
    report(state, ReportKind::Lighthouse, raw).await
}

pub async fn page_weight(
    State(state): State<ApiState>,
    Query(raw): Query<ReportQueryParams>,
) -> ApiResult {
    report(state, ReportKind::PageWeight, raw).await
}

pub async fn audits(
    State(state): State<ApiState>,
    Query(raw): Query<ReportQueryParams>,
) -> ApiResult {
    report(state, ReportKind::Audits, raw).await
}

pub async fn geos(State(state): State<ApiState>) -> ApiResult {
    let rows = state
        .lookups
        .geos()
        .await
        .map_err(failed("geographic locations"))?;
    Ok(records(rows))
}

pub async fn ranks(State(state): State<ApiState>) -> ApiResult {
    let rows = state.lookups.ranks().await.map_err(failed("ranks"))?;
    Ok(records(rows))
}

pub async fn cache_stats(State(state): State<ApiState>) -> impl IntoResponse {
    ([(header::CACHE_CONTROL, NO_STORE)], Json(state.cache.stats()))
}

pub async fn cache_reset(State(state): State<ApiState>) -> impl IntoResponse {
    ([(header::CACHE_CONTROL, NO_STORE)], Json(state.cache.reset()))
}
