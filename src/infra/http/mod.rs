//! HTTP surface: routes, error mapping and the shared middleware stack.

mod error;
mod handlers;
mod middleware;
mod state;

pub use error::ApiError;
pub use middleware::RequestContext;
pub use state::ApiState;

use std::time::Duration;

use axum::{
    Router,
    http::{HeaderName, Method, header},
    middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};

use middleware::{common_headers, log_responses, set_request_context};

const CORS_MAX_AGE: Duration = Duration::from_secs(86_400);

/// Every route is reachable both at the root and under `/v1`.
pub fn build_router(state: ApiState) -> Router {
    let routes = api_routes();

    Router::new()
        .merge(routes.clone())
        .nest("/v1", routes)
        .with_state(state)
        .layer(axum_middleware::from_fn(common_headers))
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
        .layer(cors_layer())
}

fn api_routes() -> Router<ApiState> {
    Router::new()
        .route("/", get(handlers::health))
        .route("/technologies", get(handlers::technologies))
        .route("/categories", get(handlers::categories))
        .route("/versions", get(handlers::versions))
        .route("/adoption", get(handlers::adoption))
        .route("/cwv", get(handlers::cwv))
        .route("/lighthouse", get(handlers::lighthouse))
        .route("/page-weight", get(handlers::page_weight))
        .route("/audits", get(handlers::audits))
        .route("/geos", get(handlers::geos))
        .route("/ranks", get(handlers::ranks))
        .route("/cache-stats", get(handlers::cache_stats))
        .route("/cache-reset", post(handlers::cache_reset))
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static("timing-allow-origin"),
        ])
        .max_age(CORS_MAX_AGE)
}
