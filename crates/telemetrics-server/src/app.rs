use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{routes, state::AppState};

/// Construct the Axum [`Router`] with all routes and middleware attached.
///
/// Middleware is applied in outer-to-inner order (outermost runs first on
/// request, last on response):
///
/// 1. `TraceLayer` — structured request/response logging via `tracing`.
/// 2. `CorsLayer` — permissive CORS; the bulk endpoint is called by clients
///    on arbitrary networks.
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health::health))
        .route("/api/metrics", get(routes::metrics::list))
        .route("/api/metrics/bulk", post(routes::bulk::bulk))
        .route("/api/metrics/types", get(routes::metrics::types))
        .route("/api/metrics/versions", get(routes::metrics::versions))
        .route("/api/metrics/{id}", get(routes::metrics::read))
        .route("/api/geolocation/backfill", post(routes::geolocation::backfill))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
