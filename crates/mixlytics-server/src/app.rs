use std::sync::Arc;

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::routes;
use crate::state::AppState;

/// Assemble the router: every route, CORS, and request tracing.
pub fn build_app(state: Arc<AppState>) -> Router {
    let cors = if state.config.cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Router::new()
        .route("/health", get(routes::health::health))
        .route("/api/accounts", post(routes::accounts::create_account))
        .route(
            "/api/accounts/{account_id}/metrics",
            post(routes::accounts::ingest_metrics),
        )
        .route(
            "/api/accounts/{account_id}/attribution",
            post(routes::attribution::submit),
        )
        .route(
            "/api/accounts/{account_id}/attribution/latest",
            get(routes::attribution::latest),
        )
        .route(
            "/api/accounts/{account_id}/jobs/{job_id}",
            get(routes::jobs::get_job),
        )
        .route(
            "/api/accounts/{account_id}/forecast",
            get(routes::forecast::forecast).post(routes::forecast::forecast_scenario),
        )
        .route(
            "/api/accounts/{account_id}/optimizer",
            post(routes::optimizer::optimize),
        )
        .route(
            "/api/accounts/{account_id}/optimizer/scenarios",
            post(routes::optimizer::scenarios),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
