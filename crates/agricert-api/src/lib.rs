//! # agricert-api: Export Certification API
//!
//! Axum service that moves export batches through submission, quality
//! inspection and credential issuance, and lets anyone verify a
//! presented credential.
//!
//! ## API Surface
//!
//! | Prefix                 | Module                     | Auth          |
//! |------------------------|----------------------------|---------------|
//! | `/api/batches/*`       | [`routes::batches`]        | bearer        |
//! | `/api/inspections/*`   | [`routes::inspections`]    | bearer        |
//! | `/api/credentials/*`   | [`routes::credentials`]    | bearer        |
//! | `/api/credentials/verify` | [`routes::credentials`] | public        |
//! | `/api/actors/*`        | [`routes::actors`]         | bearer, admin |
//! | `/health/*`, `/metrics`| this module                | public        |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! Cors → TraceLayer → MetricsMiddleware → AuthMiddleware → Handler
//! ```
//!
//! ## OpenAPI
//!
//! Generated by utoipa at `/openapi.json`.

pub mod attachments;
pub mod auth;
pub mod db;
pub mod error;
pub mod extractors;
pub mod lifecycle;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;
pub mod store;

use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware::from_fn;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::auth::AuthConfig;
use crate::middleware::metrics::ApiMetrics;
use crate::state::AppState;

/// Assemble the full application router with all routes and middleware.
///
/// Health checks, `/metrics` and credential verification are mounted
/// outside the auth middleware.
pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig {
        token: state.config.auth_token.clone(),
    };
    if auth_config.token.is_none() {
        tracing::warn!("AUTH_TOKEN not set; every request is treated as admin");
    }
    let metrics = ApiMetrics::new();

    let api = Router::new()
        .merge(routes::batches::router())
        .merge(routes::inspections::router())
        .merge(routes::credentials::router())
        .merge(routes::actors::router())
        .merge(openapi::router())
        .layer(from_fn(auth::auth_middleware))
        .layer(axum::Extension(auth_config));

    let public = Router::new()
        .merge(routes::credentials::public_router())
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness))
        .route("/metrics", get(render_metrics));

    Router::new()
        .merge(public)
        .merge(api)
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(middleware::tracing_layer::layer())
        .layer(CorsLayer::permissive())
        .layer(axum::Extension(metrics))
        .with_state(state)
}

/// Liveness check: 200 while the process runs.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness check: 200 when the ledger backend answers.
async fn readiness(State(state): State<AppState>) -> Response {
    let backend = state.ledger().backend();
    match state.ledger().ping().await {
        Ok(()) => Json(json!({"status": "ready", "backend": backend})).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, backend, "readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"status": "unavailable", "backend": backend})),
            )
                .into_response()
        }
    }
}

/// Prometheus exposition, 404 when metrics are disabled.
async fn render_metrics(State(state): State<AppState>) -> Response {
    match &state.prometheus {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
