//! # Request Metrics
//!
//! In-process request and error counters (atomic), plus the names of the
//! domain counters recorded through the `metrics` facade. When
//! `METRICS_ENABLED` is set, a Prometheus recorder is installed at startup
//! and `/metrics` renders everything recorded.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub const BATCHES_CREATED: &str = "agricert_batches_created_total";
pub const CREDENTIALS_ISSUED: &str = "agricert_credentials_issued_total";
pub const CREDENTIALS_REVOKED: &str = "agricert_credentials_revoked_total";
pub const VERIFICATIONS: &str = "agricert_verifications_total";
pub const HTTP_REQUESTS: &str = "agricert_http_requests_total";

/// Shared request counters.
#[derive(Debug, Clone)]
pub struct ApiMetrics {
    pub request_count: Arc<AtomicU64>,
    pub error_count: Arc<AtomicU64>,
}

impl ApiMetrics {
    pub fn new() -> Self {
        Self {
            request_count: Arc::new(AtomicU64::new(0)),
            error_count: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn requests(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }
}

impl Default for ApiMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Install the global Prometheus recorder. Only one recorder can exist per
/// process; a second install fails.
pub fn install_prometheus() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| e.to_string())
}

/// Middleware that increments request and error counters.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let metrics = request.extensions().get::<ApiMetrics>().cloned();

    let response = next.run(request).await;
    let status = response.status();

    if let Some(m) = metrics {
        m.request_count.fetch_add(1, Ordering::Relaxed);
        if status.is_server_error() || status.is_client_error() {
            m.error_count.fetch_add(1, Ordering::Relaxed);
        }
    }
    metrics::counter!(HTTP_REQUESTS, "status" => status.as_u16().to_string()).increment(1);

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::middleware::from_fn;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    #[tokio::test]
    async fn counts_requests_and_errors() {
        let metrics = ApiMetrics::new();
        let app = Router::new()
            .route("/ok", get(|| async { "ok" }))
            .route("/bad", get(|| async { StatusCode::BAD_REQUEST }))
            .layer(from_fn(metrics_middleware))
            .layer(axum::Extension(metrics.clone()));

        for uri in ["/ok", "/bad", "/ok"] {
            let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
            app.clone().oneshot(req).await.unwrap();
        }
        assert_eq!(metrics.requests(), 3);
        assert_eq!(metrics.errors(), 1);
    }
}
