//! Health and metrics endpoints.

use crate::error::{Result, VaultifyError};
use crate::metrics::PrometheusMetrics;
use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Router serving `/healthz`, `/readyz` and the metrics at `metrics_path`.
pub fn router(metrics: Arc<PrometheusMetrics>, metrics_path: &str) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route(metrics_path, get(render_metrics))
        .with_state(metrics)
}

async fn healthz() -> &'static str {
    "healthy"
}

async fn readyz() -> &'static str {
    "ready"
}

async fn render_metrics(State(metrics): State<Arc<PrometheusMetrics>>) -> Response {
    match metrics.encode() {
        Ok(body) => (
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Serve `router` on `addr` until `shutdown` is cancelled.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(addr: SocketAddr, router: Router, shutdown: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| VaultifyError::Metrics(format!("bind {addr}: {e}")))?;
    info!(%addr, "Serving health and metrics endpoints");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| VaultifyError::Metrics(e.to_string()))
}
