use crate::metrics::MetricsRegistry;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use prometheus_client::encoding::text::encode;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// State shared by the metrics endpoint handlers.
#[derive(Clone)]
pub struct MetricsState {
    pub metrics: Arc<MetricsRegistry>,
    /// Set once shutdown starts; `/health` then reports unavailable.
    pub draining: Arc<AtomicBool>,
    pub start_time: Instant,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_secs: u64,
    pub active_connections: i64,
    pub active_session_channels: i64,
}

pub fn router(state: MetricsState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/livez", get(|| async { "ok" }))
        .with_state(state)
}

/// Serve `/metrics` and `/health` on `listen_addr` until `shutdown` is cancelled.
pub async fn start_metrics_server(
    listen_addr: &str,
    state: MetricsState,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    info!(addr = %listen_addr, "Metrics server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}

async fn metrics_handler(State(state): State<MetricsState>) -> impl IntoResponse {
    let mut buffer = String::new();
    if encode(&mut buffer, &state.metrics.registry).is_err() {
        return (StatusCode::INTERNAL_SERVER_ERROR, "encoding error").into_response();
    }
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        buffer,
    )
        .into_response()
}

async fn health_handler(State(state): State<MetricsState>) -> impl IntoResponse {
    let draining = state.draining.load(Ordering::Relaxed);
    let body = HealthResponse {
        status: if draining { "draining" } else { "ok" },
        uptime_secs: state.start_time.elapsed().as_secs(),
        active_connections: state.metrics.connections_active.get(),
        active_session_channels: state.metrics.active_session_channels.get(),
    };
    let code = if draining {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (code, Json(body))
}
