//! Probe and scrape endpoints
//!
//! `/healthz` fails only once a component is unhealthy, `/readyz` also
//! fails before the controller starts, `/metrics` is the text exposition
//! of the default prometheus registry.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use expander_lib::{health::HealthRegistry, observability::ExpanderMetrics};
use prometheus::{Encoder, TextEncoder};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: ExpanderMetrics,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry, metrics: ExpanderMetrics) -> Self {
        Self {
            health_registry,
            metrics,
        }
    }
}

fn probe_code(ok: bool) -> StatusCode {
    if ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn liveness(State(state): State<Arc<AppState>>) -> Response {
    let health = state.health_registry.health().await;
    (probe_code(health.status.is_operational()), Json(health)).into_response()
}

async fn readiness(State(state): State<Arc<AppState>>) -> Response {
    let readiness = state.health_registry.readiness().await;
    (probe_code(readiness.ready), Json(readiness)).into_response()
}

fn encode_registry() -> Result<Vec<u8>, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
    Ok(buffer)
}

async fn scrape() -> Response {
    match encode_registry() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(liveness))
        .route("/readyz", get(readiness))
        .route("/metrics", get(scrape))
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "Serving probes and metrics");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
