//! Volume Expander - grows PersistentVolumeClaims before they fill up
//!
//! Watches opted-in claims, polls their usage from Prometheus, raises the
//! requested size past a threshold and restarts the pods that must remount
//! a resized volume.

use anyhow::{Context as _, Result};
use expander_lib::{
    health::{components, HealthRegistry},
    k8s::{KubeClaimStore, KubeEventSink},
    metrics::{BearerToken, MetricsPoller, PrometheusClient},
    observability::{ExpanderMetrics, StructuredLogger},
    PolicyResolver, ReconcilerBuilder,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use volume_expander::{api, config::ExpanderConfig, controller};

const EXPANDER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting volume-expander");

    let config = ExpanderConfig::load()?;
    let defaults = config.policy_defaults()?;
    info!(
        instance = %config.instance,
        watch_namespace = config.watch_namespace.as_deref().unwrap_or("<all>"),
        prometheus_url = %config.prometheus_url,
        "Expander configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::CONTROLLER).await;
    health_registry.register(components::METRICS_SOURCE).await;
    health_registry.register(components::CONTROL_PLANE).await;

    let metrics = ExpanderMetrics::new();
    let logger = StructuredLogger::new(&config.instance);

    let token = BearerToken::from_env(Path::new(&config.token_file));
    if token.is_empty() {
        warn!("No bearer token available for Prometheus");
    }
    let source = PrometheusClient::new(config.prometheus_client_config(), token)
        .context("Failed to create Prometheus client")?;
    let poller = MetricsPoller::new(Arc::new(source))
        .with_metric_names(&config.used_bytes_metric, &config.capacity_bytes_metric)
        .with_metrics(metrics.clone());

    let client = kube::Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let reconciler = ReconcilerBuilder::new()
        .store(Arc::new(KubeClaimStore::new(client.clone())))
        .poller(poller)
        .events(Arc::new(KubeEventSink::new(
            client.clone(),
            Some(config.instance.clone()),
        )))
        .resolver(PolicyResolver::new(defaults))
        .metrics(metrics.clone())
        .logger(logger.clone())
        .health(health_registry.clone())
        .build()?;

    let (stop_api, api_stopped) = tokio::sync::oneshot::channel::<()>();
    let app_state = Arc::new(api::AppState::new(health_registry.clone(), metrics));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state, async {
        let _ = api_stopped.await;
    }));

    logger.log_startup(EXPANDER_VERSION, &format!("0.0.0.0:{}", config.api_port));
    health_registry.set_ready(true).await;

    let ctx = Arc::new(controller::Context::new(reconciler, config.error_requeue()));
    controller::run(
        client,
        config.watch_namespace.as_deref(),
        ctx,
        health_registry.clone(),
    )
    .await;

    health_registry.set_ready(false).await;
    logger.log_shutdown("termination signal received");
    let _ = stop_api.send(());
    match api_handle.await {
        Ok(Err(e)) => warn!(error = %e, "API server failed"),
        Err(e) => warn!(error = %e, "API server task panicked"),
        Ok(Ok(())) => {}
    }
    info!("Shutting down");

    Ok(())
}
