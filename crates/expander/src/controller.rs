//! Controller wiring
//!
//! Watches PersistentVolumeClaims and runs one reconciliation pass per
//! trigger. The controller guarantees at most one pass in flight per claim.

use expander_lib::health::{components, HealthRegistry};
use expander_lib::policy::is_opted_in;
use expander_lib::{ClaimKey, PassOutcome, ReconcileError, Reconciler};
use futures::StreamExt;
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher;
use kube::{Api, Client, ResourceExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// State shared by every pass
pub struct Context {
    pub reconciler: Reconciler,
    pub error_requeue: Duration,
}

impl Context {
    pub fn new(reconciler: Reconciler, error_requeue: Duration) -> Self {
        Self {
            reconciler,
            error_requeue,
        }
    }
}

/// Claims without the opt-in marker are left alone until they change
pub async fn reconcile(
    pvc: Arc<PersistentVolumeClaim>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    if !is_opted_in(pvc.annotations()) {
        return Ok(Action::await_change());
    }

    let key = ClaimKey::new(pvc.namespace().unwrap_or_default(), pvc.name_any());
    let outcome = ctx.reconciler.reconcile(&key).await?;
    Ok(action_for(&outcome))
}

pub fn action_for(outcome: &PassOutcome) -> Action {
    match outcome.requeue_after {
        Some(after) => Action::requeue(after),
        None => Action::await_change(),
    }
}

pub fn error_policy(
    pvc: Arc<PersistentVolumeClaim>,
    error: &ReconcileError,
    ctx: Arc<Context>,
) -> Action {
    warn!(
        namespace = %pvc.namespace().unwrap_or_default(),
        claim = %pvc.name_any(),
        error = %error,
        retry_secs = ctx.error_requeue.as_secs(),
        "Pass failed, retrying later"
    );
    Action::requeue(ctx.error_requeue)
}

/// Run until a termination signal arrives
pub async fn run(
    client: Client,
    namespace: Option<&str>,
    ctx: Arc<Context>,
    health: HealthRegistry,
) {
    let claims: Api<PersistentVolumeClaim> = match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    };
    info!(namespace = namespace.unwrap_or("<all>"), "Watching claims");

    Controller::new(claims, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| {
            let health = health.clone();
            async move {
                match result {
                    Ok((object, _)) => {
                        debug!(claim = %object, "Reconciled");
                        health.record_success(components::CONTROLLER).await;
                    }
                    // Watch failures surface here; pass failures are
                    // already logged by the error policy.
                    Err(kube::runtime::controller::Error::ReconcilerFailed(_, _)) => {}
                    Err(e) => {
                        warn!(error = %e, "Controller error");
                        health
                            .record_failure(components::CONTROLLER, e.to_string())
                            .await;
                    }
                }
            }
        })
        .await;
}
