//! The reconciliation pass as an explicit state machine

use super::{ClaimEvent, ClaimStore, EventSink, LogEventSink, PassOutcome, PassResult};
use crate::disruption;
use crate::error::{MetricsError, ReconcileError};
use crate::health::{components, HealthRegistry};
use crate::metrics::MetricsPoller;
use crate::models::{ClaimKey, MetricsSample, StorageClaim};
use crate::observability::{ExpanderMetrics, StructuredLogger};
use crate::planner;
use crate::policy::{AutoscalePolicy, PolicyResolver};
use crate::quantity::Quantity;
use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace, warn};

/// State of a pass. Each variant carries what the following steps need.
#[derive(Debug)]
pub enum Step {
    Fetch,
    ResolvePolicy {
        claim: StorageClaim,
    },
    PollMetrics {
        claim: StorageClaim,
        policy: AutoscalePolicy,
    },
    PlanCapacity {
        claim: StorageClaim,
        policy: AutoscalePolicy,
        sample: MetricsSample,
    },
    ApplyUpdate {
        claim: StorageClaim,
        policy: AutoscalePolicy,
        sample: MetricsSample,
        target: Quantity,
    },
    CheckDrift {
        claim: StorageClaim,
        policy: AutoscalePolicy,
    },
    SelectAndEvict {
        claim: StorageClaim,
        policy: AutoscalePolicy,
    },
    ScheduleRetry {
        policy: AutoscalePolicy,
        result: PassResult,
    },
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::Fetch => "fetch",
            Step::ResolvePolicy { .. } => "resolve_policy",
            Step::PollMetrics { .. } => "poll_metrics",
            Step::PlanCapacity { .. } => "plan_capacity",
            Step::ApplyUpdate { .. } => "apply_update",
            Step::CheckDrift { .. } => "check_drift",
            Step::SelectAndEvict { .. } => "select_and_evict",
            Step::ScheduleRetry { .. } => "schedule_retry",
        }
    }
}

/// Step transition: either move on or finish the pass
enum Transition {
    Next(Step),
    Finish(PassOutcome),
}

/// Runs reconciliation passes for individual claims.
///
/// Holds no per-claim state, so passes for different claims can run
/// concurrently on a shared instance.
pub struct Reconciler {
    store: Arc<dyn ClaimStore>,
    poller: MetricsPoller,
    events: Arc<dyn EventSink>,
    resolver: PolicyResolver,
    metrics: ExpanderMetrics,
    logger: StructuredLogger,
    health: Option<HealthRegistry>,
}

impl Reconciler {
    pub fn resolver(&self) -> &PolicyResolver {
        &self.resolver
    }

    /// Run one pass for `key`
    pub async fn reconcile(&self, key: &ClaimKey) -> Result<PassOutcome, ReconcileError> {
        let start = Instant::now();
        let outcome = self.run(key).await;
        self.metrics.observe_pass_duration(start.elapsed());

        match &outcome {
            Ok(outcome) => {
                self.metrics.inc_pass(outcome.result.label());
                debug!(
                    claim = %key,
                    result = outcome.result.label(),
                    requeue_after_secs = outcome.requeue_after.map(|d| d.as_secs()),
                    "Pass complete"
                );
            }
            Err(e) => {
                self.metrics.inc_pass_error(e.kind());
                self.logger
                    .log_pass_failed(&key.namespace, &key.name, e.kind(), &e.to_string());
            }
        }

        outcome
    }

    async fn run(&self, key: &ClaimKey) -> Result<PassOutcome, ReconcileError> {
        let mut step = Step::Fetch;
        loop {
            trace!(claim = %key, step = step.name(), "Entering step");
            match self.advance(key, step).await? {
                Transition::Next(next) => step = next,
                Transition::Finish(outcome) => return Ok(outcome),
            }
        }
    }

    async fn advance(&self, key: &ClaimKey, step: Step) -> Result<Transition, ReconcileError> {
        let next = match step {
            Step::Fetch => match self.fetch(key).await? {
                Some(claim) => Step::ResolvePolicy { claim },
                None => {
                    debug!(claim = %key, "Claim not found, nothing to do");
                    return Ok(Transition::Finish(PassOutcome::done(PassResult::Gone)));
                }
            },

            Step::ResolvePolicy { claim } => {
                let policy = self.resolver.resolve(&claim.annotations);
                Step::PollMetrics { claim, policy }
            }

            Step::PollMetrics { claim, policy } => {
                match self.poll(&claim).await? {
                    Some(sample) if sample.available => Step::PlanCapacity {
                        claim,
                        policy,
                        sample,
                    },
                    Some(_) => Step::ScheduleRetry {
                        policy,
                        result: PassResult::MetricsPending,
                    },
                    None => Step::ScheduleRetry {
                        policy,
                        result: PassResult::MetricsUnavailable,
                    },
                }
            }

            Step::PlanCapacity {
                claim,
                policy,
                sample,
            } => match planner::plan(&sample, &policy, &claim.requested) {
                Some(target) => Step::ApplyUpdate {
                    claim,
                    policy,
                    sample,
                    target,
                },
                None => Step::CheckDrift { claim, policy },
            },

            Step::ApplyUpdate {
                claim,
                policy,
                sample,
                target,
            } => {
                let result = self.apply_update(claim, &sample, target).await?;
                Step::ScheduleRetry { policy, result }
            }

            Step::CheckDrift { claim, policy } => {
                if disruption::has_drift(&claim) {
                    Step::SelectAndEvict { claim, policy }
                } else {
                    Step::ScheduleRetry {
                        policy,
                        result: PassResult::Steady,
                    }
                }
            }

            Step::SelectAndEvict { claim, policy } => {
                let result = self.evict(&claim).await;
                Step::ScheduleRetry { policy, result }
            }

            Step::ScheduleRetry { policy, result } => {
                return Ok(Transition::Finish(PassOutcome::requeue(
                    result,
                    policy.polling_interval,
                )));
            }
        };
        Ok(Transition::Next(next))
    }

    async fn fetch(&self, key: &ClaimKey) -> Result<Option<StorageClaim>, ReconcileError> {
        match self.store.get(key).await {
            Ok(claim) => {
                self.health_success(components::CONTROL_PLANE).await;
                Ok(claim)
            }
            Err(source) => {
                self.health_failure(components::CONTROL_PLANE, &source).await;
                Err(ReconcileError::Fetch {
                    key: key.clone(),
                    source,
                })
            }
        }
    }

    /// `Ok(None)` when the metrics source is unreachable
    async fn poll(&self, claim: &StorageClaim) -> Result<Option<MetricsSample>, ReconcileError> {
        match self.poller.poll(&claim.key).await {
            Ok(sample) => {
                self.health_success(components::METRICS_SOURCE).await;
                Ok(Some(sample))
            }
            Err(e @ MetricsError::Unavailable { .. }) => {
                warn!(claim = %claim.key, error = %e, "Metrics source unavailable, will retry");
                self.health_failure(components::METRICS_SOURCE, &e).await;
                Ok(None)
            }
            Err(e) => {
                self.health_failure(components::METRICS_SOURCE, &e).await;
                self.events
                    .publish(claim, ClaimEvent::unable_to_expand(&e))
                    .await;
                Err(ReconcileError::Metrics {
                    key: claim.key.clone(),
                    source: e,
                })
            }
        }
    }

    async fn apply_update(
        &self,
        claim: StorageClaim,
        sample: &MetricsSample,
        target: Quantity,
    ) -> Result<PassResult, ReconcileError> {
        let from = claim.requested;
        let mut updated = claim;
        updated.requested = target;

        if let Err(source) = self.store.update(&updated).await {
            self.health_failure(components::CONTROL_PLANE, &source).await;
            self.events
                .publish(&updated, ClaimEvent::unable_to_expand(&source))
                .await;
            return Err(ReconcileError::Update {
                key: updated.key,
                source,
            });
        }
        self.health_success(components::CONTROL_PLANE).await;

        self.metrics.inc_expansions();
        self.logger.log_expansion(
            &updated.key.namespace,
            &updated.key.name,
            sample.used_bytes,
            sample.capacity_bytes,
            &from.to_string(),
            &target.to_string(),
        );
        self.events
            .publish(&updated, ClaimEvent::expansion_requested(&from, &target))
            .await;

        Ok(PassResult::Expanded { from, to: target })
    }

    /// Best effort: every candidate is attempted once
    async fn evict(&self, claim: &StorageClaim) -> PassResult {
        let workloads = match self.store.list_workloads(&claim.key.namespace).await {
            Ok(workloads) => workloads,
            Err(e) => {
                warn!(claim = %claim.key, error = %e, "Unable to list workloads");
                self.health_failure(components::CONTROL_PLANE, &e).await;
                self.events
                    .publish(claim, ClaimEvent::unable_to_disrupt(&e))
                    .await;
                return PassResult::Disrupted {
                    deleted: 0,
                    failed: 0,
                };
            }
        };

        let candidates = disruption::select(claim, &workloads);
        debug!(
            claim = %claim.key,
            requested = %claim.requested,
            candidates = candidates.len(),
            "Resize pending"
        );

        let (mut deleted, mut failed) = (0, 0);
        for workload in &candidates {
            match self.store.delete_workload(workload).await {
                Ok(()) => {
                    deleted += 1;
                    self.logger.log_disruption(
                        &claim.key.namespace,
                        &claim.key.name,
                        &workload.name,
                        None,
                    );
                    self.events
                        .publish(claim, ClaimEvent::workload_disrupted(workload))
                        .await;
                }
                Err(e) => {
                    failed += 1;
                    self.logger.log_disruption(
                        &claim.key.namespace,
                        &claim.key.name,
                        &workload.name,
                        Some(&e.to_string()),
                    );
                    self.health_failure(components::CONTROL_PLANE, &e).await;
                    self.events
                        .publish(claim, ClaimEvent::unable_to_disrupt(&e))
                        .await;
                }
            }
        }
        self.metrics.inc_disruptions(deleted, failed);

        PassResult::Disrupted { deleted, failed }
    }

    async fn health_success(&self, component: &str) {
        if let Some(health) = &self.health {
            health.record_success(component).await;
        }
    }

    async fn health_failure(&self, component: &str, error: &(dyn std::fmt::Display + Sync)) {
        if let Some(health) = &self.health {
            health.record_failure(component, error.to_string()).await;
        }
    }
}

/// Builder for a [`Reconciler`]
pub struct ReconcilerBuilder {
    store: Option<Arc<dyn ClaimStore>>,
    poller: Option<MetricsPoller>,
    events: Option<Arc<dyn EventSink>>,
    resolver: PolicyResolver,
    metrics: Option<ExpanderMetrics>,
    logger: Option<StructuredLogger>,
    health: Option<HealthRegistry>,
}

impl ReconcilerBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            poller: None,
            events: None,
            resolver: PolicyResolver::default(),
            metrics: None,
            logger: None,
            health: None,
        }
    }

    /// Set the control-plane store
    pub fn store(mut self, store: Arc<dyn ClaimStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the metrics poller
    pub fn poller(mut self, poller: MetricsPoller) -> Self {
        self.poller = Some(poller);
        self
    }

    /// Set the event sink; events are only logged otherwise
    pub fn events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    /// Set the policy resolver
    pub fn resolver(mut self, resolver: PolicyResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn metrics(mut self, metrics: ExpanderMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Report component health to `health`
    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Build the reconciler
    pub fn build(self) -> Result<Reconciler> {
        let store = self
            .store
            .ok_or_else(|| anyhow::anyhow!("Claim store is required"))?;
        let poller = self
            .poller
            .ok_or_else(|| anyhow::anyhow!("Metrics poller is required"))?;

        Ok(Reconciler {
            store,
            poller,
            events: self.events.unwrap_or_else(|| Arc::new(LogEventSink)),
            resolver: self.resolver,
            metrics: self.metrics.unwrap_or_default(),
            logger: self
                .logger
                .unwrap_or_else(|| StructuredLogger::new("volume-expander")),
            health: self.health,
        })
    }
}

impl Default for ReconcilerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
