//! Kubernetes adapter
//!
//! Maps PersistentVolumeClaims and Pods onto the core models and implements
//! the reconciler's collaborators on top of `kube`.

use crate::error::ControlPlaneError;
use crate::models::{ClaimKey, StorageClaim, WorkloadPhase, WorkloadRef};
use crate::quantity::Quantity;
use crate::reconcile::{ClaimEvent, ClaimStore, EventKind, EventSink};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ObjectReference, PersistentVolumeClaim, Pod};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity as KubeQuantity;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams};
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Resource name of storage in requests and capacity maps
const STORAGE: &str = "storage";

/// Controller name used as the event reporter and field manager
pub const CONTROLLER_NAME: &str = "volume-expander";

/// Convert a PVC; `None` if it has no name, namespace or storage request
pub fn claim_from_pvc(pvc: &PersistentVolumeClaim) -> Option<StorageClaim> {
    let name = pvc.metadata.name.clone()?;
    let namespace = pvc.metadata.namespace.clone()?;

    let requested = pvc
        .spec
        .as_ref()
        .and_then(|spec| spec.resources.as_ref())
        .and_then(|resources| resources.requests.as_ref())
        .and_then(storage_quantity)?;

    let provisioned = pvc
        .status
        .as_ref()
        .and_then(|status| status.capacity.as_ref())
        .and_then(storage_quantity);

    Some(StorageClaim {
        key: ClaimKey::new(namespace, name),
        uid: pvc.metadata.uid.clone(),
        resource_version: pvc.metadata.resource_version.clone(),
        annotations: pvc.metadata.annotations.clone().unwrap_or_default(),
        requested,
        provisioned,
    })
}

fn storage_quantity(resources: &BTreeMap<String, KubeQuantity>) -> Option<Quantity> {
    let raw = resources.get(STORAGE)?;
    match raw.0.parse() {
        Ok(quantity) => Some(quantity),
        Err(e) => {
            warn!(quantity = %raw.0, error = %e, "Ignoring unparsable storage quantity");
            None
        }
    }
}

/// Convert a Pod; every PVC-backed volume counts as an attachment
pub fn workload_from_pod(pod: &Pod) -> WorkloadRef {
    let claim_names = pod
        .spec
        .as_ref()
        .and_then(|spec| spec.volumes.as_ref())
        .map(|volumes| {
            volumes
                .iter()
                .filter_map(|v| v.persistent_volume_claim.as_ref())
                .map(|source| source.claim_name.clone())
                .collect()
        })
        .unwrap_or_default();

    WorkloadRef {
        namespace: pod.metadata.namespace.clone().unwrap_or_default(),
        name: pod.metadata.name.clone().unwrap_or_default(),
        phase: WorkloadPhase::from_phase(
            pod.status.as_ref().and_then(|status| status.phase.as_deref()),
        ),
        claim_names,
    }
}

/// Reference to the claim used when attaching events
pub fn object_reference(claim: &StorageClaim) -> ObjectReference {
    ObjectReference {
        api_version: Some("v1".to_string()),
        kind: Some("PersistentVolumeClaim".to_string()),
        name: Some(claim.key.name.clone()),
        namespace: Some(claim.key.namespace.clone()),
        uid: claim.uid.clone(),
        resource_version: claim.resource_version.clone(),
        ..Default::default()
    }
}

/// Merge patch that sets the requested storage.
///
/// Carries the resource version the claim was read at, so a concurrent
/// change makes the apiserver reject the patch with a conflict.
pub fn resize_patch(claim: &StorageClaim) -> serde_json::Value {
    let mut patch = json!({
        "spec": {
            "resources": {
                "requests": { (STORAGE): claim.requested.to_string() }
            }
        }
    });
    if let Some(version) = &claim.resource_version {
        patch["metadata"] = json!({ "resourceVersion": version });
    }
    patch
}

fn is_not_found(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(response) if response.code == 404)
}

/// [`ClaimStore`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeClaimStore {
    client: Client,
}

impl KubeClaimStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn claims(&self, namespace: &str) -> Api<PersistentVolumeClaim> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }

    /// Claims in `namespace`, or in every namespace
    pub async fn list_claims(
        &self,
        namespace: Option<&str>,
    ) -> Result<Vec<StorageClaim>, ControlPlaneError> {
        let api: Api<PersistentVolumeClaim> = match namespace {
            Some(ns) => self.claims(ns),
            None => Api::all(self.client.clone()),
        };
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|e| ControlPlaneError::new("list claims", e))?;
        Ok(list.items.iter().filter_map(claim_from_pvc).collect())
    }
}

#[async_trait]
impl ClaimStore for KubeClaimStore {
    async fn get(&self, key: &ClaimKey) -> Result<Option<StorageClaim>, ControlPlaneError> {
        let pvc = self
            .claims(&key.namespace)
            .get_opt(&key.name)
            .await
            .map_err(|e| ControlPlaneError::new("get claim", e))?;

        match pvc {
            None => Ok(None),
            Some(pvc) => claim_from_pvc(&pvc).map(Some).ok_or_else(|| {
                ControlPlaneError::new("get claim", format!("{} has no storage request", key))
            }),
        }
    }

    async fn update(&self, claim: &StorageClaim) -> Result<(), ControlPlaneError> {
        let params = PatchParams {
            field_manager: Some(CONTROLLER_NAME.to_string()),
            ..Default::default()
        };
        self.claims(&claim.key.namespace)
            .patch(&claim.key.name, &params, &Patch::Merge(resize_patch(claim)))
            .await
            .map_err(|e| ControlPlaneError::new("update claim", e))?;
        Ok(())
    }

    async fn list_workloads(&self, namespace: &str) -> Result<Vec<WorkloadRef>, ControlPlaneError> {
        let list = self
            .pods(namespace)
            .list(&ListParams::default())
            .await
            .map_err(|e| ControlPlaneError::new("list pods", e))?;
        Ok(list.items.iter().map(workload_from_pod).collect())
    }

    async fn delete_workload(&self, workload: &WorkloadRef) -> Result<(), ControlPlaneError> {
        match self
            .pods(&workload.namespace)
            .delete(&workload.name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => {
                debug!(pod = %workload.name, "Pod already gone");
                Ok(())
            }
            Err(e) => Err(ControlPlaneError::new("delete pod", e)),
        }
    }
}

/// [`EventSink`] that records Kubernetes events on the claim
#[derive(Clone)]
pub struct KubeEventSink {
    client: Client,
    reporter: Reporter,
}

impl KubeEventSink {
    pub fn new(client: Client, instance: Option<String>) -> Self {
        Self {
            client,
            reporter: Reporter {
                controller: CONTROLLER_NAME.to_string(),
                instance,
            },
        }
    }
}

#[async_trait]
impl EventSink for KubeEventSink {
    async fn publish(&self, claim: &StorageClaim, event: ClaimEvent) {
        let recorder = Recorder::new(
            self.client.clone(),
            self.reporter.clone(),
            object_reference(claim),
        );
        let type_ = match event.kind {
            EventKind::Normal => EventType::Normal,
            EventKind::Warning => EventType::Warning,
        };

        let published = recorder
            .publish(Event {
                type_,
                reason: event.reason.to_string(),
                note: Some(event.note),
                action: event.action.to_string(),
                secondary: None,
            })
            .await;

        if let Err(e) = published {
            warn!(claim = %claim.key, reason = event.reason, error = %e, "Unable to record event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::annotations;

    fn pvc(value: serde_json::Value) -> PersistentVolumeClaim {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_claim_from_bound_pvc() {
        let pvc = pvc(json!({
            "metadata": {
                "name": "data",
                "namespace": "default",
                "uid": "abc",
                "resourceVersion": "42",
                "annotations": { (annotations::AUTO_EXPAND): "true" }
            },
            "spec": { "resources": { "requests": { "storage": "10Gi" } } },
            "status": { "capacity": { "storage": "8Gi" } }
        }));

        let claim = claim_from_pvc(&pvc).unwrap();

        assert_eq!(claim.key, ClaimKey::new("default", "data"));
        assert_eq!(claim.requested.value(), 10 * 1024 * 1024 * 1024);
        assert_eq!(claim.provisioned.unwrap().value(), 8 * 1024 * 1024 * 1024);
        assert_eq!(claim.resource_version.as_deref(), Some("42"));
        assert_eq!(claim.annotations[annotations::AUTO_EXPAND], "true");
    }

    #[test]
    fn test_unbound_pvc_has_no_provisioned_capacity() {
        let pvc = pvc(json!({
            "metadata": { "name": "data", "namespace": "default" },
            "spec": { "resources": { "requests": { "storage": "1G" } } }
        }));

        let claim = claim_from_pvc(&pvc).unwrap();

        assert_eq!(claim.requested.value(), 1_000_000_000);
        assert!(claim.provisioned.is_none());
        assert!(claim.annotations.is_empty());
    }

    #[test]
    fn test_pvc_without_storage_request_is_skipped() {
        let pvc = pvc(json!({
            "metadata": { "name": "data", "namespace": "default" },
            "spec": { "resources": {} }
        }));
        assert!(claim_from_pvc(&pvc).is_none());
    }

    #[test]
    fn test_workload_from_pod_collects_claim_volumes() {
        let pod: Pod = serde_json::from_value(json!({
            "metadata": { "name": "web-0", "namespace": "default" },
            "spec": {
                "containers": [{ "name": "web" }],
                "volumes": [
                    { "name": "a", "persistentVolumeClaim": { "claimName": "data" } },
                    { "name": "b", "emptyDir": {} },
                    { "name": "c", "persistentVolumeClaim": { "claimName": "logs" } }
                ]
            },
            "status": { "phase": "Running" }
        }))
        .unwrap();

        let workload = workload_from_pod(&pod);

        assert_eq!(workload.name, "web-0");
        assert_eq!(workload.phase, WorkloadPhase::Running);
        assert_eq!(workload.claim_names, vec!["data", "logs"]);
    }

    #[test]
    fn test_pod_without_status_is_unknown() {
        let pod: Pod = serde_json::from_value(json!({
            "metadata": { "name": "web-0", "namespace": "default" }
        }))
        .unwrap();

        let workload = workload_from_pod(&pod);

        assert_eq!(workload.phase, WorkloadPhase::Unknown);
        assert!(workload.claim_names.is_empty());
    }

    #[test]
    fn test_resize_patch_guards_resource_version() {
        let claim = StorageClaim {
            key: ClaimKey::new("default", "data"),
            uid: None,
            resource_version: Some("42".to_string()),
            annotations: BTreeMap::new(),
            requested: Quantity::binary(1536 * 1024 * 1024),
            provisioned: None,
        };

        let patch = resize_patch(&claim);

        assert_eq!(patch["spec"]["resources"]["requests"]["storage"], "1536Mi");
        assert_eq!(patch["metadata"]["resourceVersion"], "42");

        let unversioned = StorageClaim {
            resource_version: None,
            ..claim
        };
        assert!(resize_patch(&unversioned).get("metadata").is_none());
    }

    #[test]
    fn test_object_reference_points_at_claim() {
        let claim = StorageClaim {
            key: ClaimKey::new("team-a", "data"),
            uid: Some("abc".to_string()),
            resource_version: None,
            annotations: BTreeMap::new(),
            requested: Quantity::binary(1),
            provisioned: None,
        };

        let reference = object_reference(&claim);

        assert_eq!(reference.kind.as_deref(), Some("PersistentVolumeClaim"));
        assert_eq!(reference.namespace.as_deref(), Some("team-a"));
        assert_eq!(reference.uid.as_deref(), Some("abc"));
    }
}
