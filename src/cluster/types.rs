// ABOUTME: Native cluster resource shapes: workload, service, ingress, autoscaler, config objects.
// ABOUTME: Plus the handle a registration keeps and the workload state read back for rollouts.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{ConditionStatus, Probe, Protocol, ResourceRequirements};
use crate::types::ReleaseName;

/// How the workload replaces pods on change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum UpdateStrategy {
    RollingUpdate {
        max_unavailable: String,
        max_surge: String,
    },
    Recreate,
}

impl UpdateStrategy {
    pub fn rolling() -> Self {
        UpdateStrategy::RollingUpdate {
            max_unavailable: "25%".to_string(),
            max_surge: "25%".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerPort {
    pub name: Option<String>,
    pub container_port: u16,
    pub protocol: Protocol,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    /// Pod selector; also stamped onto the pod template.
    pub selector: BTreeMap<String, String>,
    pub replicas: u32,
    pub image: String,
    pub ports: Vec<ContainerPort>,
    pub env: BTreeMap<String, String>,
    /// Config object whose keys are exposed as environment.
    pub env_from_config: Option<String>,
    /// Secret object whose keys are exposed as environment.
    pub env_from_secret: Option<String>,
    pub resources: ResourceRequirements,
    pub liveness: Option<Probe>,
    pub readiness: Option<Probe>,
    pub startup: Option<Probe>,
    pub strategy: UpdateStrategy,
}

/// Partial change applied to an existing workload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkloadPatch {
    pub image: Option<String>,
    pub replicas: Option<u32>,
    pub resources: Option<ResourceRequirements>,
    pub env: Option<BTreeMap<String, String>>,
    pub strategy: Option<UpdateStrategy>,
}

impl WorkloadPatch {
    pub fn image(image: impl Into<String>) -> Self {
        Self {
            image: Some(image.into()),
            ..Default::default()
        }
    }

    pub fn replicas(replicas: u32) -> Self {
        Self {
            replicas: Some(replicas),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePort {
    pub name: Option<String>,
    pub port: u16,
    pub target_port: u16,
    pub protocol: Protocol,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    pub selector: BTreeMap<String, String>,
    pub ports: Vec<ServicePort>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressRule {
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    pub host: String,
    pub path: String,
    pub service_name: String,
    pub service_port: u16,
    pub tls_secret: Option<String>,
    pub class: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoscalerSpec {
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    /// Name of the workload being scaled.
    pub target: String,
    pub min_replicas: u32,
    pub max_replicas: u32,
    pub target_cpu_utilization: u32,
}

/// Key/value object: used for both config objects and secrets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataObject {
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    pub data: BTreeMap<String, String>,
}

/// Status condition on a workload, as reported by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadCondition {
    pub condition_type: String,
    pub status: ConditionStatus,
    pub reason: Option<String>,
    pub message: Option<String>,
}

/// Workload as read back from the cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadState {
    pub name: String,
    pub namespace: String,
    /// Replicas requested in the workload spec.
    pub desired_replicas: u32,
    /// Replicas that currently exist.
    pub replicas: u32,
    pub updated_replicas: u32,
    pub ready_replicas: u32,
    pub available_replicas: u32,
    pub unavailable_replicas: u32,
    pub image: String,
    pub conditions: Vec<WorkloadCondition>,
}

impl WorkloadState {
    pub fn condition(&self, condition_type: &str) -> Option<&WorkloadCondition> {
        self.conditions
            .iter()
            .find(|c| c.condition_type == condition_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterEvent {
    pub event_type: String,
    pub reason: String,
    pub message: String,
    pub object: String,
    pub count: u32,
    pub last_seen: Option<DateTime<Utc>>,
}

/// What the cluster manager created for one deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterHandle {
    pub namespace: String,
    pub workload: String,
    pub selector: BTreeMap<String, String>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub ingress: Option<String>,
    #[serde(default)]
    pub autoscaler: Option<String>,
    #[serde(default)]
    pub config_object: Option<String>,
    #[serde(default)]
    pub secret: Option<String>,
    /// Set when the deployment is a chart release.
    #[serde(default)]
    pub release: Option<ReleaseName>,
}

impl ClusterHandle {
    pub fn workload(namespace: &str, workload: &str, selector: BTreeMap<String, String>) -> Self {
        Self {
            namespace: namespace.to_string(),
            workload: workload.to_string(),
            selector,
            service: None,
            ingress: None,
            autoscaler: None,
            config_object: None,
            secret: None,
            release: None,
        }
    }
}

/// Chart install or upgrade request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartRequest {
    pub release: ReleaseName,
    pub namespace: String,
    pub chart: String,
    pub repository: Option<String>,
    pub version: Option<String>,
    pub values: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReleaseStatus {
    Deployed,
    Failed,
    PendingInstall,
    PendingUpgrade,
    PendingRollback,
    Superseded,
    Uninstalled,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    pub release: ReleaseName,
    pub namespace: String,
    pub revision: u32,
    pub status: ReleaseStatus,
    pub chart_version: Option<String>,
}
