// ABOUTME: Contract traits for the cluster control plane and the chart installer.
// ABOUTME: The cluster manager talks only to these; tests supply in-memory fakes.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::platform::LogQuery;
use crate::types::ReleaseName;

use super::types::{
    AutoscalerSpec, ChartRequest, ClusterEvent, DataObject, IngressRule, ReleaseInfo,
    ServiceSpec, WorkloadPatch, WorkloadSpec, WorkloadState,
};

/// Resource operations against a cluster control plane.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn namespace_exists(&self, name: &str) -> Result<bool, ClusterError>;

    async fn create_namespace(&self, name: &str) -> Result<(), ClusterError>;

    /// Create or replace a config object.
    async fn apply_config_object(&self, object: &DataObject) -> Result<(), ClusterError>;

    /// Create or replace a secret.
    async fn apply_secret(&self, object: &DataObject) -> Result<(), ClusterError>;

    async fn create_workload(&self, spec: &WorkloadSpec) -> Result<(), ClusterError>;

    async fn patch_workload(
        &self,
        namespace: &str,
        name: &str,
        patch: &WorkloadPatch,
    ) -> Result<(), ClusterError>;

    async fn read_workload(&self, namespace: &str, name: &str)
    -> Result<WorkloadState, ClusterError>;

    async fn create_service(&self, spec: &ServiceSpec) -> Result<(), ClusterError>;

    async fn create_ingress(&self, rule: &IngressRule) -> Result<(), ClusterError>;

    async fn create_autoscaler(&self, spec: &AutoscalerSpec) -> Result<(), ClusterError>;

    async fn delete(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<(), ClusterError>;

    /// Logs of every pod matching `selector`, oldest first.
    async fn pod_logs(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
        query: &LogQuery,
    ) -> Result<Vec<String>, ClusterError>;

    /// Recent events involving `object`.
    async fn events(&self, namespace: &str, object: &str)
    -> Result<Vec<ClusterEvent>, ClusterError>;
}

/// Chart package management.
#[async_trait]
pub trait ChartInstaller: Send + Sync {
    async fn install(&self, request: &ChartRequest) -> Result<ReleaseInfo, ChartError>;

    async fn upgrade(&self, request: &ChartRequest) -> Result<ReleaseInfo, ChartError>;

    async fn uninstall(&self, release: &ReleaseName, namespace: &str) -> Result<(), ChartError>;

    /// Roll back to `revision`, or the one before the current when `None`.
    async fn rollback(
        &self,
        release: &ReleaseName,
        namespace: &str,
        revision: Option<u32>,
    ) -> Result<ReleaseInfo, ChartError>;

    /// `None` when the release does not exist.
    async fn status(
        &self,
        release: &ReleaseName,
        namespace: &str,
    ) -> Result<Option<ReleaseInfo>, ChartError>;
}

/// Deletable cluster resource kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Workload,
    Service,
    Ingress,
    Autoscaler,
    ConfigObject,
    Secret,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResourceKind::Workload => "workload",
            ResourceKind::Service => "service",
            ResourceKind::Ingress => "ingress",
            ResourceKind::Autoscaler => "autoscaler",
            ResourceKind::ConfigObject => "config object",
            ResourceKind::Secret => "secret",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("{kind} not found: {name}")]
    NotFound { kind: ResourceKind, name: String },

    #[error("{kind} already exists: {name}")]
    AlreadyExists { kind: ResourceKind, name: String },

    #[error("cluster API error: {0}")]
    Api(String),
}

impl ClusterError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound { .. })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChartError {
    #[error("release not found: {0}")]
    ReleaseNotFound(String),

    #[error("chart operation failed: {0}")]
    Failed(String),
}

impl ChartError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ChartError::ReleaseNotFound(_))
    }
}
