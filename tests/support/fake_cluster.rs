// ABOUTME: In-memory cluster control plane and chart installer.
// ABOUTME: Workloads converge at once, lag one read behind a patch, never become ready, or stall.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use deckhand::cluster::{
    AutoscalerSpec, ChartError, ChartInstaller, ChartRequest, ClusterClient, ClusterError,
    ClusterEvent, DataObject, IngressRule, ReleaseInfo, ReleaseStatus, ResourceKind, ServiceSpec,
    WorkloadCondition, WorkloadPatch, WorkloadSpec, WorkloadState,
};
use deckhand::model::ConditionStatus;
use deckhand::platform::LogQuery;
use deckhand::types::ReleaseName;
use parking_lot::Mutex;

/// How workloads respond to reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Convergence {
    /// Every replica is ready as soon as it is asked for.
    Immediate,
    /// The first read after a patch still shows the previous, fully ready
    /// workload; later reads converge at once.
    Lagging,
    /// Pods are scheduled but never pass readiness.
    Never,
    /// The control plane reports `Progressing=False` with this message.
    Stalled(String),
}

#[derive(Debug, Clone)]
pub struct FakeWorkload {
    pub image: String,
    pub replicas: u32,
    pub labels: BTreeMap<String, String>,
}

struct ClusterState {
    convergence: Convergence,
    namespaces: BTreeSet<String>,
    workloads: BTreeMap<(String, String), FakeWorkload>,
    /// Every non-workload resource, by kind and name.
    resources: BTreeSet<(String, String, String)>,
    /// Kinds whose creation fails.
    failing: BTreeSet<String>,
    patches: Vec<WorkloadPatch>,
    /// Pre-patch snapshots served by the next read under `Lagging`.
    stale: BTreeMap<(String, String), FakeWorkload>,
    reads: usize,
    deletes: Vec<(ResourceKind, String)>,
    logs: Vec<String>,
}

pub struct FakeCluster {
    state: Mutex<ClusterState>,
}

impl Default for FakeCluster {
    fn default() -> Self {
        Self::new(Convergence::Immediate)
    }
}

impl FakeCluster {
    pub fn new(convergence: Convergence) -> Self {
        Self {
            state: Mutex::new(ClusterState {
                convergence,
                namespaces: BTreeSet::from(["default".to_string()]),
                workloads: BTreeMap::new(),
                resources: BTreeSet::new(),
                failing: BTreeSet::new(),
                patches: Vec::new(),
                stale: BTreeMap::new(),
                reads: 0,
                deletes: Vec::new(),
                logs: Vec::new(),
            }),
        }
    }

    pub fn set_convergence(&self, convergence: Convergence) {
        self.state.lock().convergence = convergence;
    }

    /// Creating a resource of `kind` fails with an API error.
    pub fn fail_creating(&self, kind: ResourceKind) {
        self.state.lock().failing.insert(kind.to_string());
    }

    pub fn set_logs(&self, lines: &[&str]) {
        self.state.lock().logs = lines.iter().map(|l| l.to_string()).collect();
    }

    pub fn workload(&self, namespace: &str, name: &str) -> Option<FakeWorkload> {
        self.state
            .lock()
            .workloads
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn workload_count(&self) -> usize {
        self.state.lock().workloads.len()
    }

    pub fn has_resource(&self, kind: ResourceKind, namespace: &str, name: &str) -> bool {
        self.state.lock().resources.contains(&(
            kind.to_string(),
            namespace.to_string(),
            name.to_string(),
        ))
    }

    pub fn resource_count(&self) -> usize {
        self.state.lock().resources.len()
    }

    pub fn has_namespace(&self, name: &str) -> bool {
        self.state.lock().namespaces.contains(name)
    }

    pub fn patches(&self) -> Vec<WorkloadPatch> {
        self.state.lock().patches.clone()
    }

    /// Number of workload reads served so far.
    pub fn reads(&self) -> usize {
        self.state.lock().reads
    }

    pub fn deletes(&self) -> Vec<(ResourceKind, String)> {
        self.state.lock().deletes.clone()
    }

    /// Put a workload in place directly, as a chart would.
    pub fn install_workload(&self, namespace: &str, name: &str, image: &str, replicas: u32) {
        self.state.lock().workloads.insert(
            (namespace.to_string(), name.to_string()),
            FakeWorkload {
                image: image.to_string(),
                replicas,
                labels: BTreeMap::new(),
            },
        );
    }

    pub fn remove_workload(&self, namespace: &str, name: &str) {
        self.state
            .lock()
            .workloads
            .remove(&(namespace.to_string(), name.to_string()));
    }

    fn create(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<(), ClusterError> {
        let mut state = self.state.lock();
        if state.failing.contains(&kind.to_string()) {
            return Err(ClusterError::Api(format!("cannot create {kind} {name}")));
        }
        let key = (kind.to_string(), namespace.to_string(), name.to_string());
        if !state.resources.insert(key) {
            return Err(ClusterError::AlreadyExists {
                kind,
                name: name.to_string(),
            });
        }
        Ok(())
    }
}

fn observed(name: &str, namespace: &str, workload: &FakeWorkload, convergence: &Convergence) -> WorkloadState {
    let desired = workload.replicas;
    let mut state = WorkloadState {
        name: name.to_string(),
        namespace: namespace.to_string(),
        desired_replicas: desired,
        replicas: desired,
        image: workload.image.clone(),
        ..Default::default()
    };
    match convergence {
        Convergence::Immediate | Convergence::Lagging => {
            state.updated_replicas = desired;
            state.ready_replicas = desired;
            state.available_replicas = desired;
        }
        Convergence::Never => {
            state.unavailable_replicas = desired;
        }
        Convergence::Stalled(message) => {
            state.unavailable_replicas = desired;
            state.conditions.push(WorkloadCondition {
                condition_type: "Progressing".to_string(),
                status: ConditionStatus::False,
                reason: Some("ProgressDeadlineExceeded".to_string()),
                message: Some(message.clone()),
            });
        }
    }
    state
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn namespace_exists(&self, name: &str) -> Result<bool, ClusterError> {
        Ok(self.state.lock().namespaces.contains(name))
    }

    async fn create_namespace(&self, name: &str) -> Result<(), ClusterError> {
        self.state.lock().namespaces.insert(name.to_string());
        Ok(())
    }

    async fn apply_config_object(&self, object: &DataObject) -> Result<(), ClusterError> {
        let mut state = self.state.lock();
        state.resources.insert((
            ResourceKind::ConfigObject.to_string(),
            object.namespace.clone(),
            object.name.clone(),
        ));
        Ok(())
    }

    async fn apply_secret(&self, object: &DataObject) -> Result<(), ClusterError> {
        let mut state = self.state.lock();
        state.resources.insert((
            ResourceKind::Secret.to_string(),
            object.namespace.clone(),
            object.name.clone(),
        ));
        Ok(())
    }

    async fn create_workload(&self, spec: &WorkloadSpec) -> Result<(), ClusterError> {
        let mut state = self.state.lock();
        if state.failing.contains(&ResourceKind::Workload.to_string()) {
            return Err(ClusterError::Api(format!("cannot create workload {}", spec.name)));
        }
        let key = (spec.namespace.clone(), spec.name.clone());
        if state.workloads.contains_key(&key) {
            return Err(ClusterError::AlreadyExists {
                kind: ResourceKind::Workload,
                name: spec.name.clone(),
            });
        }
        state.workloads.insert(
            key,
            FakeWorkload {
                image: spec.image.clone(),
                replicas: spec.replicas,
                labels: spec.labels.clone(),
            },
        );
        Ok(())
    }

    async fn patch_workload(
        &self,
        namespace: &str,
        name: &str,
        patch: &WorkloadPatch,
    ) -> Result<(), ClusterError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.patches.push(patch.clone());
        let key = (namespace.to_string(), name.to_string());
        let workload = state
            .workloads
            .get_mut(&key)
            .ok_or_else(|| ClusterError::NotFound {
                kind: ResourceKind::Workload,
                name: name.to_string(),
            })?;
        if state.convergence == Convergence::Lagging {
            state.stale.insert(key, workload.clone());
        }
        if let Some(image) = &patch.image {
            workload.image = image.clone();
        }
        if let Some(replicas) = patch.replicas {
            workload.replicas = replicas;
        }
        Ok(())
    }

    async fn read_workload(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<WorkloadState, ClusterError> {
        let mut state = self.state.lock();
        state.reads += 1;
        let key = (namespace.to_string(), name.to_string());
        if let Some(previous) = state.stale.remove(&key) {
            return Ok(observed(name, namespace, &previous, &Convergence::Immediate));
        }
        let workload = state
            .workloads
            .get(&key)
            .ok_or_else(|| ClusterError::NotFound {
                kind: ResourceKind::Workload,
                name: name.to_string(),
            })?;
        Ok(observed(name, namespace, workload, &state.convergence))
    }

    async fn create_service(&self, spec: &ServiceSpec) -> Result<(), ClusterError> {
        self.create(ResourceKind::Service, &spec.namespace, &spec.name)
    }

    async fn create_ingress(&self, rule: &IngressRule) -> Result<(), ClusterError> {
        self.create(ResourceKind::Ingress, &rule.namespace, &rule.name)
    }

    async fn create_autoscaler(&self, spec: &AutoscalerSpec) -> Result<(), ClusterError> {
        self.create(ResourceKind::Autoscaler, &spec.namespace, &spec.name)
    }

    async fn delete(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<(), ClusterError> {
        let mut state = self.state.lock();
        state.deletes.push((kind, name.to_string()));
        let removed = if kind == ResourceKind::Workload {
            state
                .workloads
                .remove(&(namespace.to_string(), name.to_string()))
                .is_some()
        } else {
            state
                .resources
                .remove(&(kind.to_string(), namespace.to_string(), name.to_string()))
        };
        if removed {
            Ok(())
        } else {
            Err(ClusterError::NotFound {
                kind,
                name: name.to_string(),
            })
        }
    }

    async fn pod_logs(
        &self,
        _namespace: &str,
        _selector: &BTreeMap<String, String>,
        query: &LogQuery,
    ) -> Result<Vec<String>, ClusterError> {
        let mut lines = self.state.lock().logs.clone();
        if let Some(tail) = query.tail {
            let keep = (tail as usize).min(lines.len());
            lines.drain(..lines.len() - keep);
        }
        Ok(lines)
    }

    async fn events(
        &self,
        _namespace: &str,
        object: &str,
    ) -> Result<Vec<ClusterEvent>, ClusterError> {
        Ok(vec![ClusterEvent {
            event_type: "Normal".to_string(),
            reason: "ScalingReplicaSet".to_string(),
            message: format!("scaled {object}"),
            object: object.to_string(),
            count: 1,
            last_seen: None,
        }])
    }
}

/// Chart installer that materializes releases as workloads in a [`FakeCluster`].
pub struct FakeCharts {
    cluster: Arc<FakeCluster>,
    /// Release -> (namespace, revision history of images).
    releases: Mutex<BTreeMap<String, (String, Vec<String>)>>,
}

impl FakeCharts {
    pub fn new(cluster: Arc<FakeCluster>) -> Self {
        Self {
            cluster,
            releases: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn revision(&self, release: &str) -> Option<u32> {
        self.releases
            .lock()
            .get(release)
            .map(|(_, revisions)| revisions.len() as u32)
    }

    fn apply(&self, request: &ChartRequest) -> ReleaseInfo {
        let values = &request.values;
        let name = values["fullnameOverride"]
            .as_str()
            .unwrap_or(request.release.as_str())
            .to_string();
        let image = format!(
            "{}:{}",
            values["image"]["repository"].as_str().unwrap_or_default(),
            values["image"]["tag"].as_str().unwrap_or("latest")
        );
        let replicas = values["replicaCount"].as_u64().unwrap_or(1) as u32;
        self.cluster
            .install_workload(&request.namespace, &name, &image, replicas);

        let mut releases = self.releases.lock();
        let entry = releases
            .entry(request.release.to_string())
            .or_insert_with(|| (request.namespace.clone(), Vec::new()));
        entry.1.push(image);
        info(&request.release, &request.namespace, entry.1.len() as u32)
    }
}

fn info(release: &ReleaseName, namespace: &str, revision: u32) -> ReleaseInfo {
    ReleaseInfo {
        release: release.clone(),
        namespace: namespace.to_string(),
        revision,
        status: ReleaseStatus::Deployed,
        chart_version: Some("1.0.0".to_string()),
    }
}

#[async_trait]
impl ChartInstaller for FakeCharts {
    async fn install(&self, request: &ChartRequest) -> Result<ReleaseInfo, ChartError> {
        Ok(self.apply(request))
    }

    async fn upgrade(&self, request: &ChartRequest) -> Result<ReleaseInfo, ChartError> {
        if !self.releases.lock().contains_key(request.release.as_str()) {
            return Err(ChartError::ReleaseNotFound(request.release.to_string()));
        }
        Ok(self.apply(request))
    }

    async fn uninstall(&self, release: &ReleaseName, namespace: &str) -> Result<(), ChartError> {
        if self.releases.lock().remove(release.as_str()).is_none() {
            return Err(ChartError::ReleaseNotFound(release.to_string()));
        }
        self.cluster.remove_workload(namespace, release.as_str());
        Ok(())
    }

    async fn rollback(
        &self,
        release: &ReleaseName,
        namespace: &str,
        revision: Option<u32>,
    ) -> Result<ReleaseInfo, ChartError> {
        let mut releases = self.releases.lock();
        let (_, revisions) = releases
            .get_mut(release.as_str())
            .ok_or_else(|| ChartError::ReleaseNotFound(release.to_string()))?;
        let current = revisions.len() as u32;
        let target = revision.unwrap_or(current.saturating_sub(1));
        if target == 0 || target > current {
            return Err(ChartError::Failed(format!("no revision {target}")));
        }
        let image = revisions[(target - 1) as usize].clone();
        revisions.push(image.clone());
        let revision = revisions.len() as u32;
        drop(releases);

        let replicas = self
            .cluster
            .workload(namespace, release.as_str())
            .map(|w| w.replicas)
            .unwrap_or(1);
        self.cluster
            .install_workload(namespace, release.as_str(), &image, replicas);
        Ok(info(release, namespace, revision))
    }

    async fn status(
        &self,
        release: &ReleaseName,
        namespace: &str,
    ) -> Result<Option<ReleaseInfo>, ChartError> {
        Ok(self
            .releases
            .lock()
            .get(release.as_str())
            .map(|(_, revisions)| info(release, namespace, revisions.len() as u32)))
    }
}
