// ABOUTME: Cluster-orchestration backend manager: resource sets and chart releases.
// ABOUTME: Every mutation is followed by a polling rollout wait before success is reported.

mod client;
mod convert;
mod rollout;
mod types;

pub use client::{ChartError, ChartInstaller, ClusterClient, ClusterError, ResourceKind};
pub use convert::{DEFAULT_NAMESPACE, DEFAULT_TARGET_CPU, workload_status};
pub use rollout::{RolloutConfig, rollout_complete, wait_for_rollout};
pub use types::{
    AutoscalerSpec, ChartRequest, ClusterEvent, ClusterHandle, ContainerPort, DataObject,
    IngressRule, ReleaseInfo, ReleaseStatus, ServicePort, ServiceSpec, UpdateStrategy,
    WorkloadCondition, WorkloadPatch, WorkloadSpec, WorkloadState,
};

use std::sync::Arc;

use async_trait::async_trait;

use crate::deploy::{DeployError, OperationLocks, resolve_target, run_delete, run_operation};
use crate::diagnostics::{Diagnostics, Warning};
use crate::events::{EventSink, NoopSink, Operation};
use crate::model::{
    Condition, ConditionStatus, DeploymentConfig, DeploymentResult, DeploymentStatus,
    DeploymentUpdate, Phase, ReplicaCounts, RollbackInfo, RollbackStrategy,
};
use crate::platform::{LogQuery, PlatformAdapter};
use crate::store::{DeploymentStore, Registration};
use crate::types::ImageRef;

/// Drives deployments on a cluster control plane.
pub struct ClusterManager {
    client: Arc<dyn ClusterClient>,
    charts: Option<Arc<dyn ChartInstaller>>,
    store: Arc<dyn DeploymentStore<ClusterHandle>>,
    locks: OperationLocks,
    events: Arc<dyn EventSink>,
    rollout: RolloutConfig,
    namespace: String,
}

impl ClusterManager {
    pub fn new(
        client: Arc<dyn ClusterClient>,
        store: Arc<dyn DeploymentStore<ClusterHandle>>,
    ) -> Self {
        Self {
            client,
            charts: None,
            store,
            locks: OperationLocks::new(),
            events: Arc::new(NoopSink),
            rollout: RolloutConfig::default(),
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }

    pub fn with_charts(mut self, charts: Arc<dyn ChartInstaller>) -> Self {
        self.charts = Some(charts);
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_rollout(mut self, rollout: RolloutConfig) -> Self {
        self.rollout = rollout;
        self
    }

    /// Namespace for deployments that do not name one.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn deployment_ids(&self) -> Result<Vec<String>, DeployError> {
        Ok(self.store.keys()?)
    }

    /// Recent cluster events for a deployment's workload.
    pub async fn events(&self, id: &str) -> Result<Vec<ClusterEvent>, DeployError> {
        let (_, handle) = self.registered(id)?;
        Ok(self
            .client
            .events(&handle.namespace, &handle.workload)
            .await?)
    }

    fn charts(&self) -> Result<&dyn ChartInstaller, DeployError> {
        self.charts.as_deref().ok_or_else(|| {
            DeployError::UnsupportedOperation(
                "chart deployments need a chart installer".to_string(),
            )
        })
    }

    fn registered(
        &self,
        id: &str,
    ) -> Result<(Registration<ClusterHandle>, ClusterHandle), DeployError> {
        let registration = self
            .store
            .get(id)?
            .ok_or_else(|| DeployError::NotFound(id.to_string()))?;
        let handle = registration.handle.clone().ok_or_else(|| {
            DeployError::Platform(format!("no cluster resources recorded for {id}"))
        })?;
        Ok((registration, handle))
    }

    async fn current_status(&self, id: &str) -> DeploymentStatus {
        let registration = match self.store.get(id) {
            Ok(Some(registration)) => registration,
            Ok(None) => return DeploymentStatus::unknown("deployment not registered"),
            Err(e) => return DeploymentStatus::unknown(format!("registry unavailable: {e}")),
        };
        let Some(handle) = &registration.handle else {
            return DeploymentStatus::unknown("no cluster resources recorded");
        };

        match self
            .client
            .read_workload(&handle.namespace, &handle.workload)
            .await
        {
            Ok(state) => workload_status(&state),
            Err(e) if e.is_not_found() => DeploymentStatus::from_replicas(
                Phase::Failed,
                ReplicaCounts {
                    desired: registration.replicas,
                    unavailable: registration.replicas,
                    ..Default::default()
                },
            )
            .with_condition(
                Condition::new("Available", ConditionStatus::False).with_reason(
                    "WorkloadMissing",
                    format!("workload {} no longer exists", handle.workload),
                ),
            ),
            Err(e) => DeploymentStatus::unknown(format!("workload read failed: {e}")),
        }
    }

    async fn wait(&self, handle: &ClusterHandle, desired: u32) -> Result<WorkloadState, DeployError> {
        wait_for_rollout(
            self.client.as_ref(),
            &handle.namespace,
            &handle.workload,
            desired,
            &self.rollout,
        )
        .await
    }

    async fn install_chart(
        &self,
        config: &DeploymentConfig,
        namespace: &str,
        image: &ImageRef,
    ) -> Result<ClusterHandle, DeployError> {
        let charts = self.charts()?;
        let Some(request) = convert::chart_request(config, namespace, image)? else {
            return Err(DeployError::Validation(format!(
                "{} has no chart reference",
                config.id
            )));
        };

        let existing = charts.status(&request.release, namespace).await?;
        let info = if existing.is_some() {
            tracing::info!(release = %request.release, "release exists, upgrading");
            charts.upgrade(&request).await?
        } else {
            charts.install(&request).await?
        };
        tracing::info!(release = %info.release, revision = info.revision, "chart applied");

        let mut handle = ClusterHandle::workload(
            namespace,
            &config.name,
            convert::release_selector(&request.release),
        );
        handle.release = Some(request.release);
        Ok(handle)
    }

    /// Create the resource set. Specs are derived up front so a bad config
    /// fails before anything is created; a failed creation removes what was
    /// already made.
    async fn create_resources(
        &self,
        config: &DeploymentConfig,
        namespace: &str,
        image: &ImageRef,
    ) -> Result<ClusterHandle, DeployError> {
        let workload = convert::workload_spec(config, namespace, image)?;
        let ingress = convert::ingress_rule(config, namespace)?;
        let secret = convert::secret_object(config, namespace)?;
        let config_object = convert::config_object(config, namespace);
        let service = convert::service_spec(config, namespace);
        let autoscaler = convert::autoscaler_spec(config, namespace);

        if !self.client.namespace_exists(namespace).await? {
            tracing::info!(namespace, "creating namespace");
            self.client.create_namespace(namespace).await?;
        }

        let mut handle = ClusterHandle::workload(namespace, &workload.name, workload.selector.clone());
        let created: Result<(), DeployError> = async {
            if let Some(object) = &config_object {
                self.client.apply_config_object(object).await?;
                handle.config_object = Some(object.name.clone());
            }
            if let Some(object) = &secret {
                self.client.apply_secret(object).await?;
                handle.secret = Some(object.name.clone());
            }
            self.client.create_workload(&workload).await?;
            if let Some(spec) = &service {
                self.client.create_service(spec).await?;
                handle.service = Some(spec.name.clone());
            }
            if let Some(rule) = &ingress {
                self.client.create_ingress(rule).await?;
                handle.ingress = Some(rule.name.clone());
            }
            if let Some(spec) = &autoscaler {
                self.client.create_autoscaler(spec).await?;
                handle.autoscaler = Some(spec.name.clone());
            }
            Ok(())
        }
        .await;

        if let Err(e) = created {
            let mut diag = Diagnostics::default();
            self.remove_resources(&handle, &mut diag).await;
            return Err(e);
        }
        Ok(handle)
    }

    /// Best-effort removal of everything in `handle` except the namespace.
    async fn remove_resources(&self, handle: &ClusterHandle, diag: &mut Diagnostics) {
        let resources = [
            (ResourceKind::Autoscaler, handle.autoscaler.as_deref()),
            (ResourceKind::Ingress, handle.ingress.as_deref()),
            (ResourceKind::Service, handle.service.as_deref()),
            (ResourceKind::Workload, Some(handle.workload.as_str())),
            (ResourceKind::Secret, handle.secret.as_deref()),
            (ResourceKind::ConfigObject, handle.config_object.as_deref()),
        ];
        for (kind, name) in resources {
            let Some(name) = name else { continue };
            match self.client.delete(kind, &handle.namespace, name).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => diag.warn(Warning::cleanup_skipped(format!(
                    "failed to delete {kind} {name}: {e}"
                ))),
            }
        }
    }

    async fn deploy_inner(&self, config: DeploymentConfig) -> Result<DeploymentResult, DeployError> {
        let image = config.validate()?;
        let id = config.id.clone();

        if self.store.get(&id)?.is_some() {
            return Err(DeployError::AlreadyDeployed(id));
        }

        let namespace = convert::namespace(&config, &self.namespace);
        let handle = if config.chart.is_some() {
            self.install_chart(&config, &namespace, &image).await?
        } else {
            self.create_resources(&config, &namespace, &image).await?
        };

        let replicas = config.scaling.min_replicas;
        self.store
            .set(&id, Registration::new(config, Some(handle.clone()), replicas))?;
        tracing::info!(deployment = %id, namespace = %handle.namespace, workload = %handle.workload, "resources applied, waiting for rollout");

        let state = self.wait(&handle, replicas).await?;
        let mut result = DeploymentResult::succeeded(
            &id,
            workload_status(&state),
            format!("deployed {id} from {image}"),
        )
        .with_metadata("namespace", handle.namespace.as_str())
        .with_metadata("workload", handle.workload.as_str());
        if let Some(release) = &handle.release {
            result = result.with_metadata("release", release.as_str());
        }
        Ok(result)
    }

    async fn update_inner(
        &self,
        id: &str,
        update: DeploymentUpdate,
    ) -> Result<DeploymentResult, DeployError> {
        let (registration, handle) = self.registered(id)?;
        let config = registration.config.merged(&update);
        let image = config.validate()?;
        let desired = if update.scaling.is_some() {
            config.scaling.min_replicas
        } else {
            registration.replicas
        };

        if handle.release.is_some() {
            let mut chart_config = config.clone();
            chart_config.scaling.min_replicas = desired;
            if let Some(request) = convert::chart_request(&chart_config, &handle.namespace, &image)? {
                let info = self.charts()?.upgrade(&request).await?;
                tracing::info!(release = %info.release, revision = info.revision, "chart upgraded");
            }
        } else {
            let previous = &registration.config;
            let patch = WorkloadPatch {
                image: Some(image.to_string()),
                replicas: (desired != registration.replicas).then_some(desired),
                resources: (config.resources != previous.resources)
                    .then(|| config.resources.clone()),
                env: if update.env.is_empty() {
                    None
                } else {
                    Some(config.resolved_env()?)
                },
                strategy: (config.strategy != previous.strategy)
                    .then(|| convert::update_strategy(config.strategy)),
            };
            self.client
                .patch_workload(&handle.namespace, &handle.workload, &patch)
                .await?;
        }

        let strategy = config.strategy;
        let mut next = Registration::new(config, Some(handle.clone()), desired);
        next.history = registration.history.clone();
        if registration.config.image != next.config.image {
            next.push_history(&registration.config.image);
        }
        self.store.set(id, next)?;

        let state = self.wait(&handle, desired).await?;
        Ok(
            DeploymentResult::succeeded(id, workload_status(&state), format!("updated {id} to {image}"))
                .with_metadata("strategy", strategy.to_string())
                .with_metadata("image", image.to_string()),
        )
    }

    async fn rollback_inner(
        &self,
        id: &str,
        version: Option<&str>,
    ) -> Result<DeploymentResult, DeployError> {
        let (mut registration, handle) = self.registered(id)?;
        let current = registration.config.validate()?;

        let target = if let Some(release) = &handle.release {
            let revision = version
                .map(|v| {
                    v.parse::<u32>().map_err(|_| {
                        DeployError::Validation(format!(
                            "chart rollback expects a revision number, got {v}"
                        ))
                    })
                })
                .transpose()?;
            let info = self
                .charts()?
                .rollback(release, &handle.namespace, revision)
                .await?;
            if version.is_none() {
                registration.history.pop();
            }
            format!("revision {}", info.revision)
        } else {
            let target = resolve_target(&mut registration.history, &current, version)?;
            self.client
                .patch_workload(
                    &handle.namespace,
                    &handle.workload,
                    &WorkloadPatch::image(target.to_string()),
                )
                .await?;
            registration.config.image = target.to_string();
            registration.config.version = target.tag().map(str::to_string);
            target.to_string()
        };

        registration.push_history(&current.to_string());
        registration.touch();
        let desired = registration.replicas;
        self.store.set(id, registration.clone())?;

        let state = self.wait(&handle, desired).await?;
        if handle.release.is_some() && !state.image.is_empty() && state.image != registration.config.image {
            registration.config.image = state.image.clone();
            self.store.set(id, registration)?;
        }

        tracing::info!(deployment = %id, from = %current, to = %target, "rolled back");
        Ok(
            DeploymentResult::succeeded(id, workload_status(&state), format!("rolled back {id} to {target}"))
                .with_rollback(RollbackInfo::new(
                    &target,
                    &format!("rollback requested from {current}"),
                    RollbackStrategy::Gradual,
                ))
                .with_metadata("rolled_back_from", current.to_string()),
        )
    }

    async fn scale_inner(&self, id: &str, replicas: u32) -> Result<DeploymentResult, DeployError> {
        let (mut registration, handle) = self.registered(id)?;

        self.client
            .patch_workload(
                &handle.namespace,
                &handle.workload,
                &WorkloadPatch::replicas(replicas),
            )
            .await?;

        registration.replicas = replicas;
        registration.config.scaling.min_replicas = replicas;
        if let Some(max) = registration.config.scaling.max_replicas
            && max < replicas
        {
            registration.config.scaling.max_replicas = Some(replicas);
        }
        registration.touch();
        self.store.set(id, registration)?;

        let state = self.wait(&handle, replicas).await?;
        Ok(
            DeploymentResult::succeeded(id, workload_status(&state), format!("scaled {id} to {replicas}"))
                .with_metadata("replicas", replicas.to_string()),
        )
    }

    async fn delete_inner(&self, id: &str) -> Result<(), DeployError> {
        let Some(registration) = self.store.get(id)? else {
            tracing::debug!(deployment = %id, "delete of unregistered deployment is a no-op");
            return Ok(());
        };

        if let Some(handle) = &registration.handle {
            if let Some(release) = &handle.release {
                match self.charts()?.uninstall(release, &handle.namespace).await {
                    Ok(()) => {}
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(e.into()),
                }
            } else {
                match self
                    .client
                    .delete(ResourceKind::Workload, &handle.namespace, &handle.workload)
                    .await
                {
                    Ok(()) => {}
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(e.into()),
                }
                let mut diag = Diagnostics::default();
                self.remove_resources(handle, &mut diag).await;
                if let Some(summary) = diag.summary() {
                    tracing::warn!(deployment = %id, warnings = %summary, "deleted with leftovers");
                }
            }
        }

        self.store.delete(id)?;
        tracing::info!(deployment = %id, "deleted");
        Ok(())
    }
}

#[async_trait]
impl PlatformAdapter for ClusterManager {
    async fn deploy(&self, config: DeploymentConfig) -> DeploymentResult {
        let id = config.id.clone();
        run_operation(
            &self.locks,
            self.events.as_ref(),
            &id,
            Operation::Deploy,
            self.deploy_inner(config),
            self.current_status(&id),
        )
        .await
    }

    async fn update(&self, id: &str, update: DeploymentUpdate) -> DeploymentResult {
        run_operation(
            &self.locks,
            self.events.as_ref(),
            id,
            Operation::Update,
            self.update_inner(id, update),
            self.current_status(id),
        )
        .await
    }

    async fn rollback(&self, id: &str, version: Option<&str>) -> DeploymentResult {
        run_operation(
            &self.locks,
            self.events.as_ref(),
            id,
            Operation::Rollback,
            self.rollback_inner(id, version),
            self.current_status(id),
        )
        .await
    }

    async fn scale(&self, id: &str, replicas: u32) -> DeploymentResult {
        run_operation(
            &self.locks,
            self.events.as_ref(),
            id,
            Operation::Scale,
            self.scale_inner(id, replicas),
            self.current_status(id),
        )
        .await
    }

    async fn get_status(&self, id: &str) -> DeploymentStatus {
        self.current_status(id).await
    }

    async fn get_logs(&self, id: &str, query: &LogQuery) -> Result<Vec<String>, DeployError> {
        let (_, handle) = self.registered(id)?;
        Ok(self
            .client
            .pod_logs(&handle.namespace, &handle.selector, query)
            .await?)
    }

    async fn delete(&self, id: &str) -> Result<(), DeployError> {
        run_delete(&self.locks, self.events.as_ref(), id, self.delete_inner(id)).await
    }
}
