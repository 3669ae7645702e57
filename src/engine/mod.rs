// ABOUTME: Container-engine backend manager: one container per deployment.
// ABOUTME: Implements deploy/update/rollback/scale/delete against an injected ContainerEngine.

mod convert;
mod usage;

pub use convert::{
    LABEL_DEPLOYMENT, LABEL_MANAGED, LABEL_SLOT, LABEL_VERSION, Slot, container_spec,
    container_status, healthcheck, resource_limits,
};
pub use usage::{ResourceUsage, cpu_percent};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::deploy::{
    ContainerUpdatePlan, DeployError, OperationLocks, resolve_target, run_delete, run_operation,
};
use crate::diagnostics::{Diagnostics, Warning};
use crate::events::{EventSink, NoopSink, Operation};
use crate::model::{
    Condition, ConditionStatus, DeploymentConfig, DeploymentResult, DeploymentStatus,
    DeploymentUpdate, Phase, ReplicaCounts, RollbackInfo, RollbackStrategy,
};
use crate::platform::{LogQuery, PlatformAdapter};
use crate::runtime::{
    BuildConfig, ContainerEngine, ContainerError, ContainerFilters, ContainerState, HealthState,
    LogOptions,
};
use crate::store::{DeploymentStore, Registration};
use crate::types::{ContainerId, ImageRef};

/// Timing knobs for the container-engine manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// How long a new container may take to report healthy.
    #[serde(with = "humantime_serde")]
    pub health_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub health_poll_interval: Duration,
    /// Grace period before a stopping container is killed.
    #[serde(with = "humantime_serde")]
    pub stop_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            health_timeout: Duration::from_secs(120),
            health_poll_interval: Duration::from_secs(1),
            stop_timeout: Duration::from_secs(10),
        }
    }
}

/// Drives single-container deployments on Docker or Podman.
pub struct ContainerEngineManager {
    engine: Arc<dyn ContainerEngine>,
    store: Arc<dyn DeploymentStore<ContainerId>>,
    locks: OperationLocks,
    events: Arc<dyn EventSink>,
    settings: EngineSettings,
}

impl ContainerEngineManager {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        store: Arc<dyn DeploymentStore<ContainerId>>,
    ) -> Self {
        Self {
            engine,
            store,
            locks: OperationLocks::new(),
            events: Arc::new(NoopSink),
            settings: EngineSettings::default(),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Ids of every registered deployment.
    pub fn deployment_ids(&self) -> Result<Vec<String>, DeployError> {
        Ok(self.store.keys()?)
    }

    /// Current resource usage of a deployment's container.
    pub async fn resource_usage(&self, id: &str) -> Result<ResourceUsage, DeployError> {
        let registration = self.registration(id)?;
        let Some(handle) = registration.handle else {
            return Err(DeployError::UnsupportedOperation(format!(
                "{id} is scaled to zero and has no container to sample"
            )));
        };
        let sample = self.engine.container_stats(&handle).await?;
        Ok(ResourceUsage::from_sample(&sample))
    }

    fn registration(&self, id: &str) -> Result<Registration<ContainerId>, DeployError> {
        self.store
            .get(id)?
            .ok_or_else(|| DeployError::NotFound(id.to_string()))
    }

    async fn current_status(&self, id: &str) -> DeploymentStatus {
        match self.store.get(id) {
            Ok(Some(registration)) => self.status_of(&registration).await,
            Ok(None) => DeploymentStatus::unknown("deployment not registered"),
            Err(e) => DeploymentStatus::unknown(format!("registry unavailable: {e}")),
        }
    }

    async fn status_of(&self, registration: &Registration<ContainerId>) -> DeploymentStatus {
        let Some(handle) = &registration.handle else {
            return convert::scaled_to_zero_status(&registration.config);
        };

        match self.engine.inspect_container(handle).await {
            Ok(info) => convert::container_status(&info),
            Err(e) if e.is_not_found() => DeploymentStatus::from_replicas(
                Phase::Failed,
                ReplicaCounts {
                    desired: 1,
                    unavailable: 1,
                    ..Default::default()
                },
            )
            .with_condition(
                Condition::new("Available", ConditionStatus::False).with_reason(
                    "ContainerMissing",
                    format!("container {} no longer exists", handle),
                ),
            ),
            Err(e) => DeploymentStatus::unknown(format!("inspect failed: {e}")),
        }
    }

    /// Build the image if a build spec is present, otherwise make sure it is local.
    async fn prepare_image(
        &self,
        config: &DeploymentConfig,
        image: ImageRef,
    ) -> Result<ImageRef, DeployError> {
        let Some(build) = &config.build else {
            self.ensure_image(&image).await?;
            return Ok(image);
        };

        let tag = match &build.tag {
            Some(tag) => {
                ImageRef::parse(tag).map_err(|e| DeployError::Validation(e.to_string()))?
            }
            None => image,
        };

        tracing::info!(deployment = %config.id, context = %build.context, tag = %tag, "building image");
        let built = self
            .engine
            .build_image(&BuildConfig {
                context: PathBuf::from(&build.context),
                dockerfile: build.dockerfile.clone(),
                tag,
                args: build.args.clone(),
            })
            .await?;
        Ok(built)
    }

    async fn ensure_image(&self, image: &ImageRef) -> Result<(), DeployError> {
        if !self.engine.image_exists(image).await? {
            tracing::info!(image = %image, "pulling image");
            self.engine.pull_image(image).await?;
        }
        Ok(())
    }

    /// Create, start and confirm a container. A container that fails to
    /// come up is removed before the error is returned.
    async fn launch(
        &self,
        config: &DeploymentConfig,
        image: &ImageRef,
        name: &str,
        slot: Slot,
    ) -> Result<ContainerId, DeployError> {
        let spec = convert::container_spec(config, image, name, slot, self.settings.stop_timeout)?;
        let id = self.engine.create_container(&spec).await?;
        tracing::debug!(deployment = %config.id, container = %id, name, "container created");

        if let Err(e) = self.start_and_confirm(&id, spec.healthcheck.is_some()).await {
            if let Err(cleanup) = self.engine.remove_container(&id, true).await {
                tracing::warn!(container = %id, error = %cleanup, "failed to remove container that did not come up");
            }
            return Err(e);
        }
        Ok(id)
    }

    async fn start_and_confirm(
        &self,
        id: &ContainerId,
        has_healthcheck: bool,
    ) -> Result<(), DeployError> {
        self.engine.start_container(id).await?;

        if has_healthcheck {
            return self.wait_healthy(id).await;
        }

        let info = self.engine.inspect_container(id).await?;
        if info.state != ContainerState::Running {
            return Err(DeployError::Platform(format!(
                "container {} is not running after start ({:?})",
                info.name, info.state
            )));
        }
        Ok(())
    }

    /// Poll the engine's health report until healthy, unhealthy or timeout.
    async fn wait_healthy(&self, id: &ContainerId) -> Result<(), DeployError> {
        let started = Instant::now();
        let deadline = started + self.settings.health_timeout;

        loop {
            let info = self.engine.inspect_container(id).await?;
            match (info.state, info.health) {
                (ContainerState::Running, Some(HealthState::Healthy)) => {
                    tracing::debug!(container = %id, elapsed = ?started.elapsed(), "container healthy");
                    return Ok(());
                }
                (_, Some(HealthState::Unhealthy)) => {
                    return Err(DeployError::Platform(format!(
                        "container {} reported unhealthy",
                        info.name
                    )));
                }
                (ContainerState::Exited | ContainerState::Dead, _) => {
                    return Err(DeployError::Platform(format!(
                        "container {} exited before becoming healthy",
                        info.name
                    )));
                }
                _ => {}
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(DeployError::RolloutTimeout {
                    elapsed: started.elapsed(),
                });
            }
            tokio::time::sleep(self.settings.health_poll_interval.min(deadline - now)).await;
        }
    }

    /// Stop a container, treating an already-gone container as stopped.
    /// Returns whether the container still exists.
    async fn stop_existing(&self, id: &ContainerId) -> Result<bool, DeployError> {
        match self
            .engine
            .stop_container(id, self.settings.stop_timeout)
            .await
        {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove_quietly(&self, id: &ContainerId, diag: &mut Diagnostics) {
        match self.engine.remove_container(id, true).await {
            Ok(()) => {}
            Err(ContainerError::NotFound(_)) => {}
            Err(e) => diag.warn(Warning::cleanup_skipped(format!(
                "failed to remove container {id}: {e}"
            ))),
        }
    }

    /// Put a displaced container back under its primary name.
    async fn restore(
        &self,
        old: &ContainerId,
        name: &str,
        restart: bool,
        diag: &mut Diagnostics,
    ) {
        if let Err(e) = self.engine.rename_container(old, name).await {
            diag.warn(Warning::restore_failed(format!(
                "could not rename container {old} back to {name}: {e}"
            )));
        }
        if restart && let Err(e) = self.engine.start_container(old).await {
            diag.warn(Warning::restore_failed(format!(
                "could not restart previous container {old}: {e}"
            )));
        }
    }

    /// Stop the old container, start the new one under the primary name,
    /// then remove the old one. On failure the old container is restored.
    async fn replace(
        &self,
        config: &DeploymentConfig,
        image: &ImageRef,
        old: &ContainerId,
        diag: &mut Diagnostics,
    ) -> Result<ContainerId, DeployError> {
        let aside = format!("{}-previous", config.id);
        let present = self.stop_existing(old).await?;

        if present && let Err(e) = self.engine.rename_container(old, &aside).await {
            self.restore(old, &config.id, true, diag).await;
            return Err(e.into());
        }

        match self.launch(config, image, &config.id, Slot::Blue).await {
            Ok(new) => {
                if present {
                    self.remove_quietly(old, diag).await;
                }
                Ok(new)
            }
            Err(e) => {
                if present {
                    tracing::warn!(deployment = %config.id, container = %old, "new container failed, restoring previous");
                    self.restore(old, &config.id, true, diag).await;
                }
                Err(e)
            }
        }
    }

    /// Start `<id>-green` next to the running container, then switch over.
    /// Nothing about the original changes until green is confirmed, and the
    /// registry is only written by the caller once the switch is done.
    async fn side_by_side(
        &self,
        registration: &Registration<ContainerId>,
        config: &DeploymentConfig,
        image: &ImageRef,
        diag: &mut Diagnostics,
    ) -> Result<ContainerId, DeployError> {
        let id = &config.id;
        let green_name = format!("{id}-green");
        self.clear_stale_green(id, registration.handle.as_ref(), diag)
            .await?;
        let green = self.launch(config, image, &green_name, Slot::Green).await?;

        if let Some(old) = &registration.handle {
            if let Err(e) = self.stop_existing(old).await {
                tracing::warn!(deployment = %id, container = %old, error = %e, "could not stop blue container, discarding green");
                self.remove_quietly(&green, diag).await;
                return Err(e);
            }
            self.remove_quietly(old, diag).await;
        }

        if let Err(e) = self.engine.rename_container(&green, id).await {
            diag.warn(Warning::rename_failed(format!(
                "green container kept the name {green_name}: {e}"
            )));
        }

        tracing::info!(deployment = %id, container = %green, "switched to green container");
        Ok(green)
    }

    /// Remove green-slot containers of `id` left behind by an interrupted
    /// switch. The live container may carry the green label too.
    async fn clear_stale_green(
        &self,
        id: &str,
        live: Option<&ContainerId>,
        diag: &mut Diagnostics,
    ) -> Result<(), DeployError> {
        let filters = ContainerFilters {
            labels: [
                (LABEL_DEPLOYMENT.to_string(), id.to_string()),
                (LABEL_SLOT.to_string(), Slot::Green.as_str().to_string()),
            ]
            .into(),
            all: true,
            ..Default::default()
        };
        let stale = self.engine.list_containers(&filters).await?;
        for container in stale.iter().filter(|c| Some(&c.id) != live) {
            tracing::info!(deployment = %id, container = %container.id, name = %container.name, "removing stale green container");
            self.remove_quietly(&container.id, diag).await;
        }
        Ok(())
    }

    async fn deploy_inner(&self, mut config: DeploymentConfig) -> Result<DeploymentResult, DeployError> {
        let image = config.validate()?;
        let id = config.id.clone();

        if self.store.get(&id)?.is_some() {
            return Err(DeployError::AlreadyDeployed(id));
        }

        let replicas = config.scaling.min_replicas;
        if replicas > 1 {
            return Err(single_container_only(&id, replicas));
        }

        let image = self.prepare_image(&config, image).await?;
        config.image = image.to_string();

        if replicas == 0 {
            let status = convert::scaled_to_zero_status(&config);
            self.store.set(&id, Registration::new(config, None, 0))?;
            return Ok(DeploymentResult::succeeded(
                &id,
                status,
                format!("registered {id} with zero replicas"),
            ));
        }

        let container = self.launch(&config, &image, &id, Slot::Blue).await?;
        let registration = Registration::new(config, Some(container.clone()), 1);
        let status = self.status_of(&registration).await;
        self.store.set(&id, registration)?;

        tracing::info!(deployment = %id, container = %container, image = %image, "deployed");
        Ok(
            DeploymentResult::succeeded(&id, status, format!("deployed {id} from {image}"))
                .with_metadata("container_id", container.as_str())
                .with_metadata("image", image.to_string()),
        )
    }

    async fn update_inner(
        &self,
        id: &str,
        update: DeploymentUpdate,
    ) -> Result<DeploymentResult, DeployError> {
        let registration = self.registration(id)?;
        let mut config = registration.config.merged(&update);
        let image = config.validate()?;

        if config.scaling.min_replicas > 1 {
            return Err(single_container_only(id, config.scaling.min_replicas));
        }

        let (plan, fallback) = ContainerUpdatePlan::for_strategy(config.strategy, &config);
        if let Some(reason) = fallback {
            tracing::info!(deployment = %id, strategy = %config.strategy, reason, "strategy adjusted");
        }

        let image = self.prepare_image(&config, image).await?;
        config.image = image.to_string();

        let mut diag = Diagnostics::default();
        let handle = match &registration.handle {
            None => None,
            Some(old) => Some(match plan {
                ContainerUpdatePlan::Replace => {
                    self.replace(&config, &image, old, &mut diag).await?
                }
                ContainerUpdatePlan::SideBySide => {
                    self.side_by_side(&registration, &config, &image, &mut diag)
                        .await?
                }
            }),
        };

        let mut next = Registration::new(config, handle, registration.replicas);
        next.history = registration.history.clone();
        if registration.config.image != next.config.image {
            next.push_history(&registration.config.image);
        }
        let status = self.status_of(&next).await;
        let strategy = next.config.strategy;
        self.store.set(id, next)?;

        let mut result = DeploymentResult::succeeded(id, status, format!("updated {id} to {image}"))
            .with_metadata("strategy", strategy.to_string())
            .with_metadata("plan", format!("{plan:?}"))
            .with_metadata("image", image.to_string());
        if let Some(reason) = fallback {
            result = result.with_metadata("strategy_fallback", reason);
        }
        if let Some(warnings) = diag.summary() {
            result = result.with_metadata("warnings", warnings);
        }
        Ok(result)
    }

    async fn rollback_inner(
        &self,
        id: &str,
        version: Option<&str>,
    ) -> Result<DeploymentResult, DeployError> {
        let mut registration = self.registration(id)?;
        let current = registration.config.validate()?;

        let target_ref = resolve_target(&mut registration.history, &current, version)?;
        let target = target_ref.to_string();

        let mut config = registration.config.clone();
        config.image = target_ref.to_string();
        config.version = target_ref.tag().map(str::to_string);
        config.build = None;

        self.ensure_image(&target_ref).await?;

        let mut diag = Diagnostics::default();
        let handle = match &registration.handle {
            None => None,
            Some(old) => {
                let aside = format!("{id}-previous");
                let present = self.stop_existing(old).await?;
                if present && let Err(e) = self.engine.rename_container(old, &aside).await {
                    self.restore(old, id, true, &mut diag).await;
                    return Err(e.into());
                }

                match self.launch(&config, &target_ref, id, Slot::Blue).await {
                    Ok(new) => {
                        if present {
                            self.remove_quietly(old, &mut diag).await;
                        }
                        Some(new)
                    }
                    Err(e) => {
                        if present {
                            self.restore(old, id, false, &mut diag).await;
                        }
                        let mut failed =
                            DeploymentResult::failed(id, self.current_status(id).await, &e)
                                .with_metadata("rollback_target", target.clone())
                                .with_metadata("previous_container_state", "stopped");
                        failed.message = format!(
                            "{}; previous container {old} was left stopped",
                            failed.message
                        );
                        return Ok(failed);
                    }
                }
            }
        };

        registration.push_history(&current.to_string());
        registration.config = config;
        registration.handle = handle;
        registration.touch();
        let status = self.status_of(&registration).await;
        self.store.set(id, registration)?;

        tracing::info!(deployment = %id, from = %current, to = %target, "rolled back");
        let mut result =
            DeploymentResult::succeeded(id, status, format!("rolled back {id} to {target}"))
                .with_rollback(RollbackInfo::new(
                    &target,
                    &format!("rollback requested from {current}"),
                    RollbackStrategy::Immediate,
                ))
                .with_metadata("rolled_back_from", current.to_string());
        if let Some(warnings) = diag.summary() {
            result = result.with_metadata("warnings", warnings);
        }
        Ok(result)
    }

    async fn scale_inner(&self, id: &str, replicas: u32) -> Result<DeploymentResult, DeployError> {
        let mut registration = self.registration(id)?;
        if replicas > 1 {
            return Err(single_container_only(id, replicas));
        }

        let mut diag = Diagnostics::default();
        match (replicas, registration.handle.clone()) {
            (0, None) => {}
            (0, Some(handle)) => {
                self.stop_existing(&handle).await?;
                self.remove_quietly(&handle, &mut diag).await;
                registration.handle = None;
            }
            (_, Some(handle)) => {
                let running = match self.engine.inspect_container(&handle).await {
                    Ok(info) => info.state == ContainerState::Running,
                    Err(e) if e.is_not_found() => false,
                    Err(e) => return Err(e.into()),
                };
                if !running {
                    self.remove_quietly(&handle, &mut diag).await;
                    registration.handle = Some(self.relaunch(&registration.config).await?);
                }
            }
            (_, None) => {
                registration.handle = Some(self.relaunch(&registration.config).await?);
            }
        }

        registration.replicas = replicas;
        registration.config.scaling.min_replicas = replicas;
        registration.touch();
        let status = self.status_of(&registration).await;
        self.store.set(id, registration)?;

        let mut result =
            DeploymentResult::succeeded(id, status, format!("scaled {id} to {replicas}"))
                .with_metadata("replicas", replicas.to_string());
        if let Some(warnings) = diag.summary() {
            result = result.with_metadata("warnings", warnings);
        }
        Ok(result)
    }

    async fn relaunch(&self, config: &DeploymentConfig) -> Result<ContainerId, DeployError> {
        let image = config.validate()?;
        self.ensure_image(&image).await?;
        self.launch(config, &image, &config.id, Slot::Blue).await
    }

    async fn delete_inner(&self, id: &str) -> Result<(), DeployError> {
        let Some(registration) = self.store.get(id)? else {
            tracing::debug!(deployment = %id, "delete of unregistered deployment is a no-op");
            return Ok(());
        };

        if let Some(handle) = &registration.handle {
            self.stop_existing(handle).await?;
            match self.engine.remove_container(handle, true).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.store.delete(id)?;
        tracing::info!(deployment = %id, "deleted");
        Ok(())
    }
}

fn single_container_only(id: &str, replicas: u32) -> DeployError {
    DeployError::UnsupportedOperation(format!(
        "cannot run {id} with {replicas} replicas: the container engine runs one container per deployment; multiple replicas require a cluster platform"
    ))
}

#[async_trait]
impl PlatformAdapter for ContainerEngineManager {
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
        let registration = self.registration(id)?;
        let Some(handle) = registration.handle else {
            return Ok(Vec::new());
        };

        let options = LogOptions {
            tail: query.tail.map(u64::from),
            since: query.since,
            timestamps: query.timestamps,
            ..LogOptions::snapshot()
        };
        let mut stream = self.engine.container_logs(&handle, &options).await?;

        let mut lines = Vec::new();
        while let Some(line) = stream.next().await {
            let line = line?;
            lines.extend(line.content.lines().map(str::to_string));
        }
        Ok(lines)
    }

    async fn delete(&self, id: &str) -> Result<(), DeployError> {
        run_delete(&self.locks, self.events.as_ref(), id, self.delete_inner(id)).await
    }
}
