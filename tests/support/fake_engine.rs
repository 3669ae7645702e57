// ABOUTME: In-memory container engine implementing every engine capability trait.
// ABOUTME: Failures are scripted per image or container name so managers can be driven into edge cases.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use async_trait::async_trait;
use deckhand::runtime::{
    BuildConfig, ContainerError, ContainerFilters, ContainerInfo, ContainerOps, ContainerSpec,
    ContainerState, ContainerSummary, HealthState, ImageError, ImageOps, LogError, LogLine,
    LogOps, LogOptions, LogStream, LogStreamBox, RuntimeInfo, RuntimeInfoError, RuntimeMetadata,
    StatsError, StatsOps, StatsSample,
};
use deckhand::types::{ContainerId, ImageRef};
use parking_lot::Mutex;

#[derive(Debug, Clone)]
pub struct FakeContainer {
    pub id: ContainerId,
    pub name: String,
    pub image: String,
    pub state: ContainerState,
    pub health: Option<HealthState>,
    pub labels: BTreeMap<String, String>,
}

#[derive(Default)]
struct EngineState {
    containers: BTreeMap<String, FakeContainer>,
    next_id: u64,
    images: BTreeSet<String>,
    pulls: Vec<String>,
    /// Images whose containers exit right after start.
    crashing: BTreeSet<String>,
    /// Images whose healthcheck reports unhealthy.
    unhealthy: BTreeSet<String>,
    /// Images whose healthcheck never leaves `Starting`.
    never_healthy: BTreeSet<String>,
    /// Name suffixes that make create fail.
    refuse_names: Vec<String>,
    /// Container names whose stop fails.
    refuse_stops: BTreeSet<String>,
    logs: Vec<String>,
}

/// A container engine that keeps everything in memory.
#[derive(Default)]
pub struct FakeEngine {
    state: Mutex<EngineState>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Containers of `image` exit immediately after starting.
    pub fn crash_image(&self, image: &str) {
        self.state.lock().crashing.insert(image.to_string());
    }

    pub fn unhealthy_image(&self, image: &str) {
        self.state.lock().unhealthy.insert(image.to_string());
    }

    pub fn never_healthy_image(&self, image: &str) {
        self.state.lock().never_healthy.insert(image.to_string());
    }

    /// Creating a container whose name ends with `suffix` fails.
    pub fn refuse_name_suffix(&self, suffix: &str) {
        self.state.lock().refuse_names.push(suffix.to_string());
    }

    /// Stopping the container currently named `name` fails.
    pub fn refuse_stop(&self, name: &str) {
        self.state.lock().refuse_stops.insert(name.to_string());
    }

    pub fn allow_stops(&self) {
        self.state.lock().refuse_stops.clear();
    }

    pub fn set_logs(&self, lines: &[&str]) {
        self.state.lock().logs = lines.iter().map(|l| l.to_string()).collect();
    }

    /// Remove a container behind the manager's back.
    pub fn vanish(&self, name: &str) {
        self.state.lock().containers.retain(|_, c| c.name != name);
    }

    pub fn containers(&self) -> Vec<FakeContainer> {
        self.state.lock().containers.values().cloned().collect()
    }

    pub fn running(&self) -> Vec<FakeContainer> {
        self.containers()
            .into_iter()
            .filter(|c| c.state == ContainerState::Running)
            .collect()
    }

    pub fn by_name(&self, name: &str) -> Option<FakeContainer> {
        self.containers().into_iter().find(|c| c.name == name)
    }

    pub fn pulls(&self) -> Vec<String> {
        self.state.lock().pulls.clone()
    }
}

fn not_found(id: &ContainerId) -> ContainerError {
    ContainerError::NotFound(id.to_string())
}

#[async_trait]
impl ContainerOps for FakeEngine {
    async fn create_container(&self, spec: &ContainerSpec) -> Result<ContainerId, ContainerError> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock();
        if state.refuse_names.iter().any(|s| spec.name.ends_with(s.as_str())) {
            return Err(ContainerError::Runtime(format!(
                "refusing to create {}",
                spec.name
            )));
        }
        if state.containers.values().any(|c| c.name == spec.name) {
            return Err(ContainerError::AlreadyExists(spec.name.clone()));
        }

        state.next_id += 1;
        let id = ContainerId::new(format!("c{:04}", state.next_id));
        let container = FakeContainer {
            id: id.clone(),
            name: spec.name.clone(),
            image: spec.image.to_string(),
            state: ContainerState::Created,
            health: spec.healthcheck.as_ref().map(|_| HealthState::Starting),
            labels: spec.labels.clone(),
        };
        state.containers.insert(id.to_string(), container);
        Ok(id)
    }

    async fn start_container(&self, id: &ContainerId) -> Result<(), ContainerError> {
        tokio::task::yield_now().await;
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let container = state
            .containers
            .get_mut(id.as_str())
            .ok_or_else(|| not_found(id))?;

        if state.crashing.contains(&container.image) {
            container.state = ContainerState::Exited;
            return Ok(());
        }
        container.state = ContainerState::Running;
        if container.health.is_some() {
            container.health = Some(if state.unhealthy.contains(&container.image) {
                HealthState::Unhealthy
            } else if state.never_healthy.contains(&container.image) {
                HealthState::Starting
            } else {
                HealthState::Healthy
            });
        }
        Ok(())
    }

    async fn stop_container(
        &self,
        id: &ContainerId,
        _timeout: Duration,
    ) -> Result<(), ContainerError> {
        tokio::task::yield_now().await;
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let container = state
            .containers
            .get_mut(id.as_str())
            .ok_or_else(|| not_found(id))?;
        if state.refuse_stops.contains(&container.name) {
            return Err(ContainerError::Runtime("stop refused".to_string()));
        }
        if container.state == ContainerState::Running {
            container.state = ContainerState::Exited;
        }
        Ok(())
    }

    async fn remove_container(&self, id: &ContainerId, force: bool) -> Result<(), ContainerError> {
        let mut state = self.state.lock();
        let container = state
            .containers
            .get(id.as_str())
            .ok_or_else(|| not_found(id))?;
        if container.state == ContainerState::Running && !force {
            return Err(ContainerError::AlreadyRunning(id.to_string()));
        }
        state.containers.remove(id.as_str());
        Ok(())
    }

    async fn inspect_container(&self, id: &ContainerId) -> Result<ContainerInfo, ContainerError> {
        let state = self.state.lock();
        let container = state
            .containers
            .get(id.as_str())
            .ok_or_else(|| not_found(id))?;
        Ok(ContainerInfo {
            id: container.id.clone(),
            name: container.name.clone(),
            image: container.image.clone(),
            state: container.state,
            health: container.health,
            labels: container.labels.clone(),
        })
    }

    async fn list_containers(
        &self,
        filters: &ContainerFilters,
    ) -> Result<Vec<ContainerSummary>, ContainerError> {
        let state = self.state.lock();
        Ok(state
            .containers
            .values()
            .filter(|c| filters.all || c.state == ContainerState::Running)
            .filter(|c| filters.labels.iter().all(|(k, v)| c.labels.get(k) == Some(v)))
            .filter(|c| filters.name.as_ref().is_none_or(|n| c.name.contains(n.as_str())))
            .map(|c| ContainerSummary {
                id: c.id.clone(),
                name: c.name.clone(),
                image: c.image.clone(),
                state: format!("{:?}", c.state).to_lowercase(),
                labels: c.labels.clone(),
            })
            .collect())
    }

    async fn rename_container(
        &self,
        id: &ContainerId,
        new_name: &str,
    ) -> Result<(), ContainerError> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock();
        if state
            .containers
            .values()
            .any(|c| c.name == new_name && &c.id != id)
        {
            return Err(ContainerError::AlreadyExists(new_name.to_string()));
        }
        let container = state
            .containers
            .get_mut(id.as_str())
            .ok_or_else(|| not_found(id))?;
        container.name = new_name.to_string();
        Ok(())
    }
}

#[async_trait]
impl ImageOps for FakeEngine {
    async fn pull_image(&self, reference: &ImageRef) -> Result<(), ImageError> {
        let mut state = self.state.lock();
        state.pulls.push(reference.to_string());
        state.images.insert(reference.to_string());
        Ok(())
    }

    async fn image_exists(&self, reference: &ImageRef) -> Result<bool, ImageError> {
        Ok(self.state.lock().images.contains(&reference.to_string()))
    }

    async fn build_image(&self, config: &BuildConfig) -> Result<ImageRef, ImageError> {
        self.state.lock().images.insert(config.tag.to_string());
        Ok(config.tag.clone())
    }
}

#[async_trait]
impl LogOps for FakeEngine {
    async fn container_logs(
        &self,
        id: &ContainerId,
        opts: &LogOptions,
    ) -> Result<LogStreamBox, LogError> {
        let state = self.state.lock();
        if !state.containers.contains_key(id.as_str()) {
            return Err(LogError::ContainerNotFound(id.to_string()));
        }
        let mut lines = state.logs.clone();
        if let Some(tail) = opts.tail {
            let keep = (tail as usize).min(lines.len());
            lines.drain(..lines.len() - keep);
        }
        let items = lines.into_iter().map(|content| {
            Ok(LogLine {
                content,
                stream: LogStream::Stdout,
            })
        });
        Ok(Box::pin(futures::stream::iter(items.collect::<Vec<_>>())))
    }
}

#[async_trait]
impl StatsOps for FakeEngine {
    async fn container_stats(&self, id: &ContainerId) -> Result<StatsSample, StatsError> {
        if !self.state.lock().containers.contains_key(id.as_str()) {
            return Err(StatsError::ContainerNotFound(id.to_string()));
        }
        Ok(StatsSample {
            cpu_total: 300_000_000,
            precpu_total: 100_000_000,
            system_cpu: 2_000_000_000,
            presystem_cpu: 1_000_000_000,
            online_cpus: 2,
            memory_usage: 64 * 1024 * 1024,
            memory_limit: 256 * 1024 * 1024,
            ..Default::default()
        })
    }
}

#[async_trait]
impl RuntimeInfo for FakeEngine {
    async fn info(&self) -> Result<RuntimeMetadata, RuntimeInfoError> {
        Ok(RuntimeMetadata {
            name: "Fake".to_string(),
            version: "0.0.0".to_string(),
            api_version: "1.0".to_string(),
            os: "linux".to_string(),
            arch: "x86_64".to_string(),
        })
    }

    async fn ping(&self) -> Result<(), RuntimeInfoError> {
        Ok(())
    }
}
