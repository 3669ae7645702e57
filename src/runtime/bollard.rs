// ABOUTME: Bollard-based container engine client.
// ABOUTME: Supports both Docker and Podman via the Docker-compatible API.

use crate::runtime::traits::{
    BuildConfig, ContainerError, ContainerFilters, ContainerInfo, ContainerOps, ContainerSpec,
    ContainerState, ContainerSummary, HealthState, ImageError, ImageOps, LogError, LogLine,
    LogOps, LogOptions, LogStream, LogStreamBox, ResourceLimits, RestartPolicy, RuntimeInfo,
    RuntimeInfoError, RuntimeMetadata, StatsError, StatsOps, StatsSample,
};
use crate::runtime::types::{RuntimeEndpoint, RuntimeType};
use crate::types::{ContainerId, ImageRef};
use async_trait::async_trait;
use bollard::Docker;
use bollard::models::{
    ContainerCreateBody, ContainerStatsResponse, HealthConfig, HostConfig, PortBinding,
    RestartPolicy as BollardRestartPolicy, RestartPolicyNameEnum,
};
use bollard::query_parameters::{
    BuildImageOptions, CreateContainerOptions, CreateImageOptions, InspectContainerOptions,
    ListContainersOptions, LogsOptions, RemoveContainerOptions, RenameContainerOptions,
    StartContainerOptions, StatsOptions, StopContainerOptions,
};
use bytes::Bytes;
use futures::StreamExt;
use http_body_util::{Either, Full};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

// =============================================================================
// Error Mapping Helpers
// =============================================================================

fn status_code(e: &bollard::errors::Error) -> Option<(u16, &str)> {
    match e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } => Some((*status_code, message.as_str())),
        _ => None,
    }
}

fn map_container_create_error(e: bollard::errors::Error) -> ContainerError {
    match status_code(&e) {
        Some((404, message)) => ContainerError::ImageNotFound(message.to_string()),
        Some((409, message)) => ContainerError::AlreadyExists(message.to_string()),
        _ => ContainerError::Runtime(e.to_string()),
    }
}

fn map_container_start_error(e: bollard::errors::Error) -> ContainerError {
    match status_code(&e) {
        Some((404, message)) => ContainerError::NotFound(message.to_string()),
        Some((304, message)) => ContainerError::AlreadyRunning(message.to_string()),
        _ => ContainerError::Runtime(e.to_string()),
    }
}

fn map_container_stop_error(e: bollard::errors::Error) -> ContainerError {
    match status_code(&e) {
        Some((404, message)) => ContainerError::NotFound(message.to_string()),
        Some((304, message)) => ContainerError::NotRunning(message.to_string()),
        _ => ContainerError::Runtime(e.to_string()),
    }
}

fn map_container_not_found_error(e: bollard::errors::Error) -> ContainerError {
    match status_code(&e) {
        Some((404, message)) => ContainerError::NotFound(message.to_string()),
        _ => ContainerError::Runtime(e.to_string()),
    }
}

fn map_container_rename_error(e: bollard::errors::Error) -> ContainerError {
    match status_code(&e) {
        Some((404, message)) => ContainerError::NotFound(message.to_string()),
        Some((409, message)) => ContainerError::AlreadyExists(message.to_string()),
        _ => ContainerError::Runtime(e.to_string()),
    }
}

fn map_stats_error(e: bollard::errors::Error, id: &ContainerId) -> StatsError {
    match status_code(&e) {
        Some((404, _)) => StatsError::ContainerNotFound(id.to_string()),
        _ => StatsError::Runtime(e.to_string()),
    }
}

fn map_log_error(e: bollard::errors::Error) -> LogError {
    match status_code(&e) {
        Some((404, message)) => LogError::ContainerNotFound(message.to_string()),
        _ => LogError::StreamError(e.to_string()),
    }
}

// =============================================================================
// BollardRuntime
// =============================================================================

/// Container engine client using bollard.
pub struct BollardRuntime {
    client: Docker,
    runtime_type: RuntimeType,
}

impl BollardRuntime {
    pub fn new(client: Docker, runtime_type: RuntimeType) -> Self {
        Self {
            client,
            runtime_type,
        }
    }

    /// Connect to the socket of a detected runtime. Does not contact the engine.
    pub fn connect(endpoint: &RuntimeEndpoint) -> Result<Self, RuntimeInfoError> {
        let client =
            Docker::connect_with_unix(&endpoint.socket_path, 120, bollard::API_DEFAULT_VERSION)
                .map_err(|e| RuntimeInfoError::ConnectionFailed(e.to_string()))?;
        Ok(Self::new(client, endpoint.runtime_type))
    }

    /// Get the runtime type (Docker or Podman).
    pub fn runtime_type(&self) -> RuntimeType {
        self.runtime_type
    }
}

#[async_trait]
impl RuntimeInfo for BollardRuntime {
    async fn info(&self) -> Result<RuntimeMetadata, RuntimeInfoError> {
        let info = self
            .client
            .info()
            .await
            .map_err(|e| RuntimeInfoError::ConnectionFailed(e.to_string()))?;

        let name = match self.runtime_type {
            RuntimeType::Docker => "Docker".to_string(),
            RuntimeType::Podman => "Podman".to_string(),
        };

        Ok(RuntimeMetadata {
            name,
            version: info.server_version.unwrap_or_default(),
            api_version: bollard::API_DEFAULT_VERSION.to_string(),
            os: info.operating_system.unwrap_or_default(),
            arch: info.architecture.unwrap_or_default(),
        })
    }

    async fn ping(&self) -> Result<(), RuntimeInfoError> {
        self.client
            .ping()
            .await
            .map_err(|e| RuntimeInfoError::ConnectionFailed(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl ImageOps for BollardRuntime {
    async fn pull_image(&self, reference: &ImageRef) -> Result<(), ImageError> {
        let image_name = reference.to_string();

        let opts = CreateImageOptions {
            from_image: Some(image_name.clone()),
            ..Default::default()
        };

        // Pull returns a stream of progress updates; drain it
        let mut stream = self.client.create_image(Some(opts), None, None);
        while let Some(result) = stream.next().await {
            result.map_err(|e| match status_code(&e) {
                Some((404, _)) => ImageError::NotFound(image_name.clone()),
                _ => ImageError::PullFailed(format!("{}: {}", image_name, e)),
            })?;
        }

        Ok(())
    }

    async fn image_exists(&self, reference: &ImageRef) -> Result<bool, ImageError> {
        let image_name = reference.to_string();

        match self.client.inspect_image(&image_name).await {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(ImageError::Runtime(format!(
                "failed to inspect {}: {}",
                image_name, e
            ))),
        }
    }

    async fn build_image(&self, config: &BuildConfig) -> Result<ImageRef, ImageError> {
        let context = config.context.clone();
        let archive = tokio::task::spawn_blocking(move || archive_context(&context))
            .await
            .map_err(|e| ImageError::BuildFailed(e.to_string()))?
            .map_err(|e| {
                ImageError::BuildFailed(format!(
                    "cannot read build context {}: {}",
                    config.context.display(),
                    e
                ))
            })?;

        let options = BuildImageOptions {
            dockerfile: config.dockerfile.clone(),
            t: Some(config.tag.to_string()),
            buildargs: if config.args.is_empty() {
                None
            } else {
                Some(config.args.clone().into_iter().collect())
            },
            rm: true,
            ..Default::default()
        };

        let body = Either::Left(Full::new(Bytes::from(archive)));
        let mut stream = self.client.build_image(options, None, Some(body));

        while let Some(result) = stream.next().await {
            let output = result.map_err(|e| ImageError::BuildFailed(e.to_string()))?;
            if let Some(detail) = output.error_detail {
                return Err(ImageError::BuildFailed(
                    detail
                        .message
                        .unwrap_or_else(|| "build reported an error".to_string()),
                ));
            }
            if let Some(line) = output.stream {
                let line = line.trim_end();
                if !line.is_empty() {
                    tracing::debug!(tag = %config.tag, "{}", line);
                }
            }
        }

        Ok(config.tag.clone())
    }
}

fn archive_context(dir: &Path) -> std::io::Result<Vec<u8>> {
    let mut ar = tar::Builder::new(Vec::new());
    ar.append_dir_all(".", dir)?;
    ar.into_inner()
}

/// Translate a container spec into the engine's create body.
fn create_body(spec: &ContainerSpec) -> ContainerCreateBody {
    let env: Vec<String> = spec
        .env
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();

    let labels: HashMap<String, String> = spec.labels.clone().into_iter().collect();

    let mut host_config = HostConfig {
        restart_policy: Some(BollardRestartPolicy {
            name: Some(match spec.restart_policy {
                RestartPolicy::No => RestartPolicyNameEnum::NO,
                RestartPolicy::Always => RestartPolicyNameEnum::ALWAYS,
                RestartPolicy::UnlessStopped => RestartPolicyNameEnum::UNLESS_STOPPED,
            }),
            maximum_retry_count: None,
        }),
        ..Default::default()
    };

    if let Some(resources) = &spec.resources {
        apply_resource_limits(&mut host_config, resources);
    }

    let mut port_bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
    let mut exposed_ports: Vec<String> = Vec::new();
    for port in &spec.ports {
        let port_key = format!("{}/{}", port.container_port, port.protocol.as_str());
        exposed_ports.push(port_key.clone());

        if let Some(host_port) = port.host_port {
            port_bindings.insert(
                port_key,
                Some(vec![PortBinding {
                    host_ip: None,
                    host_port: Some(host_port.to_string()),
                }]),
            );
        }
    }
    if !port_bindings.is_empty() {
        host_config.port_bindings = Some(port_bindings);
    }

    let healthcheck = spec.healthcheck.as_ref().map(|hc| HealthConfig {
        test: Some(hc.test.clone()),
        interval: Some(hc.interval.as_nanos() as i64),
        timeout: Some(hc.timeout.as_nanos() as i64),
        retries: Some(hc.retries as i64),
        start_period: Some(hc.start_period.as_nanos() as i64),
        start_interval: None,
    });

    ContainerCreateBody {
        image: Some(spec.image.to_string()),
        env: if env.is_empty() { None } else { Some(env) },
        labels: if labels.is_empty() {
            None
        } else {
            Some(labels)
        },
        host_config: Some(host_config),
        healthcheck,
        exposed_ports: if exposed_ports.is_empty() {
            None
        } else {
            Some(exposed_ports)
        },
        stop_timeout: spec.stop_timeout.map(|d| d.as_secs() as i64),
        ..Default::default()
    }
}

fn apply_resource_limits(host_config: &mut HostConfig, limits: &ResourceLimits) {
    host_config.memory = limits.memory.map(|b| b as i64);
    host_config.memory_reservation = limits.memory_reservation.map(|b| b as i64);
    host_config.cpu_shares = limits.cpu_shares.map(|s| s as i64);
    host_config.nano_cpus = limits.nano_cpus.map(|n| n as i64);
}

#[async_trait]
impl ContainerOps for BollardRuntime {
    async fn create_container(&self, spec: &ContainerSpec) -> Result<ContainerId, ContainerError> {
        let opts = CreateContainerOptions {
            name: Some(spec.name.clone()),
            ..Default::default()
        };

        let response = self
            .client
            .create_container(Some(opts), create_body(spec))
            .await
            .map_err(map_container_create_error)?;

        Ok(ContainerId::new(response.id))
    }

    async fn start_container(&self, id: &ContainerId) -> Result<(), ContainerError> {
        self.client
            .start_container(id.as_str(), None::<StartContainerOptions>)
            .await
            .map_err(map_container_start_error)
    }

    async fn stop_container(
        &self,
        id: &ContainerId,
        timeout: Duration,
    ) -> Result<(), ContainerError> {
        let opts = StopContainerOptions {
            t: Some(timeout.as_secs() as i32),
            signal: None,
        };

        match self.client.stop_container(id.as_str(), Some(opts)).await {
            Ok(()) => Ok(()),
            // Already stopped is what we wanted
            Err(e) => match map_container_stop_error(e) {
                ContainerError::NotRunning(_) => Ok(()),
                other => Err(other),
            },
        }
    }

    async fn remove_container(&self, id: &ContainerId, force: bool) -> Result<(), ContainerError> {
        let opts = RemoveContainerOptions {
            force,
            ..Default::default()
        };

        self.client
            .remove_container(id.as_str(), Some(opts))
            .await
            .map_err(map_container_not_found_error)
    }

    async fn inspect_container(&self, id: &ContainerId) -> Result<ContainerInfo, ContainerError> {
        let details = self
            .client
            .inspect_container(id.as_str(), None::<InspectContainerOptions>)
            .await
            .map_err(map_container_not_found_error)?;

        let state = details
            .state
            .as_ref()
            .and_then(|s| s.status)
            .map(|s| match s {
                bollard::models::ContainerStateStatusEnum::CREATED => ContainerState::Created,
                bollard::models::ContainerStateStatusEnum::RUNNING => ContainerState::Running,
                bollard::models::ContainerStateStatusEnum::PAUSED => ContainerState::Paused,
                bollard::models::ContainerStateStatusEnum::RESTARTING => ContainerState::Restarting,
                bollard::models::ContainerStateStatusEnum::REMOVING => ContainerState::Removing,
                bollard::models::ContainerStateStatusEnum::DEAD => ContainerState::Dead,
                _ => ContainerState::Exited,
            })
            .unwrap_or(ContainerState::Exited);

        let health = details
            .state
            .as_ref()
            .and_then(|s| s.health.as_ref())
            .and_then(|h| h.status)
            .map(|s| match s {
                bollard::models::HealthStatusEnum::STARTING => HealthState::Starting,
                bollard::models::HealthStatusEnum::HEALTHY => HealthState::Healthy,
                bollard::models::HealthStatusEnum::UNHEALTHY => HealthState::Unhealthy,
                _ => HealthState::None,
            });

        Ok(ContainerInfo {
            id: id.clone(),
            name: details
                .name
                .unwrap_or_default()
                .trim_start_matches('/')
                .to_string(),
            image: details
                .config
                .as_ref()
                .and_then(|c| c.image.clone())
                .unwrap_or_default(),
            state,
            health,
            labels: details
                .config
                .and_then(|c| c.labels)
                .unwrap_or_default()
                .into_iter()
                .collect(),
        })
    }

    async fn list_containers(
        &self,
        filters: &ContainerFilters,
    ) -> Result<Vec<ContainerSummary>, ContainerError> {
        let mut filter_map: HashMap<String, Vec<String>> = HashMap::new();

        if let Some(name) = &filters.name {
            filter_map.insert("name".to_string(), vec![name.clone()]);
        }

        for (key, value) in &filters.labels {
            filter_map
                .entry("label".to_string())
                .or_default()
                .push(format!("{}={}", key, value));
        }

        let opts = ListContainersOptions {
            all: filters.all,
            filters: Some(filter_map),
            ..Default::default()
        };

        let containers = self
            .client
            .list_containers(Some(opts))
            .await
            .map_err(|e| ContainerError::Runtime(e.to_string()))?;

        Ok(containers
            .into_iter()
            .map(|c| ContainerSummary {
                id: ContainerId::new(c.id.unwrap_or_default()),
                name: c
                    .names
                    .unwrap_or_default()
                    .first()
                    .map(|n| n.trim_start_matches('/').to_string())
                    .unwrap_or_default(),
                image: c.image.unwrap_or_default(),
                state: c
                    .state
                    .map(|s| format!("{:?}", s).to_lowercase())
                    .unwrap_or_default(),
                labels: c.labels.unwrap_or_default().into_iter().collect(),
            })
            .collect())
    }

    async fn rename_container(
        &self,
        id: &ContainerId,
        new_name: &str,
    ) -> Result<(), ContainerError> {
        self.client
            .rename_container(
                id.as_str(),
                RenameContainerOptions {
                    name: new_name.to_string(),
                },
            )
            .await
            .map_err(map_container_rename_error)
    }
}

#[async_trait]
impl LogOps for BollardRuntime {
    async fn container_logs(
        &self,
        id: &ContainerId,
        opts: &LogOptions,
    ) -> Result<LogStreamBox, LogError> {
        let log_opts = LogsOptions {
            stdout: opts.stdout,
            stderr: opts.stderr,
            follow: opts.follow,
            timestamps: opts.timestamps,
            tail: opts
                .tail
                .map(|n| n.to_string())
                .unwrap_or_else(|| "all".to_string()),
            since: opts
                .since
                .and_then(|s| s.try_into().ok())
                .unwrap_or_default(),
            ..Default::default()
        };

        let stream = self.client.logs(id.as_str(), Some(log_opts));

        let mapped_stream = stream.map(|result| {
            result
                .map(|output| {
                    let (stream_type, data) = match output {
                        bollard::container::LogOutput::StdErr { message } => {
                            (LogStream::Stderr, message)
                        }
                        bollard::container::LogOutput::StdOut { message }
                        | bollard::container::LogOutput::StdIn { message }
                        | bollard::container::LogOutput::Console { message } => {
                            (LogStream::Stdout, message)
                        }
                    };

                    LogLine {
                        content: String::from_utf8_lossy(&data).to_string(),
                        stream: stream_type,
                    }
                })
                .map_err(map_log_error)
        });

        Ok(Box::pin(mapped_stream))
    }
}

#[async_trait]
impl StatsOps for BollardRuntime {
    async fn container_stats(&self, id: &ContainerId) -> Result<StatsSample, StatsError> {
        let opts = StatsOptions {
            stream: false,
            one_shot: false,
        };

        let mut stream = self.client.stats(id.as_str(), Some(opts));
        let response = stream
            .next()
            .await
            .ok_or_else(|| StatsError::Empty(id.to_string()))?
            .map_err(|e| map_stats_error(e, id))?;

        Ok(sample_from_response(&response))
    }
}

fn counter<T: TryInto<u64>>(value: Option<T>) -> u64 {
    value.and_then(|v| v.try_into().ok()).unwrap_or(0)
}

fn sample_from_response(stats: &ContainerStatsResponse) -> StatsSample {
    let cpu = stats.cpu_stats.as_ref();
    let precpu = stats.precpu_stats.as_ref();
    let memory = stats.memory_stats.as_ref();

    let (network_rx_bytes, network_tx_bytes) = stats
        .networks
        .as_ref()
        .map(|nets| {
            nets.values().fold((0u64, 0u64), |(rx, tx), net| {
                (rx + counter(net.rx_bytes), tx + counter(net.tx_bytes))
            })
        })
        .unwrap_or_default();

    let (block_read_bytes, block_write_bytes) = stats
        .blkio_stats
        .as_ref()
        .and_then(|b| b.io_service_bytes_recursive.as_ref())
        .map(|entries| {
            entries.iter().fold((0u64, 0u64), |(read, write), entry| {
                let value = counter(entry.value);
                match entry.op.as_deref() {
                    Some(op) if op.eq_ignore_ascii_case("read") => (read + value, write),
                    Some(op) if op.eq_ignore_ascii_case("write") => (read, write + value),
                    _ => (read, write),
                }
            })
        })
        .unwrap_or_default();

    StatsSample {
        cpu_total: counter(cpu.and_then(|c| c.cpu_usage.as_ref()).and_then(|u| u.total_usage)),
        precpu_total: counter(
            precpu
                .and_then(|c| c.cpu_usage.as_ref())
                .and_then(|u| u.total_usage),
        ),
        system_cpu: counter(cpu.and_then(|c| c.system_cpu_usage)),
        presystem_cpu: counter(precpu.and_then(|c| c.system_cpu_usage)),
        online_cpus: cpu
            .and_then(|c| c.online_cpus)
            .and_then(|n| n.try_into().ok())
            .unwrap_or(0),
        memory_usage: counter(memory.and_then(|m| m.usage)),
        memory_limit: counter(memory.and_then(|m| m.limit)),
        network_rx_bytes,
        network_tx_bytes,
        block_read_bytes,
        block_write_bytes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Protocol;
    use crate::runtime::traits::PortMapping;
    use std::collections::BTreeMap;

    fn spec() -> ContainerSpec {
        ContainerSpec {
            name: "app-1".to_string(),
            image: ImageRef::parse("app:v1").unwrap(),
            env: BTreeMap::from([("MODE".to_string(), "prod".to_string())]),
            labels: BTreeMap::from([("deckhand.deployment".to_string(), "app-1".to_string())]),
            ports: vec![
                PortMapping {
                    host_port: Some(8080),
                    container_port: 80,
                    protocol: Protocol::Tcp,
                },
                PortMapping {
                    host_port: None,
                    container_port: 53,
                    protocol: Protocol::Udp,
                },
            ],
            restart_policy: RestartPolicy::UnlessStopped,
            resources: Some(ResourceLimits {
                memory: Some(512 * 1024 * 1024),
                memory_reservation: None,
                cpu_shares: Some(512),
                nano_cpus: None,
            }),
            healthcheck: None,
            stop_timeout: Some(Duration::from_secs(10)),
        }
    }

    #[test]
    fn create_body_carries_limits_and_ports() {
        let body = create_body(&spec());
        let host = body.host_config.unwrap();

        assert_eq!(host.memory, Some(512 * 1024 * 1024));
        assert_eq!(host.cpu_shares, Some(512));
        assert_eq!(host.nano_cpus, None);

        let bindings = host.port_bindings.unwrap();
        assert!(bindings.contains_key("80/tcp"));
        assert!(!bindings.contains_key("53/udp"));

        let exposed = body.exposed_ports.unwrap();
        assert!(exposed.contains(&"53/udp".to_string()));
        assert_eq!(body.env.unwrap(), vec!["MODE=prod".to_string()]);
        assert_eq!(body.stop_timeout, Some(10));
    }

    #[test]
    fn create_body_omits_empty_collections() {
        let mut spec = spec();
        spec.env.clear();
        spec.labels.clear();
        spec.ports.clear();
        let body = create_body(&spec);

        assert!(body.env.is_none());
        assert!(body.labels.is_none());
        assert!(body.exposed_ports.is_none());
    }

    #[test]
    fn archive_context_includes_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Dockerfile"), "FROM scratch\n").unwrap();

        let archive = archive_context(dir.path()).unwrap();
        let mut ar = tar::Archive::new(archive.as_slice());
        let names: Vec<String> = ar
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().display().to_string())
            .collect();
        assert!(names.iter().any(|n| n.ends_with("Dockerfile")));
    }
}
