// ABOUTME: Shared types used across container engine trait definitions.
// ABOUTME: ContainerSpec, ContainerInfo, BuildConfig, StatsSample, RuntimeMetadata.

use crate::model::Protocol;
use crate::types::{ContainerId, ImageRef};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Specification for creating a container.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub name: String,
    pub image: ImageRef,
    pub env: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    pub ports: Vec<PortMapping>,
    pub restart_policy: RestartPolicy,
    pub resources: Option<ResourceLimits>,
    pub healthcheck: Option<Healthcheck>,
    pub stop_timeout: Option<Duration>,
}

/// Port mapping configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMapping {
    /// Host port; `None` exposes the port without publishing it.
    pub host_port: Option<u16>,
    pub container_port: u16,
    pub protocol: Protocol,
}

/// Restart policy configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RestartPolicy {
    No,
    Always,
    #[default]
    UnlessStopped,
}

/// Resource limits in engine units.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceLimits {
    /// Memory limit in bytes.
    pub memory: Option<u64>,
    /// Soft memory reservation in bytes.
    pub memory_reservation: Option<u64>,
    /// Relative CPU weight (1024 per core).
    pub cpu_shares: Option<u64>,
    /// Hard CPU cap in billionths of a core.
    pub nano_cpus: Option<u64>,
}

impl ResourceLimits {
    pub fn is_empty(&self) -> bool {
        *self == ResourceLimits::default()
    }
}

/// Healthcheck run by the engine inside the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Healthcheck {
    /// Test in engine form, e.g. `["CMD-SHELL", "curl -f http://localhost/"]`.
    pub test: Vec<String>,
    pub interval: Duration,
    pub timeout: Duration,
    pub retries: u32,
    pub start_period: Duration,
}

/// Information about a container.
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    pub id: ContainerId,
    pub name: String,
    pub image: String,
    pub state: ContainerState,
    /// Health status (if healthcheck configured).
    pub health: Option<HealthState>,
    pub labels: BTreeMap<String, String>,
}

/// Container state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
}

/// Health state of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Starting,
    Healthy,
    Unhealthy,
    None,
}

/// Image build request.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Directory sent to the engine as the build context.
    pub context: PathBuf,
    /// Dockerfile path relative to the context.
    pub dockerfile: String,
    pub tag: ImageRef,
    pub args: BTreeMap<String, String>,
}

/// Raw resource counters from one stats read.
///
/// CPU counters are cumulative nanoseconds; `precpu_*` hold the engine's
/// previous sample so a percentage can be derived from the delta.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsSample {
    pub cpu_total: u64,
    pub precpu_total: u64,
    pub system_cpu: u64,
    pub presystem_cpu: u64,
    pub online_cpus: u32,
    pub memory_usage: u64,
    pub memory_limit: u64,
    pub network_rx_bytes: u64,
    pub network_tx_bytes: u64,
    pub block_read_bytes: u64,
    pub block_write_bytes: u64,
}

/// Runtime metadata.
#[derive(Debug, Clone)]
pub struct RuntimeMetadata {
    /// Runtime name (e.g., "Docker", "Podman").
    pub name: String,
    pub version: String,
    pub api_version: String,
    pub os: String,
    pub arch: String,
}
