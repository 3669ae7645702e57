// ABOUTME: Pure conversions between deployment intent, container specs and canonical status.
// ABOUTME: Human resource units become engine units; inspect results become DeploymentStatus.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::deploy::DeployError;
use crate::model::{
    Condition, ConditionStatus, DeploymentConfig, DeploymentStatus, Phase, Probe, ProbeAction,
    ReplicaCounts,
};
use crate::runtime::{
    ContainerInfo, ContainerSpec, ContainerState, HealthState, Healthcheck, PortMapping,
    ResourceLimits, RestartPolicy,
};
use crate::types::{ImageRef, quantity};

pub const LABEL_DEPLOYMENT: &str = "deckhand.deployment";
pub const LABEL_MANAGED: &str = "deckhand.managed";
pub const LABEL_SLOT: &str = "deckhand.slot";
pub const LABEL_VERSION: &str = "deckhand.version";

/// Which side of a blue-green pair a container belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Blue,
    Green,
}

impl Slot {
    pub fn as_str(&self) -> &'static str {
        match self {
            Slot::Blue => "blue",
            Slot::Green => "green",
        }
    }
}

/// Build the container spec for one deployment container.
///
/// Env, config data and resolved secrets all become container environment;
/// a single-container engine has no separate config or secret objects.
pub fn container_spec(
    config: &DeploymentConfig,
    image: &ImageRef,
    name: &str,
    slot: Slot,
    stop_timeout: Duration,
) -> Result<ContainerSpec, DeployError> {
    let mut env: BTreeMap<String, String> = config.config_data.clone();
    env.extend(config.resolved_env()?);
    env.extend(config.resolved_secrets()?);

    let mut labels = config.labels.clone();
    labels.insert(LABEL_DEPLOYMENT.to_string(), config.id.clone());
    labels.insert(LABEL_MANAGED.to_string(), "true".to_string());
    labels.insert(LABEL_SLOT.to_string(), slot.as_str().to_string());
    if let Some(version) = &config.version {
        labels.insert(LABEL_VERSION.to_string(), version.clone());
    }

    let ports = config
        .networking
        .ports
        .iter()
        .map(|p| PortMapping {
            host_port: p.host_port,
            container_port: p.container_port,
            protocol: p.protocol,
        })
        .collect();

    let resources = resource_limits(config)?;

    Ok(ContainerSpec {
        name: name.to_string(),
        image: image.clone(),
        env,
        labels,
        ports,
        restart_policy: RestartPolicy::UnlessStopped,
        resources: (!resources.is_empty()).then_some(resources),
        healthcheck: config.health_check.primary().and_then(healthcheck),
        stop_timeout: Some(stop_timeout),
    })
}

/// Translate requests/limits into engine units.
///
/// The CPU request (else the limit) sets the relative share weight; the CPU
/// limit also sets a hard nano-CPU cap. Memory limit is a hard limit and the
/// memory request a soft reservation.
pub fn resource_limits(config: &DeploymentConfig) -> Result<ResourceLimits, DeployError> {
    let requests = &config.resources.requests;
    let limits = &config.resources.limits;
    let invalid = |e: quantity::QuantityError| DeployError::Validation(e.to_string());

    let share_source = requests.cpu.as_deref().or(limits.cpu.as_deref());

    Ok(ResourceLimits {
        memory: limits
            .memory
            .as_deref()
            .map(quantity::parse_memory)
            .transpose()
            .map_err(invalid)?,
        memory_reservation: requests
            .memory
            .as_deref()
            .map(quantity::parse_memory)
            .transpose()
            .map_err(invalid)?,
        cpu_shares: share_source
            .map(quantity::cpu_shares)
            .transpose()
            .map_err(invalid)?,
        nano_cpus: limits
            .cpu
            .as_deref()
            .map(quantity::nano_cpus)
            .transpose()
            .map_err(invalid)?,
    })
}

/// Engine healthcheck for a probe.
pub fn healthcheck(probe: &Probe) -> Option<Healthcheck> {
    let test = match probe.action()? {
        ProbeAction::HttpGet { path, port } => vec![
            "CMD-SHELL".to_string(),
            format!(
                "curl -fsS http://localhost:{port}{path} >/dev/null || wget -q -O /dev/null http://localhost:{port}{path} || exit 1"
            ),
        ],
        ProbeAction::TcpSocket { port } => vec![
            "CMD-SHELL".to_string(),
            format!("nc -z localhost {port} || exit 1"),
        ],
        ProbeAction::Exec { command } => {
            let mut test = vec!["CMD".to_string()];
            test.extend(command.iter().cloned());
            test
        }
    };

    Some(Healthcheck {
        test,
        interval: probe.period,
        timeout: probe.timeout,
        retries: probe.failure_threshold,
        start_period: probe.initial_delay,
    })
}

/// Whether the engine considers the container fit to serve.
pub fn is_serving(info: &ContainerInfo) -> bool {
    info.state == ContainerState::Running
        && matches!(
            info.health,
            None | Some(HealthState::None) | Some(HealthState::Healthy)
        )
}

/// Canonical status for an inspected container.
///
/// Running iff the container runs and its health is healthy or absent;
/// anything else is Failed.
pub fn container_status(info: &ContainerInfo) -> DeploymentStatus {
    let serving = is_serving(info);
    let ready = u32::from(serving);
    let current = u32::from(info.state == ContainerState::Running);

    let phase = if serving { Phase::Running } else { Phase::Failed };
    let condition = if serving {
        Condition::new("Available", ConditionStatus::True)
    } else {
        Condition::new("Available", ConditionStatus::False).with_reason(
            "ContainerNotServing",
            format!(
                "container {} is {} (health: {})",
                info.name,
                state_name(info.state),
                health_name(info.health)
            ),
        )
    };

    DeploymentStatus::from_replicas(
        phase,
        ReplicaCounts {
            desired: 1,
            current,
            ready,
            available: ready,
            unavailable: 1 - ready,
        },
    )
    .with_condition(condition)
    .with_metadata("container_id", info.id.as_str())
    .with_metadata("container_name", info.name.as_str())
    .with_metadata("image", info.image.as_str())
    .with_metadata("state", state_name(info.state))
    .with_metadata("health", health_name(info.health))
}

/// Status of a deployment with no container (scaled to zero).
pub fn scaled_to_zero_status(config: &DeploymentConfig) -> DeploymentStatus {
    DeploymentStatus::from_replicas(Phase::Succeeded, ReplicaCounts::default())
        .with_condition(
            Condition::new("Available", ConditionStatus::False)
                .with_reason("ScaledToZero", "deployment is scaled to zero replicas"),
        )
        .with_metadata("image", config.image.as_str())
}

fn state_name(state: ContainerState) -> &'static str {
    match state {
        ContainerState::Created => "created",
        ContainerState::Running => "running",
        ContainerState::Paused => "paused",
        ContainerState::Restarting => "restarting",
        ContainerState::Removing => "removing",
        ContainerState::Exited => "exited",
        ContainerState::Dead => "dead",
    }
}

fn health_name(health: Option<HealthState>) -> &'static str {
    match health {
        None | Some(HealthState::None) => "none",
        Some(HealthState::Starting) => "starting",
        Some(HealthState::Healthy) => "healthy",
        Some(HealthState::Unhealthy) => "unhealthy",
    }
}
