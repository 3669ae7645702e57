// ABOUTME: Pure conversions from DeploymentConfig to native cluster specs and back to status.
// ABOUTME: No I/O here; the manager feeds these into the ClusterClient.

use std::collections::BTreeMap;

use crate::deploy::{DeployError, DeploymentStrategy};
use crate::model::{
    Condition, DeploymentConfig, DeploymentStatus, Phase, ReplicaCounts,
};
use crate::types::ImageRef;

use super::types::{
    AutoscalerSpec, ChartRequest, ContainerPort, DataObject, IngressRule, ServicePort,
    ServiceSpec, UpdateStrategy, WorkloadSpec, WorkloadState,
};
use crate::types::ReleaseName;

pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_TARGET_CPU: u32 = 80;

const LABEL_NAME: &str = "app.kubernetes.io/name";
const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";
const LABEL_DEPLOYMENT: &str = "deckhand.deployment";

pub fn namespace(config: &DeploymentConfig, fallback: &str) -> String {
    config
        .namespace
        .clone()
        .unwrap_or_else(|| fallback.to_string())
}

/// Labels selecting this deployment's pods.
pub fn selector(config: &DeploymentConfig) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_NAME.to_string(), config.name.clone()),
        (LABEL_DEPLOYMENT.to_string(), config.id.clone()),
    ])
}

/// Selector for pods created by a chart release.
pub fn release_selector(release: &ReleaseName) -> BTreeMap<String, String> {
    BTreeMap::from([(LABEL_INSTANCE.to_string(), release.to_string())])
}

fn resource_labels(config: &DeploymentConfig) -> BTreeMap<String, String> {
    let mut labels = config.labels.clone();
    labels.extend(selector(config));
    labels.insert(LABEL_MANAGED_BY.to_string(), "deckhand".to_string());
    if let Some(version) = &config.version {
        labels.insert("app.kubernetes.io/version".to_string(), version.clone());
    }
    labels
}

/// BlueGreen has no native equivalent on a workload and rolls instead.
pub fn update_strategy(strategy: DeploymentStrategy) -> UpdateStrategy {
    match strategy {
        DeploymentStrategy::Recreate => UpdateStrategy::Recreate,
        DeploymentStrategy::RollingUpdate | DeploymentStrategy::BlueGreen => {
            UpdateStrategy::rolling()
        }
    }
}

pub fn config_object_name(config: &DeploymentConfig) -> String {
    format!("{}-config", config.name)
}

pub fn secret_name(config: &DeploymentConfig) -> String {
    format!("{}-secrets", config.name)
}

pub fn workload_spec(
    config: &DeploymentConfig,
    namespace: &str,
    image: &ImageRef,
) -> Result<WorkloadSpec, DeployError> {
    Ok(WorkloadSpec {
        name: config.name.clone(),
        namespace: namespace.to_string(),
        labels: resource_labels(config),
        annotations: config.annotations.clone(),
        selector: selector(config),
        replicas: config.scaling.min_replicas,
        image: image.to_string(),
        ports: config
            .networking
            .ports
            .iter()
            .map(|p| ContainerPort {
                name: p.name.clone(),
                container_port: p.container_port,
                protocol: p.protocol,
            })
            .collect(),
        env: config.resolved_env()?,
        env_from_config: (!config.config_data.is_empty()).then(|| config_object_name(config)),
        env_from_secret: (!config.secrets.is_empty()).then(|| secret_name(config)),
        resources: config.resources.clone(),
        liveness: config.health_check.liveness.clone(),
        readiness: config.health_check.readiness.clone(),
        startup: config.health_check.startup.clone(),
        strategy: update_strategy(config.strategy),
    })
}

/// Service fronting the workload; `None` without ports.
pub fn service_spec(config: &DeploymentConfig, namespace: &str) -> Option<ServiceSpec> {
    if config.networking.ports.is_empty() {
        return None;
    }
    Some(ServiceSpec {
        name: config.name.clone(),
        namespace: namespace.to_string(),
        labels: resource_labels(config),
        selector: selector(config),
        ports: config
            .networking
            .ports
            .iter()
            .map(|p| ServicePort {
                name: p.name.clone(),
                port: p.host_port.unwrap_or(p.container_port),
                target_port: p.container_port,
                protocol: p.protocol,
            })
            .collect(),
    })
}

/// Ingress routing to the service's first port.
pub fn ingress_rule(
    config: &DeploymentConfig,
    namespace: &str,
) -> Result<Option<IngressRule>, DeployError> {
    let Some(ingress) = &config.networking.ingress else {
        return Ok(None);
    };
    let Some(port) = config.networking.ports.first() else {
        return Err(DeployError::Validation(format!(
            "ingress for {} needs at least one port to route to",
            config.id
        )));
    };

    Ok(Some(IngressRule {
        name: config.name.clone(),
        namespace: namespace.to_string(),
        labels: resource_labels(config),
        host: ingress.host.clone(),
        path: ingress.path.clone(),
        service_name: config.name.clone(),
        service_port: port.host_port.unwrap_or(port.container_port),
        tls_secret: ingress.tls_secret.clone(),
        class: ingress.class.clone(),
    }))
}

/// Autoscaler; only when `max_replicas > min_replicas`.
pub fn autoscaler_spec(config: &DeploymentConfig, namespace: &str) -> Option<AutoscalerSpec> {
    if !config.scaling.wants_autoscaler() {
        return None;
    }
    Some(AutoscalerSpec {
        name: config.name.clone(),
        namespace: namespace.to_string(),
        labels: resource_labels(config),
        target: config.name.clone(),
        min_replicas: config.scaling.min_replicas,
        max_replicas: config.scaling.max_replicas(),
        target_cpu_utilization: config
            .scaling
            .target_cpu_utilization
            .unwrap_or(DEFAULT_TARGET_CPU),
    })
}

pub fn config_object(config: &DeploymentConfig, namespace: &str) -> Option<DataObject> {
    if config.config_data.is_empty() {
        return None;
    }
    Some(DataObject {
        name: config_object_name(config),
        namespace: namespace.to_string(),
        labels: resource_labels(config),
        data: config.config_data.clone(),
    })
}

pub fn secret_object(
    config: &DeploymentConfig,
    namespace: &str,
) -> Result<Option<DataObject>, DeployError> {
    if config.secrets.is_empty() {
        return Ok(None);
    }
    Ok(Some(DataObject {
        name: secret_name(config),
        namespace: namespace.to_string(),
        labels: resource_labels(config),
        data: config.resolved_secrets()?,
    }))
}

/// Chart request carrying the image as a values override.
///
/// The chart's workload is pinned to the deployment name through
/// `fullnameOverride` so rollouts can be tracked.
pub fn chart_request(
    config: &DeploymentConfig,
    namespace: &str,
    image: &ImageRef,
) -> Result<Option<ChartRequest>, DeployError> {
    let Some(chart) = &config.chart else {
        return Ok(None);
    };

    let mut values = match &chart.values {
        serde_json::Value::Null => serde_json::Map::new(),
        serde_json::Value::Object(map) => map.clone(),
        _ => {
            return Err(DeployError::Validation(format!(
                "chart values for {} must be a mapping",
                config.id
            )));
        }
    };
    values
        .entry("fullnameOverride")
        .or_insert_with(|| serde_json::Value::String(config.name.clone()));
    values.insert("replicaCount".to_string(), config.scaling.min_replicas.into());
    values.insert("image".to_string(), image_values(image));

    Ok(Some(ChartRequest {
        release: release_name(config),
        namespace: namespace.to_string(),
        chart: chart.chart.clone(),
        repository: chart.repository.clone(),
        version: chart.version.clone(),
        values: serde_json::Value::Object(values),
    }))
}

pub fn release_name(config: &DeploymentConfig) -> ReleaseName {
    let name = config
        .chart
        .as_ref()
        .and_then(|c| c.release.clone())
        .unwrap_or_else(|| config.name.clone());
    ReleaseName::new(name)
}

fn image_values(image: &ImageRef) -> serde_json::Value {
    serde_json::json!({
        "repository": image.repository(),
        "tag": image.tag().unwrap_or("latest"),
    })
}

/// Canonical status for a workload.
///
/// Running iff every replica is available and there is at least one;
/// Succeeded iff scaled to zero; Pending while replicas are unavailable.
pub fn workload_status(state: &WorkloadState) -> DeploymentStatus {
    let phase = if state.replicas > 0 && state.available_replicas == state.replicas {
        Phase::Running
    } else if state.replicas == 0 {
        Phase::Succeeded
    } else if state.unavailable_replicas > 0 {
        Phase::Pending
    } else {
        Phase::Unknown
    };

    let mut status = DeploymentStatus::from_replicas(
        phase,
        ReplicaCounts {
            desired: state.desired_replicas,
            current: state.replicas,
            ready: state.ready_replicas,
            available: state.available_replicas,
            unavailable: state.unavailable_replicas,
        },
    )
    .with_metadata("workload", state.name.as_str())
    .with_metadata("namespace", state.namespace.as_str())
    .with_metadata("image", state.image.as_str());

    for c in &state.conditions {
        let mut condition = Condition::new(&c.condition_type, c.status);
        if let Some(reason) = &c.reason {
            condition = condition.with_reason(reason, c.message.clone().unwrap_or_default());
        }
        status = status.with_condition(condition);
    }
    status
}
