// ABOUTME: DeploymentConfig, the immutable deployment intent, and its update patch.
// ABOUTME: Validation runs before any platform call; updates merge into a new config.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::EnvValue;
use crate::deploy::{DeployError, DeploymentStrategy};
use crate::types::{ImageRef, quantity};

/// Immutable deployment intent supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub image: String,

    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub environment: Option<String>,

    #[serde(default)]
    pub strategy: DeploymentStrategy,

    #[serde(default)]
    pub resources: ResourceRequirements,

    #[serde(default)]
    pub networking: NetworkingConfig,

    #[serde(default)]
    pub health_check: HealthCheckConfig,

    #[serde(default)]
    pub scaling: ScalingConfig,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    #[serde(default)]
    pub annotations: BTreeMap<String, String>,

    #[serde(default)]
    pub env: BTreeMap<String, EnvValue>,

    /// Build the image before deploying (container engine only).
    #[serde(default)]
    pub build: Option<BuildSpec>,

    /// Install through a chart instead of native resources (cluster only).
    #[serde(default)]
    pub chart: Option<ChartRef>,

    #[serde(default)]
    pub namespace: Option<String>,

    /// Key/values published as a config object next to the workload.
    #[serde(default)]
    pub config_data: BTreeMap<String, String>,

    /// Key/values published as a secret object next to the workload.
    #[serde(default)]
    pub secrets: BTreeMap<String, EnvValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    #[serde(default)]
    pub requests: ResourceQuantities,
    #[serde(default)]
    pub limits: ResourceQuantities,
}

/// CPU and memory in human units ("500m", "512Mi").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceQuantities {
    #[serde(default)]
    pub cpu: Option<String>,
    #[serde(default)]
    pub memory: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkingConfig {
    #[serde(default)]
    pub ports: Vec<PortSpec>,
    #[serde(default)]
    pub ingress: Option<IngressSpec>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortSpec {
    pub container_port: u16,
    /// Publish on the host (container engine only).
    #[serde(default)]
    pub host_port: Option<u16>,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default)]
    pub name: Option<String>,
}

impl PortSpec {
    pub fn container(port: u16) -> Self {
        Self {
            container_port: port,
            host_port: None,
            protocol: Protocol::Tcp,
            name: None,
        }
    }

    pub fn published(host: u16, container: u16) -> Self {
        Self {
            host_port: Some(host),
            ..Self::container(container)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngressSpec {
    pub host: String,
    #[serde(default = "default_ingress_path")]
    pub path: String,
    #[serde(default)]
    pub tls_secret: Option<String>,
    #[serde(default)]
    pub class: Option<String>,
}

fn default_ingress_path() -> String {
    "/".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    #[serde(default)]
    pub liveness: Option<Probe>,
    #[serde(default)]
    pub readiness: Option<Probe>,
    #[serde(default)]
    pub startup: Option<Probe>,
}

impl HealthCheckConfig {
    pub fn is_empty(&self) -> bool {
        self.liveness.is_none() && self.readiness.is_none() && self.startup.is_none()
    }

    /// Probe that decides whether traffic may be sent: readiness, else liveness.
    pub fn primary(&self) -> Option<&Probe> {
        self.readiness.as_ref().or(self.liveness.as_ref())
    }
}

/// A health probe. Exactly one of `http_get`, `tcp_socket`, `exec` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Probe {
    #[serde(default)]
    pub http_get: Option<HttpGetAction>,
    #[serde(default)]
    pub tcp_socket: Option<u16>,
    #[serde(default)]
    pub exec: Option<Vec<String>>,

    #[serde(default, with = "humantime_serde")]
    pub initial_delay: Duration,

    #[serde(default = "default_probe_period", with = "humantime_serde")]
    pub period: Duration,

    #[serde(default = "default_probe_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpGetAction {
    #[serde(default = "default_ingress_path")]
    pub path: String,
    pub port: u16,
}

/// What a probe does, resolved from the mutually exclusive probe fields.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeAction<'a> {
    HttpGet { path: &'a str, port: u16 },
    TcpSocket { port: u16 },
    Exec { command: &'a [String] },
}

impl Probe {
    pub fn http(path: &str, port: u16) -> Self {
        Self {
            http_get: Some(HttpGetAction {
                path: path.to_string(),
                port,
            }),
            tcp_socket: None,
            exec: None,
            initial_delay: Duration::ZERO,
            period: default_probe_period(),
            timeout: default_probe_timeout(),
            failure_threshold: default_failure_threshold(),
        }
    }

    pub fn action(&self) -> Option<ProbeAction<'_>> {
        if let Some(http) = &self.http_get {
            return Some(ProbeAction::HttpGet {
                path: &http.path,
                port: http.port,
            });
        }
        if let Some(port) = self.tcp_socket {
            return Some(ProbeAction::TcpSocket { port });
        }
        self.exec
            .as_deref()
            .map(|command| ProbeAction::Exec { command })
    }

    fn configured_actions(&self) -> usize {
        usize::from(self.http_get.is_some())
            + usize::from(self.tcp_socket.is_some())
            + usize::from(self.exec.is_some())
    }
}

fn default_probe_period() -> Duration {
    Duration::from_secs(10)
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_failure_threshold() -> u32 {
    3
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingConfig {
    #[serde(default = "default_min_replicas")]
    pub min_replicas: u32,
    /// Defaults to `min_replicas` (no autoscaling).
    #[serde(default)]
    pub max_replicas: Option<u32>,
    #[serde(default)]
    pub target_cpu_utilization: Option<u32>,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            min_replicas: default_min_replicas(),
            max_replicas: None,
            target_cpu_utilization: None,
        }
    }
}

impl ScalingConfig {
    pub fn max_replicas(&self) -> u32 {
        self.max_replicas.unwrap_or(self.min_replicas)
    }

    /// An autoscaler is created only when there is room to scale.
    pub fn wants_autoscaler(&self) -> bool {
        self.max_replicas() > self.min_replicas
    }
}

fn default_min_replicas() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildSpec {
    /// Build context directory, sent to the engine as a tar archive.
    pub context: String,
    #[serde(default = "default_dockerfile")]
    pub dockerfile: String,
    /// Tag for the built image. Defaults to the deployment's image.
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub args: BTreeMap<String, String>,
}

fn default_dockerfile() -> String {
    "Dockerfile".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartRef {
    pub chart: String,
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    /// Release name; defaults to the deployment name.
    #[serde(default)]
    pub release: Option<String>,
    #[serde(default)]
    pub values: serde_json::Value,
}

impl DeploymentConfig {
    /// Minimal config with defaults for everything but identity and image.
    pub fn new(id: &str, name: &str, image: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            image: image.to_string(),
            version: None,
            environment: None,
            strategy: DeploymentStrategy::default(),
            resources: ResourceRequirements::default(),
            networking: NetworkingConfig::default(),
            health_check: HealthCheckConfig::default(),
            scaling: ScalingConfig::default(),
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            env: BTreeMap::new(),
            build: None,
            chart: None,
            namespace: None,
            config_data: BTreeMap::new(),
            secrets: BTreeMap::new(),
        }
    }

    /// Check the config and return its parsed image reference.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::Validation` if `id`, `name` or `image` is missing,
    /// the image does not parse, or a resource quantity, scaling bound or
    /// probe is malformed.
    pub fn validate(&self) -> Result<ImageRef, DeployError> {
        let missing: Vec<&str> = [
            ("id", self.id.trim().is_empty()),
            ("name", self.name.trim().is_empty()),
            ("image", self.image.trim().is_empty()),
        ]
        .into_iter()
        .filter_map(|(field, empty)| empty.then_some(field))
        .collect();

        if !missing.is_empty() {
            return Err(DeployError::Validation(format!(
                "missing required field(s): {}",
                missing.join(", ")
            )));
        }

        let image = ImageRef::parse(&self.image)
            .map_err(|e| DeployError::Validation(format!("image '{}': {}", self.image, e)))?;

        for quantities in [&self.resources.requests, &self.resources.limits] {
            if let Some(cpu) = &quantities.cpu {
                quantity::parse_cpu(cpu).map_err(|e| DeployError::Validation(e.to_string()))?;
            }
            if let Some(memory) = &quantities.memory {
                quantity::parse_memory(memory)
                    .map_err(|e| DeployError::Validation(e.to_string()))?;
            }
        }

        if let Some(max) = self.scaling.max_replicas
            && max < self.scaling.min_replicas
        {
            return Err(DeployError::Validation(format!(
                "max_replicas ({}) is below min_replicas ({})",
                max, self.scaling.min_replicas
            )));
        }

        let probes = [
            ("liveness", &self.health_check.liveness),
            ("readiness", &self.health_check.readiness),
            ("startup", &self.health_check.startup),
        ];
        for (kind, probe) in probes {
            if let Some(probe) = probe
                && probe.configured_actions() != 1
            {
                return Err(DeployError::Validation(format!(
                    "{} probe must set exactly one of http_get, tcp_socket, exec",
                    kind
                )));
            }
        }

        Ok(image)
    }

    /// Whether any port is published on the host.
    pub fn has_host_port_bindings(&self) -> bool {
        self.networking.ports.iter().any(|p| p.host_port.is_some())
    }

    /// Build a new config with the update applied on top of this one.
    pub fn merged(&self, update: &DeploymentUpdate) -> DeploymentConfig {
        let mut merged = self.clone();

        if let Some(image) = &update.image {
            merged.image = image.clone();
        }
        if update.version.is_some() {
            merged.version = update.version.clone();
        }
        if let Some(strategy) = update.strategy {
            merged.strategy = strategy;
        }
        if let Some(resources) = &update.resources {
            merged.resources = resources.clone();
        }
        if let Some(scaling) = &update.scaling {
            merged.scaling = scaling.clone();
        }
        if let Some(health_check) = &update.health_check {
            merged.health_check = health_check.clone();
        }

        // Deep merge maps
        for (k, v) in &update.env {
            merged.env.insert(k.clone(), v.clone());
        }
        for (k, v) in &update.labels {
            merged.labels.insert(k.clone(), v.clone());
        }
        for (k, v) in &update.annotations {
            merged.annotations.insert(k.clone(), v.clone());
        }

        merged
    }

    /// Resolve env values against the process environment.
    pub fn resolved_env(&self) -> Result<BTreeMap<String, String>, DeployError> {
        resolve_values(&self.env)
    }

    /// Resolve secret values against the process environment.
    pub fn resolved_secrets(&self) -> Result<BTreeMap<String, String>, DeployError> {
        resolve_values(&self.secrets)
    }
}

fn resolve_values(
    values: &BTreeMap<String, EnvValue>,
) -> Result<BTreeMap<String, String>, DeployError> {
    values
        .iter()
        .map(|(k, v)| {
            v.resolve()
                .map(|resolved| (k.clone(), resolved))
                .map_err(|e| DeployError::Validation(format!("{k}: {e}")))
        })
        .collect()
}

/// Partial config applied by `update`. Unset fields keep their prior value;
/// maps are merged key by key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentUpdate {
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub strategy: Option<DeploymentStrategy>,
    #[serde(default)]
    pub resources: Option<ResourceRequirements>,
    #[serde(default)]
    pub scaling: Option<ScalingConfig>,
    #[serde(default)]
    pub health_check: Option<HealthCheckConfig>,
    #[serde(default)]
    pub env: BTreeMap<String, EnvValue>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl DeploymentUpdate {
    /// Update that only changes the image.
    pub fn image(image: &str) -> Self {
        Self {
            image: Some(image.to_string()),
            ..Default::default()
        }
    }

    pub fn with_strategy(mut self, strategy: DeploymentStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }
}

/// Update that brings an existing deployment in line with `config`.
impl From<&DeploymentConfig> for DeploymentUpdate {
    fn from(config: &DeploymentConfig) -> Self {
        Self {
            image: Some(config.image.clone()),
            version: config.version.clone(),
            strategy: Some(config.strategy),
            resources: Some(config.resources.clone()),
            scaling: Some(config.scaling.clone()),
            health_check: Some(config.health_check.clone()),
            env: config.env.clone(),
            labels: config.labels.clone(),
            annotations: config.annotations.clone(),
        }
    }
}
