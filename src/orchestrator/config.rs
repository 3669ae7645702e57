// ABOUTME: Orchestration-wide settings: target platform and auxiliary infrastructure.
// ABOUTME: Every infrastructure section is optional; absent sections are skipped.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::platform::Platform;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    pub platform: Platform,
    #[serde(default)]
    pub networking: Option<NetworkSetup>,
    #[serde(default)]
    pub security: Option<SecuritySetup>,
    #[serde(default)]
    pub monitoring: Option<MonitoringSetup>,
    #[serde(default)]
    pub service_mesh: Option<ServiceMeshConfig>,
    #[serde(default)]
    pub load_balancer: Option<LoadBalancerConfig>,
    #[serde(default)]
    pub security_policies: Vec<SecurityPolicy>,
}

impl OrchestrationConfig {
    /// Bare config: deploy only, no auxiliary infrastructure.
    pub fn for_platform(platform: Platform) -> Self {
        Self {
            platform,
            networking: None,
            security: None,
            monitoring: None,
            service_mesh: None,
            load_balancer: None,
            security_policies: Vec::new(),
        }
    }
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self::for_platform(Platform::Docker)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSetup {
    /// Network (or namespace-level network) deployments attach to.
    pub network: String,
    #[serde(default)]
    pub driver: Option<String>,
    /// Only allow traffic between members of the network.
    #[serde(default)]
    pub isolated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecuritySetup {
    #[serde(default)]
    pub service_account: Option<String>,
    #[serde(default)]
    pub run_as_non_root: bool,
    #[serde(default)]
    pub read_only_root_filesystem: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoringSetup {
    #[serde(default = "default_true")]
    pub metrics: bool,
    #[serde(default)]
    pub tracing: bool,
    #[serde(default)]
    pub logs: bool,
    /// Monitoring stack wired around the deployments once they are up.
    #[serde(default)]
    pub stack: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceMeshConfig {
    pub provider: String,
    #[serde(default)]
    pub mtls: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancerConfig {
    pub kind: String,
    #[serde(default)]
    pub ports: Vec<u16>,
    #[serde(default)]
    pub health_check_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SecurityPolicy {
    Rbac {
        role: String,
        #[serde(default)]
        rules: Vec<String>,
    },
    NetworkPolicy {
        #[serde(default)]
        allow_from: Vec<String>,
    },
    PodSecurity {
        level: String,
    },
    SecretRotation {
        #[serde(with = "humantime_serde")]
        interval: Duration,
    },
}

impl SecurityPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            SecurityPolicy::Rbac { .. } => "rbac",
            SecurityPolicy::NetworkPolicy { .. } => "network-policy",
            SecurityPolicy::PodSecurity { .. } => "pod-security",
            SecurityPolicy::SecretRotation { .. } => "secret-rotation",
        }
    }
}
