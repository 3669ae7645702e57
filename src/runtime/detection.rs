// ABOUTME: Local container runtime detection.
// ABOUTME: Honours explicit config and DOCKER_HOST, then checks Podman sockets before Docker.

use super::types::{RuntimeConfig, RuntimeEndpoint, RuntimeType};
use std::path::Path;

const ROOTFUL_PODMAN: &str = "/run/podman/podman.sock";
const DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// Error during runtime detection.
#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("no container runtime found (checked Podman and Docker sockets)")]
    NoRuntimeFound,

    #[error("unsupported DOCKER_HOST '{0}': only unix:// sockets are supported")]
    UnsupportedHost(String),
}

/// Detect the container runtime on the local system.
///
/// Detection order:
/// 1. Explicit `runtime`/`socket` from config
/// 2. `DOCKER_HOST` (unix sockets only)
/// 3. Rootless Podman (`$XDG_RUNTIME_DIR/podman/podman.sock`, else `/run/user/$UID/...`)
/// 4. Rootful Podman (`/run/podman/podman.sock`)
/// 5. Docker (`/var/run/docker.sock`)
pub fn detect_local(config: Option<&RuntimeConfig>) -> Result<RuntimeEndpoint, DetectionError> {
    if let Some(cfg) = config {
        match (cfg.runtime, &cfg.socket) {
            (Some(runtime_type), socket) => {
                return Ok(RuntimeEndpoint {
                    runtime_type,
                    socket_path: socket
                        .clone()
                        .unwrap_or_else(|| default_socket_path(runtime_type)),
                });
            }
            (None, Some(socket)) => {
                return Ok(RuntimeEndpoint {
                    runtime_type: runtime_for_socket(socket),
                    socket_path: socket.clone(),
                });
            }
            (None, None) => {}
        }
    }

    if let Ok(host) = std::env::var("DOCKER_HOST")
        && !host.is_empty()
    {
        let socket = host
            .strip_prefix("unix://")
            .ok_or_else(|| DetectionError::UnsupportedHost(host.clone()))?;
        return Ok(RuntimeEndpoint {
            runtime_type: runtime_for_socket(socket),
            socket_path: socket.to_string(),
        });
    }

    if let Some(rootless) = rootless_podman_socket()
        && Path::new(&rootless).exists()
    {
        return Ok(RuntimeEndpoint {
            runtime_type: RuntimeType::Podman,
            socket_path: rootless,
        });
    }

    if Path::new(ROOTFUL_PODMAN).exists() {
        return Ok(RuntimeEndpoint {
            runtime_type: RuntimeType::Podman,
            socket_path: ROOTFUL_PODMAN.to_string(),
        });
    }

    if Path::new(DOCKER_SOCKET).exists() {
        return Ok(RuntimeEndpoint {
            runtime_type: RuntimeType::Docker,
            socket_path: DOCKER_SOCKET.to_string(),
        });
    }

    Err(DetectionError::NoRuntimeFound)
}

fn rootless_podman_socket() -> Option<String> {
    if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR")
        && !dir.is_empty()
    {
        return Some(format!("{}/podman/podman.sock", dir));
    }
    get_uid().map(|uid| format!("/run/user/{}/podman/podman.sock", uid))
}

fn get_uid() -> Option<String> {
    std::env::var("UID").ok().or_else(|| {
        // Fall back to reading /proc/self/status
        std::fs::read_to_string("/proc/self/status")
            .ok()
            .and_then(|s| {
                s.lines()
                    .find(|l| l.starts_with("Uid:"))
                    .and_then(|l| l.split_whitespace().nth(1))
                    .map(|s| s.to_string())
            })
    })
}

fn runtime_for_socket(socket: &str) -> RuntimeType {
    if socket.contains("podman") {
        RuntimeType::Podman
    } else {
        RuntimeType::Docker
    }
}

fn default_socket_path(runtime: RuntimeType) -> String {
    match runtime {
        RuntimeType::Docker => DOCKER_SOCKET.to_string(),
        RuntimeType::Podman => ROOTFUL_PODMAN.to_string(),
    }
}
