// ABOUTME: Container engine client: capability traits, bollard adapter and detection.
// ABOUTME: Auto-detects a local Docker or Podman socket or uses explicit config.

mod bollard;
mod detection;
mod error;
mod traits;
mod types;

pub use self::bollard::BollardRuntime;
pub use detection::{DetectionError, detect_local};
pub use error::{RuntimeError, RuntimeErrorKind};
pub use traits::*;
pub use types::{RuntimeConfig, RuntimeEndpoint, RuntimeType};

/// Detect the local runtime and verify it answers.
pub async fn connect_local(config: Option<&RuntimeConfig>) -> Result<BollardRuntime, RuntimeError> {
    let endpoint = detect_local(config)?;
    tracing::debug!(
        runtime = %endpoint.runtime_type,
        socket = %endpoint.socket_path,
        "connecting to container runtime"
    );
    let runtime = BollardRuntime::connect(&endpoint)?;
    runtime.ping().await?;
    Ok(runtime)
}
