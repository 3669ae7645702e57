// ABOUTME: Manifest scaffolding for new projects.
// ABOUTME: Creates a deckhand.yml template file.

use std::path::Path;

use crate::error::{Error, Result};
use crate::types::{ImageRef, ResourceName};

use super::MANIFEST_FILENAME;

pub fn init_manifest(
    dir: &Path,
    name: Option<&str>,
    image: Option<&str>,
    force: bool,
) -> Result<()> {
    let path = dir.join(MANIFEST_FILENAME);

    if path.exists() && !force {
        return Err(Error::AlreadyExists(path));
    }

    let name = ResourceName::new(name.unwrap_or("my-app"))
        .map_err(|e| Error::InvalidConfig(e.to_string()))?;
    let image = ImageRef::parse(image.unwrap_or("my-registry/my-app:latest"))
        .map_err(|e| Error::InvalidConfig(e.to_string()))?;

    std::fs::write(&path, template_yaml(&name, &image))?;
    Ok(())
}

fn template_yaml(name: &ResourceName, image: &ImageRef) -> String {
    format!(
        r#"orchestration:
  platform: docker

deployments:
  - id: {name}
    name: {name}
    image: {image}
    strategy: RollingUpdate
    networking:
      ports:
        - container_port: 8080
    # health_check:
    #   readiness:
    #     http_get: {{ path: /health, port: 8080 }}

# environments:
#   production:
#     namespace: prod
#     deployments:
#       {name}:
#         image: {image}
"#
    )
}
