// ABOUTME: Rollback target resolution shared by both backend managers.
// ABOUTME: Maps an optional version onto an image reference using the recorded history.

use crate::types::ImageRef;

use super::DeployError;

/// Resolve the image a rollback should move to.
///
/// - No version: the most recent prior image, which is taken off `history`.
/// - A full reference (contains `:`, `@` or `/`): used as-is.
/// - Anything else is a tag on the current image's repository.
///
/// # Errors
///
/// Returns `Validation` if there is no history to fall back on or the
/// resulting reference does not parse.
pub fn resolve_target(
    history: &mut Vec<String>,
    current: &ImageRef,
    version: Option<&str>,
) -> Result<ImageRef, DeployError> {
    let target = match version {
        None => history.pop().ok_or_else(|| {
            DeployError::Validation("no previous image recorded to roll back to".to_string())
        })?,
        Some(v) if v.trim().is_empty() => {
            return Err(DeployError::Validation(
                "rollback version must not be empty".to_string(),
            ));
        }
        Some(v) if v.contains([':', '@', '/']) => v.to_string(),
        Some(v) => current.with_tag(v).to_string(),
    };

    ImageRef::parse(&target)
        .map_err(|e| DeployError::Validation(format!("invalid rollback target {target}: {e}")))
}
