// ABOUTME: Diagnostics accumulator for non-fatal warnings during deployment operations.
// ABOUTME: Collects swallowed cleanup failures so they are logged and reported, not lost.

/// Collects non-fatal warnings during an operation.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!(kind = ?warning.kind, "{}", warning.message);
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// All warning messages joined for a result's metadata.
    pub fn summary(&self) -> Option<String> {
        if self.warnings.is_empty() {
            return None;
        }
        Some(
            self.warnings
                .iter()
                .map(|w| w.message.as_str())
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// A non-fatal warning.
#[derive(Debug, Clone)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    /// A best-effort cleanup step failed (resource may not exist).
    pub fn cleanup_skipped(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::CleanupSkipped,
            message: message.into(),
        }
    }

    /// Renaming a promoted container back to its primary name failed.
    pub fn rename_failed(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::RenameFailed,
            message: message.into(),
        }
    }

    /// Putting the previous workload back after a failure did not work.
    pub fn restore_failed(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::RestoreFailed,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    CleanupSkipped,
    RenameFailed,
    RestoreFailed,
}
