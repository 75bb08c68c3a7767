//! Build error taxonomy
//!
//! Every fatal error carries enough context to diagnose the failure without
//! re-running the build: the failing path, the step or rule identity, and
//! for resolution failures the complete list of candidates tried.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// A module reference could not be resolved to a file.
///
/// Fatal: the build cannot proceed with a missing module. The `searched`
/// list enumerates every candidate path that was probed, in probe order.
#[derive(Debug)]
pub struct ResolutionError {
    /// The reference as written in source.
    pub reference: String,

    /// The file (or root directory, for entries) the reference came from.
    pub importer: PathBuf,

    /// Every path attempted, in order.
    pub searched: Vec<PathBuf>,
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cannot resolve '{}' from '{}'",
            self.reference,
            self.importer.display()
        )?;
        for candidate in &self.searched {
            write!(f, "\n  tried: {}", candidate.display())?;
        }
        Ok(())
    }
}

impl std::error::Error for ResolutionError {}

/// A transform chain step failed for one module.
#[derive(Debug)]
pub struct TransformError {
    /// Name of the failing step.
    pub step: String,

    /// Canonical path of the module being transformed.
    pub path: PathBuf,

    /// Underlying cause reported by the step.
    pub cause: anyhow::Error,
}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "transform step '{}' failed for {}: {}",
            self.step,
            self.path.display(),
            self.cause
        )
    }
}

impl std::error::Error for TransformError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.source()
    }
}

/// A plugin hook failed.
///
/// Non-fatal unless the plugin escalates via `fatal`.
#[derive(Debug)]
pub struct PluginError {
    /// Plugin name that caused the error.
    pub plugin: String,

    /// Hook that failed.
    pub hook: &'static str,

    /// Error message.
    pub message: String,

    /// Whether the plugin escalated this error to abort the build.
    pub fatal: bool,
}

impl fmt::Display for PluginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.plugin, self.hook, self.message)
    }
}

impl std::error::Error for PluginError {}

/// Top-level build failure.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    /// A resolved module could not be read from disk.
    #[error("failed to read module {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An output artifact could not be written. Writes are atomic, so a
    /// failed write never leaves a partial artifact behind.
    #[error("failed to emit {}: {source}", .path.display())]
    Emit {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The build was cancelled before completion. Nothing was written.
    #[error("build cancelled after {completed} of {total} modules")]
    Cancelled { completed: usize, total: usize },
}

/// A non-fatal problem recorded in the build report.
#[derive(Debug)]
pub enum BuildWarning {
    /// A transform failure skipped under the configured recovery policy.
    TransformSkipped(TransformError),

    /// A plugin hook failed without escalating.
    Plugin(PluginError),
}

impl fmt::Display for BuildWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildWarning::TransformSkipped(e) => write!(f, "skipped: {e}"),
            BuildWarning::Plugin(e) => write!(f, "plugin: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_error_lists_candidates() {
        let err = ResolutionError {
            reference: "./missing".to_string(),
            importer: PathBuf::from("/proj/src/app.js"),
            searched: vec![
                PathBuf::from("/proj/src/missing"),
                PathBuf::from("/proj/src/missing.js"),
            ],
        };

        let rendered = err.to_string();
        assert!(rendered.contains("cannot resolve './missing'"));
        assert!(rendered.contains("tried: /proj/src/missing"));
        assert!(rendered.contains("tried: /proj/src/missing.js"));
    }

    #[test]
    fn test_plugin_error_display() {
        let err = PluginError {
            plugin: "copy".to_string(),
            hook: "after_emit",
            message: "source directory missing".to_string(),
            fatal: false,
        };

        assert_eq!(err.to_string(), "[copy] after_emit: source directory missing");
    }
}
