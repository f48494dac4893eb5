use std::path::PathBuf;

use thiserror::Error;

use crate::reconcile::RunPhase;
use crate::terraform::CommandError;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed state document {}: {reason}", .path.display())]
    MalformedState { path: PathBuf, reason: String },

    #[error("no provider schema for resource type: {0}")]
    SchemaLookup(String),

    #[error(transparent)]
    Subprocess(#[from] CommandError),

    #[error("failed to persist {}: {source}", .path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to render HCL: {0}")]
    Render(#[from] hcl::Error),
}

impl ReconcileError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ReconcileError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        ReconcileError::MalformedState {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Terminal failure of a reconciliation run.
///
/// Carries the phase that failed and the candidates that were already moved
/// into the target state, since those moves are not rolled back.
#[derive(Debug, Error)]
#[error("reconciliation failed in {phase} phase: {source}")]
pub struct RunFailure {
    pub phase: RunPhase,
    pub moved: Vec<String>,
    #[source]
    pub source: ReconcileError,
}

impl RunFailure {
    /// Captured output of the failing command, if the failure came from one.
    pub fn captured_output(&self) -> Option<(&str, &str)> {
        match &self.source {
            ReconcileError::Subprocess(err) => err.captured_output(),
            _ => None,
        }
    }
}
