//! Daemon error types.

use std::path::PathBuf;

use logtap_core::CoreError;

/// Errors that stop the daemon from starting or running.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("Failed to setup socket at {path}: {error}")]
    SocketSetup { path: PathBuf, error: String },

    #[error("Failed to open log sink at {path}: {source}")]
    Sink {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl DaemonError {
    pub(crate) fn socket_setup(path: impl Into<PathBuf>, error: impl ToString) -> Self {
        Self::SocketSetup {
            path: path.into(),
            error: error.to_string(),
        }
    }

    /// True when the control socket could not be prepared or bound.
    pub fn is_socket_setup(&self) -> bool {
        matches!(self, Self::SocketSetup { .. })
    }
}
