//! Client-side error types.

use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use logtap_protocol::ProtocolError;
use thiserror::Error;

/// Errors from starting or talking to the daemon.
#[derive(Error, Debug)]
pub enum BootstrapError {
    /// The log source could not be run at all.
    #[error("Failed to run log source probe {program}: {source}")]
    Probe {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The log source ran but reported failure.
    #[error("Log source probe exited with {status}")]
    ProbeFailed { status: ExitStatus },

    /// The daemon program could not be spawned.
    #[error("Failed to launch daemon {program}: {source}")]
    Launch {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The daemon launcher exited unsuccessfully.
    #[error("Daemon launcher exited with {status}")]
    LauncherFailed { status: ExitStatus },

    /// No handshake succeeded before the deadline.
    #[error("Daemon did not answer a handshake within {timeout:?}")]
    NotReady { timeout: Duration },

    /// `connect` was called before a successful `start`.
    #[error("Daemon was never started")]
    NotStarted,

    /// The daemon answered a handshake with the wrong code.
    #[error("Unexpected handshake reply {0}")]
    UnexpectedReply(i32),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, BootstrapError>;
