//! Daemon configuration.
//!
//! Every setting has a compiled-in default and an optional `LOGTAP_*`
//! environment override. The same struct is read by the daemon and by
//! the bootstrap client, so both sides agree on socket and log source paths.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CoreError, CoreResult};

/// Default control socket path.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/logtap.sock";

/// Default log source binary.
pub const DEFAULT_LOGCAT_PATH: &str = "/system/bin/logcat";

/// Default tag whose messages are tailed alongside process-start events.
pub const DEFAULT_TAG: &str = "logtap";

/// Buffers probed at startup, in order.
pub const DEFAULT_BUFFERS: [&str; 3] = ["main", "events", "crash"];

/// Grace period before the watchdog's first probe.
pub const DEFAULT_WATCHDOG_GRACE: Duration = Duration::from_secs(5);

/// Environment variable names.
pub mod vars {
    pub const SOCKET: &str = "LOGTAP_SOCKET";
    pub const LOG_FILE: &str = "LOGTAP_LOG_FILE";
    pub const STATE_DIR: &str = "LOGTAP_STATE_DIR";
    pub const LOGCAT: &str = "LOGTAP_LOGCAT";
    pub const TAG: &str = "LOGTAP_TAG";
    pub const BUFFERS: &str = "LOGTAP_BUFFERS";
    pub const PEER_SOCKET: &str = "LOGTAP_PEER_SOCKET";
    pub const WATCHDOG_GRACE_SECS: &str = "LOGTAP_WATCHDOG_GRACE_SECS";
}

/// Configuration for the logtap daemon.
///
/// # Example
///
/// ```rust
/// use logtap_core::DaemonConfig;
/// use std::path::PathBuf;
///
/// let config = DaemonConfig {
///     socket_path: PathBuf::from("/tmp/my-logtap.sock"),
///     ..Default::default()
/// };
/// assert!(config.peer_socket.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    /// Unix socket the control server listens on.
    pub socket_path: PathBuf,

    /// Append-only file receiving every tailed line.
    pub sink_path: PathBuf,

    /// Directory for the PID file and the daemon's own trace output.
    pub state_dir: PathBuf,

    /// Log source binary.
    pub logcat_path: PathBuf,

    /// Log tag tailed in addition to process-start events.
    pub tag: String,

    /// Candidate buffers, probed at startup.
    pub buffers: Vec<String>,

    /// Control socket of the supervised peer process (watchdog target).
    pub peer_socket: Option<PathBuf>,

    /// Delay before the watchdog starts probing the peer.
    pub watchdog_grace: Duration,

    /// Also tail fatal messages from every tag (`*:F`).
    pub verbose_source: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        let state_dir = default_state_dir();
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            sink_path: state_dir.join("logtap.log"),
            state_dir,
            logcat_path: PathBuf::from(DEFAULT_LOGCAT_PATH),
            tag: DEFAULT_TAG.to_string(),
            buffers: DEFAULT_BUFFERS.iter().map(|b| (*b).to_string()).collect(),
            peer_socket: None,
            watchdog_grace: DEFAULT_WATCHDOG_GRACE,
            verbose_source: cfg!(debug_assertions),
        }
    }
}

impl DaemonConfig {
    /// Builds the configuration from `LOGTAP_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset. Unparseable numbers fall back
    /// to the default. Relative paths are resolved against the current
    /// directory, since the daemon moves to `/` once detached. A bare
    /// program name for the log source is left alone for `PATH` lookup.
    pub fn from_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(dir) = get(vars::STATE_DIR) {
            config.state_dir = absolute(dir);
            config.sink_path = config.state_dir.join("logtap.log");
        }
        if let Some(path) = get(vars::LOG_FILE) {
            config.sink_path = absolute(path);
        }
        if let Some(path) = get(vars::SOCKET) {
            config.socket_path = absolute(path);
        }
        if let Some(path) = get(vars::LOGCAT) {
            config.logcat_path = if path.contains('/') {
                absolute(path)
            } else {
                PathBuf::from(path)
            };
        }
        if let Some(tag) = get(vars::TAG) {
            config.tag = tag;
        }
        if let Some(list) = get(vars::BUFFERS) {
            config.buffers = list
                .split(',')
                .map(str::trim)
                .filter(|b| !b.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(path) = get(vars::PEER_SOCKET) {
            config.peer_socket = Some(absolute(path));
        }
        if let Some(secs) = get(vars::WATCHDOG_GRACE_SECS).and_then(|s| s.trim().parse().ok()) {
            config.watchdog_grace = Duration::from_secs(secs);
        }

        config
    }

    /// Path of the daemon PID file.
    pub fn pid_file(&self) -> PathBuf {
        self.state_dir.join("logtapd.pid")
    }

    /// Path receiving the daemon's stdout/stderr once daemonized.
    pub fn trace_log(&self) -> PathBuf {
        self.state_dir.join("logtapd.log")
    }

    /// Creates the state directory and the parents of the socket and sink.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        create_dir(&self.state_dir)?;
        for path in [&self.socket_path, &self.sink_path] {
            if let Some(parent) = path.parent() {
                create_dir(parent)?;
            }
        }
        Ok(())
    }
}

fn create_dir(dir: &Path) -> CoreResult<()> {
    if dir.as_os_str().is_empty() || dir.exists() {
        return Ok(());
    }
    fs::create_dir_all(dir).map_err(|e| CoreError::io(dir, e))
}

/// Resolves `path` against the current directory. Keeps it as given if the
/// current directory is unavailable.
fn absolute(path: String) -> PathBuf {
    let path = PathBuf::from(path);
    std::path::absolute(&path).unwrap_or(path)
}

fn default_state_dir() -> PathBuf {
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("logtap")
}
