//! Starting the daemon and connecting to it.
//!
//! `start` is idempotent: the first successful call probes the log source,
//! launches the daemon detached and waits for a handshake. Later calls
//! return immediately. `connect` hands out fresh control connections and
//! refuses to do so before `start` succeeded.

use std::ffi::OsString;
use std::io::Read;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use logtap_core::{probe_command, restore_dev_null_mode, DaemonConfig, ListenerRole};
use logtap_protocol::{read_code, write_code, Command as ControlCommand};

use crate::error::{BootstrapError, Result};

/// Name of the daemon binary.
pub const DAEMON_BINARY: &str = "logtapd";

/// Delay between connection attempts.
pub const CONNECT_RETRY: Duration = Duration::from_millis(10);

/// How long `start` waits for the first handshake.
pub const READY_TIMEOUT: Duration = Duration::from_secs(10);

/// How to launch and reach the daemon.
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    /// Daemon program.
    pub program: PathBuf,
    /// Arguments passed to the daemon program.
    pub args: Vec<OsString>,
    /// Extra environment for the daemon process.
    pub envs: Vec<(OsString, OsString)>,
    /// Control socket of the daemon.
    pub socket_path: PathBuf,
    /// Log source probed before launching.
    pub logcat_path: PathBuf,
    /// Delay between connection attempts.
    pub connect_retry: Duration,
    /// Upper bound on the wait for the first handshake after launch.
    pub ready_timeout: Duration,
}

impl BootstrapConfig {
    /// Launches `program --daemon` against the paths in `daemon`.
    pub fn new(program: impl Into<PathBuf>, daemon: &DaemonConfig) -> Self {
        Self {
            program: program.into(),
            args: vec![OsString::from("--daemon")],
            envs: Vec::new(),
            socket_path: daemon.socket_path.clone(),
            logcat_path: daemon.logcat_path.clone(),
            connect_retry: CONNECT_RETRY,
            ready_timeout: READY_TIMEOUT,
        }
    }

    /// Adds an environment variable for the daemon process.
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self::new(locate_daemon_binary(), &DaemonConfig::from_env())
    }
}

/// Finds `logtapd` next to the current executable, falling back to `$PATH`.
pub fn locate_daemon_binary() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|d| d.join(DAEMON_BINARY)))
        .filter(|p| p.exists())
        .unwrap_or_else(|| PathBuf::from(DAEMON_BINARY))
}

/// Process-wide handle for starting and reaching the daemon.
#[derive(Debug)]
pub struct Bootstrap {
    config: BootstrapConfig,
    started: Mutex<bool>,
}

impl Bootstrap {
    pub fn new(config: BootstrapConfig) -> Self {
        Self {
            config,
            started: Mutex::new(false),
        }
    }

    pub fn config(&self) -> &BootstrapConfig {
        &self.config
    }

    /// True once `start` has succeeded.
    pub fn is_started(&self) -> bool {
        *self.lock_started()
    }

    /// Makes sure the daemon is running. Idempotent.
    pub fn start(&self) -> Result<()> {
        let mut started = self.lock_started();
        if *started {
            debug!("Daemon already started");
            return Ok(());
        }

        if handshake(&self.config.socket_path).is_ok() {
            info!(socket = %self.config.socket_path.display(), "Daemon already running");
            *started = true;
            return Ok(());
        }

        self.probe()?;
        self.launch()?;
        self.wait_ready()?;

        info!(socket = %self.config.socket_path.display(), "Daemon started");
        *started = true;
        Ok(())
    }

    /// Opens a fresh control connection, retrying until the daemon accepts.
    pub fn connect(&self) -> Result<UnixStream> {
        if !self.is_started() {
            return Err(BootstrapError::NotStarted);
        }

        let mut attempts: u64 = 0;
        loop {
            match UnixStream::connect(&self.config.socket_path) {
                Ok(stream) => {
                    if attempts > 0 {
                        debug!(attempts, "Connected to daemon after retrying");
                    }
                    return Ok(stream);
                }
                Err(e) => {
                    if attempts == 0 {
                        debug!(error = %e, "Daemon not accepting yet, retrying");
                    }
                    attempts += 1;
                    thread::sleep(self.config.connect_retry);
                }
            }
        }
    }

    /// One handshake round trip over a fresh connection.
    pub fn handshake(&self) -> Result<()> {
        let stream = self.connect()?;
        exchange_handshake(stream)
    }

    /// Registers a new connection as the listener for `role`.
    ///
    /// Tailed lines matching the role arrive on the returned stream.
    pub fn register_listener(&self, role: ListenerRole) -> Result<UnixStream> {
        let mut stream = self.connect()?;
        write_code(&mut stream, ControlCommand::register(role).code())?;
        Ok(stream)
    }

    fn probe(&self) -> Result<()> {
        let status = probe_command(&self.config.logcat_path, None)
            .to_std_command()
            .status()
            .map_err(|source| BootstrapError::Probe {
                program: self.config.logcat_path.clone(),
                source,
            })?;

        if let Err(e) = restore_dev_null_mode() {
            debug!(error = %e, "Could not check /dev/null permissions");
        }

        if !status.success() {
            warn!(status = %status, "Log source probe failed, not starting daemon");
            return Err(BootstrapError::ProbeFailed { status });
        }
        Ok(())
    }

    /// Runs the launcher and waits for it to exit.
    ///
    /// With `--daemon` the launcher forks the real daemon and returns at
    /// once, so this does not block on the daemon itself.
    fn launch(&self) -> Result<()> {
        debug!(program = %self.config.program.display(), "Launching daemon");

        let status = Command::new(&self.config.program)
            .args(&self.config.args)
            .envs(self.config.envs.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|source| BootstrapError::Launch {
                program: self.config.program.clone(),
                source,
            })?;

        if !status.success() {
            return Err(BootstrapError::LauncherFailed { status });
        }
        Ok(())
    }

    fn wait_ready(&self) -> Result<()> {
        let deadline = Instant::now() + self.config.ready_timeout;
        loop {
            match handshake(&self.config.socket_path) {
                Ok(()) => return Ok(()),
                Err(BootstrapError::UnexpectedReply(code)) => {
                    return Err(BootstrapError::UnexpectedReply(code));
                }
                Err(_) if Instant::now() < deadline => thread::sleep(self.config.connect_retry),
                Err(_) => {
                    return Err(BootstrapError::NotReady {
                        timeout: self.config.ready_timeout,
                    })
                }
            }
        }
    }

    fn lock_started(&self) -> MutexGuard<'_, bool> {
        self.started.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Single handshake against `socket_path` with no retry.
pub fn handshake(socket_path: &std::path::Path) -> Result<()> {
    let stream = UnixStream::connect(socket_path)?;
    exchange_handshake(stream)
}

fn exchange_handshake(mut stream: UnixStream) -> Result<()> {
    let sent = ControlCommand::Handshake.code();
    write_code(&mut stream, sent)?;
    let reply = read_code(&mut stream)?;
    if reply != sent {
        return Err(BootstrapError::UnexpectedReply(reply));
    }

    // The daemon closes after the echo; drain so the close is observed.
    let mut rest = [0u8; 1];
    let _ = stream.read(&mut rest);
    Ok(())
}
