//! Tail loop: runs the log source and fans its lines out.
//!
//! One session is one child process. Each line it prints is:
//! 1. skipped if it is a sentinel (`-` in column zero, e.g. buffer banners)
//!
//! Lines longer than [`LINE_LIMIT`] bytes are handled in chunks of at most
//! that size, each treated as its own line.
//!
//! 2. appended to the log sink
//! 3. published to every listener whose filter accepts it
//!
//! When the child's output ends the session is torn down (SIGTERM, reap),
//! the log source buffers are cleared so the next session does not replay
//! old entries, and a new session starts after the [`RestartPacer`] delay.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Spawn and I/O failures are logged and end the current session only

mod pacer;
mod probe;

pub use pacer::{RestartPacer, HEALTHY_SESSION, INITIAL_RESTART_DELAY, MAX_RESTART_DELAY};
pub use probe::probe_buffers;

use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Child;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use logtap_core::{is_sentinel, LogSourceCommands};

use crate::registry::ListenerRegistry;
use crate::sink::LogSink;

/// How long a terminated log source gets to exit before it is killed.
const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// Longest chunk read as one line.
pub const LINE_LIMIT: u64 = 4096;

/// How a session ended.
#[derive(Debug)]
enum SessionEnd {
    /// Child output reached end of stream.
    Eof,
    /// The child could not be started.
    SpawnFailed,
    /// Shutdown was requested mid-session.
    Cancelled,
}

/// The tail loop task.
pub struct LogTail {
    commands: LogSourceCommands,
    registry: Arc<ListenerRegistry>,
    sink: LogSink,
    pacer: RestartPacer,
    cancel_token: CancellationToken,
    sessions: u64,
}

impl LogTail {
    pub fn new(
        commands: LogSourceCommands,
        registry: Arc<ListenerRegistry>,
        sink: LogSink,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            commands,
            registry,
            sink,
            pacer: RestartPacer::default(),
            cancel_token,
            sessions: 0,
        }
    }

    /// Replaces the restart pacer.
    pub fn with_pacer(mut self, pacer: RestartPacer) -> Self {
        self.pacer = pacer;
        self
    }

    /// Runs sessions until cancelled.
    pub async fn run(mut self) {
        info!(
            program = %self.commands.tail.program().display(),
            "Tail loop started"
        );

        loop {
            if self.cancel_token.is_cancelled() {
                break;
            }

            let started = Instant::now();
            match self.run_session().await {
                SessionEnd::Cancelled => break,
                SessionEnd::SpawnFailed => {}
                SessionEnd::Eof => {
                    info!(
                        session = self.sessions,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Log source output ended, restarting"
                    );
                    self.clear_buffers().await;
                }
            }

            let delay = self.pacer.next_delay(started.elapsed());
            if delay.is_zero() {
                continue;
            }
            debug!(delay_ms = delay.as_millis() as u64, "Delaying log source restart");
            tokio::select! {
                _ = self.cancel_token.cancelled() => break,
                _ = sleep(delay) => {}
            }
        }

        info!(sessions = self.sessions, "Tail loop stopped");
    }

    /// Spawns one log source child and pumps its output until it ends.
    async fn run_session(&mut self) -> SessionEnd {
        let mut command = self.commands.tail.to_command();
        command.stdout(Stdio::piped()).kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!(
                    program = %self.commands.tail.program().display(),
                    error = %e,
                    "Failed to spawn log source"
                );
                return SessionEnd::SpawnFailed;
            }
        };
        self.sessions += 1;
        debug!(session = self.sessions, pid = ?child.id(), "Log source started");

        let end = match child.stdout.take() {
            Some(stdout) => self.pump(BufReader::new(stdout)).await,
            None => {
                warn!("Log source stdout was not captured");
                SessionEnd::Eof
            }
        };

        terminate(&mut child).await;
        end
    }

    async fn pump<R>(&mut self, mut reader: R) -> SessionEnd
    where
        R: AsyncBufRead + Unpin,
    {
        let mut line = Vec::with_capacity(LINE_LIMIT as usize);

        loop {
            line.clear();
            let mut limited = (&mut reader).take(LINE_LIMIT);
            let read = tokio::select! {
                _ = self.cancel_token.cancelled() => None,
                read = limited.read_until(b'\n', &mut line) => Some(read),
            };

            match read {
                None => return SessionEnd::Cancelled,
                Some(Ok(0)) => return SessionEnd::Eof,
                Some(Ok(_)) => self.dispatch(&line).await,
                Some(Err(e)) => {
                    warn!(error = %e, "Failed to read log source output");
                    return SessionEnd::Eof;
                }
            }
        }
    }

    /// Routes one raw line to the sink and the listeners.
    async fn dispatch(&mut self, line: &[u8]) {
        if is_sentinel(line) {
            return;
        }
        self.sink.append(line).await;
        self.registry.publish(line).await;
    }

    /// Runs the clear command to completion.
    async fn clear_buffers(&self) {
        let mut command = self.commands.clear.to_command();
        command.stdout(Stdio::null());

        match command.status().await {
            Ok(status) if status.success() => debug!("Log source buffers cleared"),
            Ok(status) => warn!(status = %status, "Log source clear command failed"),
            Err(e) => warn!(error = %e, "Failed to run log source clear command"),
        }
    }
}

/// Sends SIGTERM to a child and reaps it, killing it if it lingers.
async fn terminate(child: &mut Child) {
    if let Some(pid) = child.id().and_then(|id| libc::pid_t::try_from(id).ok()) {
        // SAFETY: plain kill(2) on a pid we spawned and have not reaped yet.
        let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ESRCH) {
                debug!(pid, error = %err, "Failed to signal log source");
            }
        }
    }

    match timeout(TERMINATE_GRACE, child.wait()).await {
        Ok(Ok(status)) => debug!(status = %status, "Log source reaped"),
        Ok(Err(e)) => warn!(error = %e, "Failed to reap log source"),
        Err(_) => {
            warn!("Log source ignored SIGTERM, killing");
            if let Err(e) = child.kill().await {
                warn!(error = %e, "Failed to kill log source");
            }
        }
    }
}
