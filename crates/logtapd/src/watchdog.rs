//! Peer watchdog.
//!
//! After a grace period the watchdog repeatedly opens the peer's control
//! socket, sends a handshake and waits for a byte or for the peer to hang
//! up. Connection attempts are retried every [`CONNECT_RETRY`] until the
//! peer accepts again.
//!
//! The watchdog observes; it never restarts the peer. Reachability changes
//! are logged so an outage shows up in the daemon's trace output.

use std::path::PathBuf;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::UnixStream;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use logtap_protocol::{write_code_async, Command};

/// Delay between failed connection attempts.
pub const CONNECT_RETRY: Duration = Duration::from_millis(10);

/// Minimum spacing between successful probes.
pub const PROBE_INTERVAL: Duration = Duration::from_millis(100);

/// Result of one probe round.
#[derive(Debug, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The peer answered with at least one byte.
    Replied,
    /// The peer closed the connection without answering.
    Closed,
    /// The exchange failed at the socket level.
    Failed(String),
}

/// Liveness prober for a peer control socket.
pub struct Watchdog {
    peer_socket: PathBuf,
    grace: Duration,
    interval: Duration,
    cancel_token: CancellationToken,
}

impl Watchdog {
    pub fn new(
        peer_socket: impl Into<PathBuf>,
        grace: Duration,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            peer_socket: peer_socket.into(),
            grace,
            interval: PROBE_INTERVAL,
            cancel_token,
        }
    }

    /// Overrides the probe interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Probes the peer until cancelled.
    pub async fn run(self) {
        info!(
            peer = %self.peer_socket.display(),
            grace_ms = self.grace.as_millis() as u64,
            "Watchdog armed"
        );

        tokio::select! {
            _ = self.cancel_token.cancelled() => return,
            _ = sleep(self.grace) => {}
        }

        let mut probes: u64 = 0;
        loop {
            let round = Instant::now();

            let Some(stream) = self.connect().await else {
                break;
            };

            let outcome = tokio::select! {
                _ = self.cancel_token.cancelled() => break,
                outcome = probe(stream) => outcome,
            };
            probes += 1;

            match outcome {
                ProbeOutcome::Replied => {}
                ProbeOutcome::Closed => debug!("Peer closed probe without replying"),
                ProbeOutcome::Failed(e) => debug!(error = %e, "Peer probe failed"),
            }

            let next = round + self.interval;
            tokio::select! {
                _ = self.cancel_token.cancelled() => break,
                _ = tokio::time::sleep_until(next) => {}
            }
        }

        debug!(probes, "Watchdog stopped");
    }

    /// Connects to the peer, retrying until it accepts or shutdown.
    async fn connect(&self) -> Option<UnixStream> {
        let mut down_since: Option<Instant> = None;

        loop {
            match UnixStream::connect(&self.peer_socket).await {
                Ok(stream) => {
                    if let Some(since) = down_since {
                        info!(
                            peer = %self.peer_socket.display(),
                            down_ms = since.elapsed().as_millis() as u64,
                            "Peer reachable again"
                        );
                    }
                    return Some(stream);
                }
                Err(e) => {
                    if down_since.is_none() {
                        warn!(
                            peer = %self.peer_socket.display(),
                            error = %e,
                            "Peer unreachable, retrying"
                        );
                        down_since = Some(Instant::now());
                    }
                }
            }

            tokio::select! {
                _ = self.cancel_token.cancelled() => return None,
                _ = sleep(CONNECT_RETRY) => {}
            }
        }
    }
}

/// Sends a handshake and waits for one byte or end of stream.
pub async fn probe(mut stream: UnixStream) -> ProbeOutcome {
    if let Err(e) = write_code_async(&mut stream, Command::Handshake.code()).await {
        return ProbeOutcome::Failed(e.to_string());
    }

    let mut byte = [0u8; 1];
    match stream.read(&mut byte).await {
        Ok(0) => ProbeOutcome::Closed,
        Ok(_) => ProbeOutcome::Replied,
        Err(e) => ProbeOutcome::Failed(e.to_string()),
    }
}
