//! Unix socket control server.
//!
//! The server:
//! - Binds the control socket, replacing a stale socket file
//! - Spawns a [`ConnectionHandler`] task per accepted connection
//! - Stops accepting and removes the socket file on cancellation
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  ControlServer  │
//! │  UnixListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐  register  ┌──────────────────┐
//! │ConnectionHandler│──────────▶│ ListenerRegistry │
//! │  (per client)   │            └──────────────────┘
//! └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Accept errors are logged and the loop keeps serving

mod connection;

pub use connection::{ConnectionHandler, ConnectionOutcome, COMMAND_READ_TIMEOUT};

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::DaemonError;
use crate::registry::ListenerRegistry;

/// Control socket server.
pub struct ControlServer {
    /// Path to the Unix socket
    socket_path: PathBuf,

    /// Slots that registration commands fill
    registry: Arc<ListenerRegistry>,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,

    /// Connection counter for log correlation
    connection_counter: AtomicU64,
}

impl ControlServer {
    pub fn new(
        socket_path: impl Into<PathBuf>,
        registry: Arc<ListenerRegistry>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            socket_path: socket_path.into(),
            registry,
            cancel_token,
            connection_counter: AtomicU64::new(0),
        }
    }

    /// Returns the socket path.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Binds and serves until cancelled.
    pub async fn run(&self) -> Result<(), DaemonError> {
        let listener = self.bind().await?;
        self.serve(listener).await;
        Ok(())
    }

    /// Prepares the socket path and binds the listener.
    ///
    /// A leftover socket file nobody is listening on is removed. A socket
    /// that still accepts connections belongs to a live daemon and is
    /// reported as a setup error instead.
    pub async fn bind(&self) -> Result<UnixListener, DaemonError> {
        let path = &self.socket_path;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| DaemonError::socket_setup(path, e))?;
            }
        }

        if path.exists() {
            if UnixStream::connect(path).await.is_ok() {
                return Err(DaemonError::socket_setup(
                    path,
                    "another daemon is already listening",
                ));
            }
            match std::fs::remove_file(path) {
                Ok(()) => debug!(socket = %path.display(), "Removed stale socket file"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(DaemonError::socket_setup(path, e)),
            }
        }

        let listener = UnixListener::bind(path).map_err(|e| DaemonError::socket_setup(path, e))?;
        info!(socket = %path.display(), "Control server listening");
        Ok(listener)
    }

    /// Accepts connections until cancelled, then removes the socket file.
    pub async fn serve(&self, listener: UnixListener) {
        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, _addr)) => {
                            let conn_num = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            self.handle_connection(stream, conn_num);
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
            }
        }

        drop(listener);
        self.cleanup();
    }

    fn handle_connection(&self, stream: UnixStream, connection_number: u64) {
        let registry = Arc::clone(&self.registry);
        tokio::spawn(async move {
            let outcome = ConnectionHandler::new(stream, registry, connection_number)
                .run()
                .await;
            debug!(conn = connection_number, outcome = ?outcome, "Connection handled");
        });
    }

    fn cleanup(&self) {
        if let Err(e) = std::fs::remove_file(&self.socket_path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(
                    socket = %self.socket_path.display(),
                    error = %e,
                    "Failed to remove socket file"
                );
            }
        }
        info!("Server cleanup complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn server_at(path: &Path) -> ControlServer {
        ControlServer::new(path, Arc::new(ListenerRegistry::new()), CancellationToken::new())
    }

    #[tokio::test]
    async fn test_bind_replaces_stale_socket() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logtap.sock");

        // A bound-then-dropped std listener leaves a dead socket file behind.
        drop(std::os::unix::net::UnixListener::bind(&path).unwrap());
        assert!(path.exists());

        let server = server_at(&path);
        assert!(server.bind().await.is_ok());
    }

    #[tokio::test]
    async fn test_bind_refuses_live_socket() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logtap.sock");
        let _live = UnixListener::bind(&path).unwrap();

        let server = server_at(&path);
        let err = server.bind().await.unwrap_err();
        assert!(err.is_socket_setup());
    }

    #[tokio::test]
    async fn test_bind_creates_parent_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run").join("logtap.sock");

        let server = server_at(&path);
        assert!(server.bind().await.is_ok());
        assert!(path.exists());
        assert_eq!(server.socket_path(), path.as_path());
    }
}
