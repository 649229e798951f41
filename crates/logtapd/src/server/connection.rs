//! Per-connection command handling.
//!
//! Every control connection carries exactly one command code. Handshakes
//! are echoed, registrations hand the stream to the listener registry, and
//! anything else closes the connection.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Malformed or silent clients only cost their own task

use std::sync::Arc;
use std::time::Duration;

use tokio::net::UnixStream;
use tokio::time::timeout;
use tracing::debug;

use logtap_core::ListenerRole;
use logtap_protocol::{read_code_async, write_code_async, Command, ProtocolError};

use crate::registry::ListenerRegistry;

/// How long a fresh connection may take to send its command code.
pub const COMMAND_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// What happened to one control connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionOutcome {
    /// Handshake echoed and connection closed.
    Handshake,
    /// Stream handed to the registry.
    Registered(ListenerRole),
    /// A later connection already registered for this role; stream closed.
    Superseded(ListenerRole),
    /// Unknown command code; connection closed.
    Rejected(i32),
    /// Client went away or stalled before a full code arrived.
    Aborted,
}

/// Handles one control connection.
pub struct ConnectionHandler {
    stream: UnixStream,
    registry: Arc<ListenerRegistry>,
    connection_number: u64,
    read_timeout: Duration,
}

impl ConnectionHandler {
    pub fn new(
        stream: UnixStream,
        registry: Arc<ListenerRegistry>,
        connection_number: u64,
    ) -> Self {
        Self {
            stream,
            registry,
            connection_number,
            read_timeout: COMMAND_READ_TIMEOUT,
        }
    }

    /// Overrides the command read timeout.
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Reads the command code and acts on it.
    pub async fn run(mut self) -> ConnectionOutcome {
        let conn = self.connection_number;

        let code = match timeout(self.read_timeout, read_code_async(&mut self.stream)).await {
            Ok(Ok(code)) => code,
            Ok(Err(ProtocolError::Eof)) => {
                debug!(conn, "Client closed before sending a command");
                return ConnectionOutcome::Aborted;
            }
            Ok(Err(e)) => {
                debug!(conn, error = %e, "Failed to read command");
                return ConnectionOutcome::Aborted;
            }
            Err(_) => {
                debug!(conn, "Timed out waiting for command");
                return ConnectionOutcome::Aborted;
            }
        };

        let Some(command) = Command::from_code(code) else {
            debug!(conn, code, "Unknown command code, closing connection");
            return ConnectionOutcome::Rejected(code);
        };

        match command.listener_role() {
            None => {
                if let Err(e) = write_code_async(&mut self.stream, command.code()).await {
                    debug!(conn, error = %e, "Failed to answer handshake");
                }
                debug!(conn, "Handshake answered");
                ConnectionOutcome::Handshake
            }
            Some(role) => {
                debug!(conn, command = %command, "Registering listener");
                if self.registry.register(role, self.stream, conn).await {
                    ConnectionOutcome::Registered(role)
                } else {
                    ConnectionOutcome::Superseded(role)
                }
            }
        }
    }
}
