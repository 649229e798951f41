//! Daemon assembly: wires the tasks together and runs them to shutdown.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use logtap_core::{DaemonConfig, LogSourceCommands};

use crate::error::DaemonError;
use crate::registry::ListenerRegistry;
use crate::server::ControlServer;
use crate::sink::LogSink;
use crate::tail::{probe_buffers, LogTail};
use crate::watchdog::Watchdog;

/// Runs the daemon until `cancel_token` fires.
///
/// Startup order:
/// 1. bind the control socket (fails fast if another daemon owns it)
/// 2. rotate and open the log sink
/// 3. probe buffers and freeze the tail and clear commands
/// 4. start the tail loop and, if a peer is configured, the watchdog
/// 5. serve control connections
///
/// On shutdown the background tasks are cancelled and awaited so the
/// log source child is reaped before this returns.
pub async fn run(
    config: DaemonConfig,
    cancel_token: CancellationToken,
) -> Result<(), DaemonError> {
    config.ensure_dirs()?;

    let registry = Arc::new(ListenerRegistry::new());
    let server = ControlServer::new(
        &config.socket_path,
        Arc::clone(&registry),
        cancel_token.clone(),
    );
    let listener = server.bind().await?;

    let sink = LogSink::open(&config.sink_path)?;

    let buffers = probe_buffers(&config).await;
    if buffers.is_empty() {
        warn!("No log buffers passed probing, tailing the default buffer set");
    }
    let commands = LogSourceCommands::build(&config, &buffers);
    info!(
        buffers = ?buffers,
        sink = %config.sink_path.display(),
        "Log source ready"
    );

    let tail = LogTail::new(commands, Arc::clone(&registry), sink, cancel_token.clone());
    let tail_handle = tokio::spawn(tail.run());

    let watchdog_handle = match &config.peer_socket {
        Some(peer) => {
            let watchdog = Watchdog::new(peer, config.watchdog_grace, cancel_token.clone());
            Some(tokio::spawn(watchdog.run()))
        }
        None => {
            info!("No peer socket configured, watchdog disabled");
            None
        }
    };

    server.serve(listener).await;

    cancel_token.cancel();
    if let Err(e) = tail_handle.await {
        warn!(error = %e, "Tail loop task failed");
    }
    if let Some(handle) = watchdog_handle {
        if let Err(e) = handle.await {
            warn!(error = %e, "Watchdog task failed");
        }
    }

    info!("Daemon stopped");
    Ok(())
}
