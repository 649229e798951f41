//! Startup probing of log source buffers.

use std::process::Stdio;

use tracing::{debug, info, warn};

use logtap_core::{probe_command, restore_dev_null_mode, DaemonConfig};

/// Returns the configured buffers the log source can actually dump, in
/// configuration order.
///
/// Each buffer is tried with a one-shot dump to `/dev/null`. A buffer is
/// kept only if that run exits successfully.
pub async fn probe_buffers(config: &DaemonConfig) -> Vec<String> {
    let mut supported = Vec::with_capacity(config.buffers.len());

    for buffer in &config.buffers {
        let mut command = probe_command(&config.logcat_path, Some(buffer.as_str())).to_command();
        command.stdout(Stdio::null());

        match command.status().await {
            Ok(status) if status.success() => {
                debug!(buffer = %buffer, "Log buffer supported");
                supported.push(buffer.clone());
            }
            Ok(status) => {
                debug!(buffer = %buffer, status = %status, "Log buffer not supported");
            }
            Err(e) => {
                warn!(buffer = %buffer, error = %e, "Failed to run log source probe");
            }
        }
    }

    match restore_dev_null_mode() {
        Ok(true) => info!("Restored /dev/null permissions after probing"),
        Ok(false) => {}
        Err(e) => debug!(error = %e, "Could not check /dev/null permissions"),
    }

    supported
}
