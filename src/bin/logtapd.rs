//! logtap daemon - tails the system log and fans lines out to listeners
//!
//! # Usage
//!
//! ```bash
//! # Run in the foreground
//! logtapd
//!
//! # Fork to the background
//! logtapd --daemon
//! ```
//!
//! All settings come from `LOGTAP_*` environment variables, see
//! `logtap_core::config`.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use logtap_core::DaemonConfig;

/// logtap daemon - logcat fan-out to socket listeners
#[derive(Parser, Debug)]
#[command(name = "logtapd", version, about)]
struct Args {
    /// Run as a background daemon (fork to background)
    #[arg(short = 'd', long)]
    daemon: bool,
}

fn read_pid(path: &Path) -> Option<u32> {
    let mut file = File::open(path).ok()?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).ok()?;
    contents.trim().parse().ok()
}

fn write_pid(path: &Path) -> Result<()> {
    let mut file = File::create(path).context("Failed to create PID file")?;
    write!(file, "{}", process::id()).context("Failed to write PID")?;
    Ok(())
}

fn remove_pid_file(path: &Path) {
    let _ = fs::remove_file(path);
}

fn is_process_running(pid: u32) -> bool {
    PathBuf::from(format!("/proc/{pid}")).exists()
}

fn running_daemon(pid_file: &Path) -> Option<u32> {
    if let Some(pid) = read_pid(pid_file) {
        if is_process_running(pid) {
            return Some(pid);
        }
        remove_pid_file(pid_file);
    }
    None
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = DaemonConfig::from_env();
    config
        .ensure_dirs()
        .context("Failed to create state directories")?;

    let pid_file = config.pid_file();
    if let Some(pid) = running_daemon(&pid_file) {
        eprintln!("Daemon is already running (PID {pid})");
        process::exit(1);
    }

    if args.daemon {
        daemonize(&config)?;
    }

    write_pid(&pid_file)?;

    let result = run_daemon(config);

    remove_pid_file(&pid_file);

    result
}

fn daemonize(config: &DaemonConfig) -> Result<()> {
    use daemonize::Daemonize;

    let log_path = config.trace_log();
    let stdout = File::create(&log_path).context("Failed to create log file for stdout")?;
    let stderr = stdout
        .try_clone()
        .context("Failed to create log file for stderr")?;

    let daemonize = Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr);

    daemonize.start().context("Failed to daemonize")?;

    Ok(())
}

#[tokio::main]
async fn run_daemon(config: DaemonConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("logtapd=info".parse()?)
                .add_directive("logtap_core=info".parse()?)
                .add_directive("logtap_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        socket = %config.socket_path.display(),
        "logtap daemon starting"
    );

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    if let Err(e) = logtapd::run(config, cancel_token).await {
        error!(error = %e, "Daemon error");
        return Err(e.into());
    }

    info!("logtap daemon stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT");
        }
    }

    Ok(())
}
