//! logtap Daemon - Log tail fan-out and control server
//!
//! This crate provides the daemon's moving parts:
//! - `tail` - Runs the log source, restarts it, clears its buffers
//! - `registry` - One listener socket per role, filtered fan-out
//! - `sink` - Append-only on-disk copy of the tailed lines
//! - `server` - Unix socket control server (handshake and registration)
//! - `watchdog` - Liveness prober for a peer control socket
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         logtapd                              │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  ┌───────────────┐ register  ┌────────────────────┐          │
//! │  │ ControlServer │─────────▶│  ListenerRegistry  │          │
//! │  │ (Unix socket) │           │  hide │ log        │          │
//! │  └───────────────┘           └─────────▲──────────┘          │
//! │                                        │ publish             │
//! │  ┌───────────────┐  lines    ┌─────────┴──────────┐          │
//! │  │  log source   │─────────▶│      LogTail       │──▶ sink  │
//! │  │ (child proc)  │           └────────────────────┘          │
//! │  └───────────────┘                                           │
//! │                                                              │
//! │  ┌───────────────┐  handshake every ~100ms                   │
//! │  │   Watchdog    │──────────▶ peer control socket            │
//! │  └───────────────┘                                           │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - A broken listener or log source never takes the daemon down

pub mod daemon;
pub mod error;
pub mod registry;
pub mod server;
pub mod sink;
pub mod tail;
pub mod watchdog;

pub use daemon::run;
pub use error::DaemonError;
pub use registry::{ListenerRegistry, LISTENER_WRITE_TIMEOUT};
pub use server::{ConnectionHandler, ConnectionOutcome, ControlServer};
pub use sink::LogSink;
pub use tail::{probe_buffers, LogTail, RestartPacer, LINE_LIMIT};
pub use watchdog::{ProbeOutcome, Watchdog};
