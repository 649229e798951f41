//! logtap Core - Shared types for the logtap daemon and its clients
//!
//! This crate provides the domain types shared between the daemon
//! (logtapd) and the bootstrap client (logtap-client).
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod command;
pub mod config;
pub mod error;
pub mod role;

// Re-exports for convenience
pub use command::{
    probe_command, restore_dev_null_mode, CommandSpec, LogSourceCommands, PROC_START_TAG,
};
pub use config::{DaemonConfig, DEFAULT_SOCKET_PATH};
pub use error::{CoreError, CoreResult};
pub use role::{is_sentinel, LineFilter, ListenerRole, PROC_START_MARKER};
