//! logtap Client - Start the daemon once, then talk to it
//!
//! Other processes use this crate to make sure `logtapd` is running and
//! to open control connections to it:
//!
//! ```no_run
//! use logtap_client::{Bootstrap, BootstrapConfig};
//! use logtap_core::ListenerRole;
//!
//! let bootstrap = Bootstrap::new(BootstrapConfig::default());
//! bootstrap.start()?;
//! let hide = bootstrap.register_listener(ListenerRole::Hide)?;
//! # drop(hide);
//! # Ok::<(), logtap_client::BootstrapError>(())
//! ```
//!
//! Everything here is blocking `std` I/O; callers need no async runtime.

pub mod bootstrap;
pub mod error;

pub use bootstrap::{handshake, locate_daemon_binary, Bootstrap, BootstrapConfig, CONNECT_RETRY};
pub use error::{BootstrapError, Result};
