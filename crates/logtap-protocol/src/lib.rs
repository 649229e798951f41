//! logtap Protocol - Wire protocol for daemon communication
//!
//! Every control request is a single 4-byte native-endian command code
//! written on a fresh Unix socket connection:
//!
//! | Code | Command        | Daemon behaviour                                   |
//! |------|----------------|----------------------------------------------------|
//! | 0    | `Handshake`    | echoes `0`, then closes                            |
//! | 1    | `RegisterHide` | keeps the socket as the `hide` listener, no reply  |
//! | 2    | `RegisterLog`  | keeps the socket as the `log` listener, no reply   |
//! | *    | unknown        | closes immediately                                 |

pub mod codec;
pub mod message;

pub use codec::{read_code, read_code_async, write_code, write_code_async, ProtocolError, CODE_LEN};
pub use message::Command;
