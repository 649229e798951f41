//! Control command codes.

use std::fmt;

use logtap_core::ListenerRole;

/// Commands a client can send on the control socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Liveness probe; the daemon echoes the code back.
    Handshake,
    /// Hand this connection over as the `hide` listener.
    RegisterHide,
    /// Hand this connection over as the `log` listener.
    RegisterLog,
}

impl Command {
    /// Wire value of this command.
    pub const fn code(self) -> i32 {
        match self {
            Command::Handshake => 0,
            Command::RegisterHide => 1,
            Command::RegisterLog => 2,
        }
    }

    /// Decodes a wire value. Unknown codes yield `None`.
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Command::Handshake),
            1 => Some(Command::RegisterHide),
            2 => Some(Command::RegisterLog),
            _ => None,
        }
    }

    /// Registration command for a listener role.
    pub const fn register(role: ListenerRole) -> Self {
        match role {
            ListenerRole::Hide => Command::RegisterHide,
            ListenerRole::Log => Command::RegisterLog,
        }
    }

    /// The listener slot a registration command targets.
    pub const fn listener_role(self) -> Option<ListenerRole> {
        match self {
            Command::Handshake => None,
            Command::RegisterHide => Some(ListenerRole::Hide),
            Command::RegisterLog => Some(ListenerRole::Log),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Handshake => f.write_str("handshake"),
            Command::RegisterHide => f.write_str("register-hide"),
            Command::RegisterLog => f.write_str("register-log"),
        }
    }
}
