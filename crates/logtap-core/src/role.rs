//! Listener roles and their line filters.
//!
//! Each role owns exactly one listener slot in the daemon's registry.
//! The slot index is the role's position in [`ListenerRole::ALL`], which
//! keeps slot lookup O(1) without relying on enum discriminant casts.

use std::fmt;

/// Marker substring identifying process-start events in the log stream.
pub const PROC_START_MARKER: &[u8] = b"am_proc_start";

/// A pure predicate over one raw log line (trailing newline included).
pub type LineFilter = fn(&[u8]) -> bool;

/// The kinds of listener the daemon can fan lines out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerRole {
    /// Receives process-start events only.
    Hide,
    /// Receives every other line.
    Log,
}

impl ListenerRole {
    /// All roles, in slot order.
    pub const ALL: [ListenerRole; 2] = [ListenerRole::Hide, ListenerRole::Log];

    /// Number of listener slots.
    pub const COUNT: usize = Self::ALL.len();

    /// Slot index of this role.
    pub const fn index(self) -> usize {
        match self {
            ListenerRole::Hide => 0,
            ListenerRole::Log => 1,
        }
    }

    /// Short lowercase name used in logs.
    pub const fn name(self) -> &'static str {
        match self {
            ListenerRole::Hide => "hide",
            ListenerRole::Log => "log",
        }
    }

    /// Filter predicate deciding which lines this role receives.
    pub fn filter(self) -> LineFilter {
        match self {
            ListenerRole::Hide => is_proc_start,
            ListenerRole::Log => is_not_proc_start,
        }
    }

    /// Convenience: evaluates this role's filter against a line.
    pub fn accepts(self, line: &[u8]) -> bool {
        (self.filter())(line)
    }
}

impl fmt::Display for ListenerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returns true if the line is a logcat buffer marker
/// (e.g. `--------- beginning of main`) rather than log content.
pub fn is_sentinel(line: &[u8]) -> bool {
    line.first() == Some(&b'-')
}

fn is_proc_start(line: &[u8]) -> bool {
    contains(line, PROC_START_MARKER)
}

fn is_not_proc_start(line: &[u8]) -> bool {
    !is_proc_start(line)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack.windows(needle.len()).any(|window| window == needle)
}
