//! Restart pacing for the log source.

use std::time::Duration;

/// First delay after a short-lived session.
pub const INITIAL_RESTART_DELAY: Duration = Duration::from_millis(100);

/// Upper bound on the restart delay.
pub const MAX_RESTART_DELAY: Duration = Duration::from_secs(5);

/// Sessions at least this long reset the backoff.
pub const HEALTHY_SESSION: Duration = Duration::from_secs(10);

/// Decides how long to wait before respawning the log source.
///
/// A healthy session restarts immediately. Consecutive short sessions
/// back off exponentially, so a log source that exits at once does not
/// turn the tail loop into a busy loop.
#[derive(Debug, Clone)]
pub struct RestartPacer {
    initial: Duration,
    max: Duration,
    healthy: Duration,
    current: Duration,
}

impl RestartPacer {
    pub fn new(initial: Duration, max: Duration, healthy: Duration) -> Self {
        Self {
            initial,
            max,
            healthy,
            current: Duration::ZERO,
        }
    }

    /// Delay to apply after a session that lasted `session`.
    pub fn next_delay(&mut self, session: Duration) -> Duration {
        if session >= self.healthy {
            self.current = Duration::ZERO;
            return Duration::ZERO;
        }

        self.current = if self.current.is_zero() {
            self.initial
        } else {
            self.current.saturating_mul(2).min(self.max)
        };
        self.current
    }
}

impl Default for RestartPacer {
    fn default() -> Self {
        Self::new(INITIAL_RESTART_DELAY, MAX_RESTART_DELAY, HEALTHY_SESSION)
    }
}
