//! Listener registry: one socket slot per listener role.
//!
//! The registry is the only state shared between the control server
//! (which fills slots) and the tail loop (which writes into them). A single
//! async mutex guards the whole slot table, so a line is never written to a
//! handle that is halfway through being replaced.
//!
//! # Registration order
//!
//! Every registration carries the accept sequence number of its connection.
//! A slot remembers the newest sequence it has installed and refuses older
//! ones, so the most recently accepted connection wins even when connection
//! tasks finish out of order.
//!
//! # Listener death
//!
//! A failed or timed-out write drops the handle and clears the slot under
//! the same lock acquisition. Later publishes skip the slot until a new
//! listener registers for it. Nothing is reported back to the publisher.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Slots are addressed with `get_mut`, never by direct indexing

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use logtap_core::{LineFilter, ListenerRole};

/// Upper bound on a single listener write while the registry lock is held.
pub const LISTENER_WRITE_TIMEOUT: Duration = Duration::from_secs(2);

/// One listener slot.
struct ListenerSlot {
    role: ListenerRole,
    filter: LineFilter,
    handle: Option<UnixStream>,
    /// Accept sequence of the newest registration seen for this slot.
    newest: Option<u64>,
}

impl ListenerSlot {
    fn new(role: ListenerRole) -> Self {
        Self {
            role,
            filter: role.filter(),
            handle: None,
            newest: None,
        }
    }
}

/// Fixed table of listener slots, one per [`ListenerRole`].
pub struct ListenerRegistry {
    slots: Mutex<[ListenerSlot; ListenerRole::COUNT]>,
    write_timeout: Duration,
}

impl ListenerRegistry {
    /// Creates a registry with every slot empty.
    pub fn new() -> Self {
        Self::with_write_timeout(LISTENER_WRITE_TIMEOUT)
    }

    /// Creates a registry with a custom per-write timeout.
    pub fn with_write_timeout(write_timeout: Duration) -> Self {
        Self {
            slots: Mutex::new(ListenerRole::ALL.map(ListenerSlot::new)),
            write_timeout,
        }
    }

    /// Installs `handle` as the listener for `role`.
    ///
    /// `sequence` is the accept order of the registering connection. Any
    /// previous handle in that slot is closed (dropped) exactly once. A
    /// registration older than one already seen for the slot is closed
    /// instead, and `false` is returned.
    pub async fn register(&self, role: ListenerRole, handle: UnixStream, sequence: u64) -> bool {
        let mut slots = self.slots.lock().await;
        let Some(slot) = slots.get_mut(role.index()) else {
            return false;
        };

        if slot.newest.is_some_and(|newest| sequence < newest) {
            debug!(
                role = %role,
                sequence,
                newest = ?slot.newest,
                "Stale registration, closing it"
            );
            return false;
        }
        slot.newest = Some(sequence);

        if slot.handle.replace(handle).is_some() {
            info!(role = %role, sequence, "Listener replaced, previous connection closed");
        } else {
            info!(role = %role, sequence, "Listener registered");
        }
        true
    }

    /// Writes `line` to every registered listener whose filter accepts it.
    ///
    /// Returns how many listeners received the line. Listeners whose write
    /// fails or exceeds the write timeout are closed and unregistered.
    pub async fn publish(&self, line: &[u8]) -> usize {
        let mut slots = self.slots.lock().await;
        let mut delivered = 0;

        for slot in slots.iter_mut() {
            if !(slot.filter)(line) {
                continue;
            }
            let Some(stream) = slot.handle.as_mut() else {
                continue;
            };

            let result = timeout(self.write_timeout, stream.write_all(line)).await;
            match result {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    debug!(role = %slot.role, error = %e, "Listener write failed, dropping listener");
                    slot.handle = None;
                }
                Err(_) => {
                    warn!(
                        role = %slot.role,
                        timeout_ms = self.write_timeout.as_millis() as u64,
                        "Listener write timed out, dropping listener"
                    );
                    slot.handle = None;
                }
            }
        }

        delivered
    }

    /// Returns true if `role` currently has a listener.
    pub async fn is_registered(&self, role: ListenerRole) -> bool {
        let slots = self.slots.lock().await;
        slots
            .get(role.index())
            .map(|slot| slot.handle.is_some())
            .unwrap_or(false)
    }

    /// Number of occupied slots.
    pub async fn listener_count(&self) -> usize {
        let slots = self.slots.lock().await;
        slots.iter().filter(|slot| slot.handle.is_some()).count()
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    const PROC_START: &[u8] = b"I am_proc_start: [0,4242,10087,com.example,activity]\n";
    const PLAIN: &[u8] = b"I logtap: hello\n";

    async fn read_exact_len(stream: &mut UnixStream, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        stream.read_exact(&mut buf).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn test_publish_without_listeners() {
        let registry = ListenerRegistry::new();
        assert_eq!(registry.publish(PLAIN).await, 0);
        assert_eq!(registry.listener_count().await, 0);
    }

    #[tokio::test]
    async fn test_publish_respects_filters() {
        let registry = ListenerRegistry::new();
        let (hide_server, mut hide_client) = UnixStream::pair().unwrap();
        let (log_server, mut log_client) = UnixStream::pair().unwrap();
        registry.register(ListenerRole::Hide, hide_server, 0).await;
        registry.register(ListenerRole::Log, log_server, 1).await;

        assert_eq!(registry.publish(PROC_START).await, 1);
        assert_eq!(registry.publish(PLAIN).await, 1);

        assert_eq!(read_exact_len(&mut hide_client, PROC_START.len()).await, PROC_START);
        assert_eq!(read_exact_len(&mut log_client, PLAIN.len()).await, PLAIN);

        // Nothing else is pending on either side.
        drop(registry);
        let mut rest = Vec::new();
        hide_client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty(), "hide listener got a non-matching line");
        log_client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty(), "log listener got a non-matching line");
    }

    #[tokio::test]
    async fn test_dead_listener_is_cleared_once() {
        let registry = ListenerRegistry::new();
        let (server, client) = UnixStream::pair().unwrap();
        registry.register(ListenerRole::Log, server, 0).await;
        drop(client);

        assert_eq!(registry.publish(PLAIN).await, 0);
        assert!(!registry.is_registered(ListenerRole::Log).await);

        // Further publishes skip the empty slot.
        assert_eq!(registry.publish(PLAIN).await, 0);
        assert_eq!(registry.listener_count().await, 0);
    }

    #[tokio::test]
    async fn test_register_replaces_and_closes_previous() {
        let registry = ListenerRegistry::new();
        let (first_server, mut first_client) = UnixStream::pair().unwrap();
        let (second_server, mut second_client) = UnixStream::pair().unwrap();

        assert!(registry.register(ListenerRole::Hide, first_server, 0).await);
        assert!(registry.register(ListenerRole::Hide, second_server, 1).await);
        assert_eq!(registry.listener_count().await, 1);

        // The first connection was closed by the replacement.
        let mut buf = Vec::new();
        let n = first_client.read_to_end(&mut buf).await.unwrap();
        assert_eq!(n, 0);

        assert_eq!(registry.publish(PROC_START).await, 1);
        assert_eq!(
            read_exact_len(&mut second_client, PROC_START.len()).await,
            PROC_START
        );
    }

    #[tokio::test]
    async fn test_older_registration_does_not_replace_newer() {
        let registry = ListenerRegistry::new();
        let (older_server, mut older_client) = UnixStream::pair().unwrap();
        let (newer_server, mut newer_client) = UnixStream::pair().unwrap();

        // The later-accepted connection gets there first.
        assert!(registry.register(ListenerRole::Hide, newer_server, 5).await);
        assert!(!registry.register(ListenerRole::Hide, older_server, 4).await);
        assert_eq!(registry.listener_count().await, 1);

        let mut buf = Vec::new();
        assert_eq!(older_client.read_to_end(&mut buf).await.unwrap(), 0);

        assert_eq!(registry.publish(PROC_START).await, 1);
        assert_eq!(
            read_exact_len(&mut newer_client, PROC_START.len()).await,
            PROC_START
        );
    }

    #[tokio::test]
    async fn test_stale_registration_rejected_after_listener_died() {
        let registry = ListenerRegistry::new();
        let (newer_server, newer_client) = UnixStream::pair().unwrap();
        let (older_server, _older_client) = UnixStream::pair().unwrap();

        registry.register(ListenerRole::Log, newer_server, 3).await;
        drop(newer_client);
        assert_eq!(registry.publish(PLAIN).await, 0);

        assert!(!registry.register(ListenerRole::Log, older_server, 2).await);
        assert!(!registry.is_registered(ListenerRole::Log).await);
    }

    #[tokio::test]
    async fn test_stalled_listener_times_out() {
        let registry = ListenerRegistry::with_write_timeout(Duration::from_millis(50));
        let (server, _client) = UnixStream::pair().unwrap();
        registry.register(ListenerRole::Log, server, 0).await;

        // The client never reads; eventually the socket buffer fills and
        // the bounded write gives up.
        let chunk = vec![b'x'; 64 * 1024];
        let mut dropped = false;
        for _ in 0..1024 {
            if registry.publish(&chunk).await == 0 {
                dropped = true;
                break;
            }
        }

        assert!(dropped, "stalled listener was never dropped");
        assert!(!registry.is_registered(ListenerRole::Log).await);
    }
}
