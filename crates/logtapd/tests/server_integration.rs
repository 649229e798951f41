//! Integration tests for the control server.
//!
//! These tests drive a real `ControlServer` over a Unix socket in a temp
//! directory and check the handshake, registration and rejection paths
//! together with the listener registry.
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use logtap_core::ListenerRole;
use logtap_protocol::{read_code_async, write_code_async, Command};
use logtapd::{ControlServer, ListenerRegistry};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::UnixStream;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Constants
// ============================================================================

/// Maximum time to wait for server socket to appear
const SOCKET_WAIT_TIMEOUT: Duration = Duration::from_millis(500);

/// Interval between socket existence checks
const SOCKET_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Upper bound for any single read in these tests
const READ_TIMEOUT: Duration = Duration::from_secs(5);

const PROC_START_LINE: &str = "10-19 12:00:00.000  1000  1000 I am_proc_start: [0,4242,10087,com.example,activity]\n";
const PLAIN_LINE: &str = "10-19 12:00:00.001  4242  4242 I logtap  : hello\n";

// ============================================================================
// Test Helpers
// ============================================================================

/// Test server context that manages server lifecycle and cleanup.
struct TestServer {
    socket_path: PathBuf,
    registry: Arc<ListenerRegistry>,
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
    _temp_dir: TempDir,
}

impl TestServer {
    async fn spawn() -> Self {
        let temp_dir = tempfile::tempdir().expect("create temp dir");
        let socket_path = temp_dir.path().join("logtap.sock");
        let registry = Arc::new(ListenerRegistry::new());
        let cancel_token = CancellationToken::new();

        let server = ControlServer::new(&socket_path, Arc::clone(&registry), cancel_token.clone());
        let handle = tokio::spawn(async move {
            server.run().await.expect("server run");
        });

        let start = tokio::time::Instant::now();
        while start.elapsed() < SOCKET_WAIT_TIMEOUT {
            if socket_path.exists() {
                break;
            }
            sleep(SOCKET_POLL_INTERVAL).await;
        }
        assert!(
            socket_path.exists(),
            "Server socket did not appear within {SOCKET_WAIT_TIMEOUT:?}"
        );

        TestServer {
            socket_path,
            registry,
            cancel_token,
            handle,
            _temp_dir: temp_dir,
        }
    }

    async fn connect(&self) -> UnixStream {
        UnixStream::connect(&self.socket_path)
            .await
            .expect("connect to server")
    }

    /// Sends a registration command and waits until the slot is filled.
    async fn register(&self, role: ListenerRole) -> UnixStream {
        let mut stream = self.connect().await;
        write_code_async(&mut stream, Command::register(role).code())
            .await
            .unwrap();

        let start = tokio::time::Instant::now();
        while !self.registry.is_registered(role).await {
            assert!(start.elapsed() < READ_TIMEOUT, "{role} listener never registered");
            sleep(SOCKET_POLL_INTERVAL).await;
        }
        stream
    }

    async fn shutdown(self) -> PathBuf {
        self.cancel_token.cancel();
        timeout(READ_TIMEOUT, self.handle)
            .await
            .expect("server did not stop")
            .unwrap();
        self.socket_path
    }
}

async fn read_line(stream: &mut BufReader<UnixStream>) -> String {
    let mut line = String::new();
    timeout(READ_TIMEOUT, stream.read_line(&mut line))
        .await
        .expect("timed out waiting for a line")
        .unwrap();
    line
}

// ============================================================================
// Handshake Tests
// ============================================================================

#[tokio::test]
async fn test_handshake_echo_then_close() {
    let server = TestServer::spawn().await;
    let mut stream = server.connect().await;

    write_code_async(&mut stream, Command::Handshake.code())
        .await
        .unwrap();
    let reply = timeout(READ_TIMEOUT, read_code_async(&mut stream))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply, 0);

    let mut rest = Vec::new();
    let n = timeout(READ_TIMEOUT, stream.read_to_end(&mut rest))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(n, 0, "connection should close after the echo");

    server.shutdown().await;
}

#[tokio::test]
async fn test_many_sequential_handshakes() {
    let server = TestServer::spawn().await;

    for _ in 0..20 {
        let mut stream = server.connect().await;
        write_code_async(&mut stream, Command::Handshake.code())
            .await
            .unwrap();
        let reply = read_code_async(&mut stream).await.unwrap();
        assert_eq!(reply, Command::Handshake.code());
    }

    assert_eq!(server.registry.listener_count().await, 0);
    server.shutdown().await;
}

#[tokio::test]
async fn test_unknown_code_closes_connection() {
    let server = TestServer::spawn().await;
    let mut stream = server.connect().await;

    write_code_async(&mut stream, 42).await.unwrap();
    let mut rest = Vec::new();
    let n = timeout(READ_TIMEOUT, stream.read_to_end(&mut rest))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(n, 0);
    assert_eq!(server.registry.listener_count().await, 0);

    server.shutdown().await;
}

// ============================================================================
// Registration Tests
// ============================================================================

#[tokio::test]
async fn test_registered_listeners_get_filtered_lines() {
    let server = TestServer::spawn().await;
    let hide = server.register(ListenerRole::Hide).await;
    let log = server.register(ListenerRole::Log).await;

    assert_eq!(server.registry.publish(PROC_START_LINE.as_bytes()).await, 1);
    assert_eq!(server.registry.publish(PLAIN_LINE.as_bytes()).await, 1);

    let mut hide = BufReader::new(hide);
    let mut log = BufReader::new(log);
    assert_eq!(read_line(&mut hide).await, PROC_START_LINE);
    assert_eq!(read_line(&mut log).await, PLAIN_LINE);

    // Send one more of each and check ordering: nothing crossed over.
    server.registry.publish(PLAIN_LINE.as_bytes()).await;
    server.registry.publish(PROC_START_LINE.as_bytes()).await;
    assert_eq!(read_line(&mut hide).await, PROC_START_LINE);
    assert_eq!(read_line(&mut log).await, PLAIN_LINE);

    server.shutdown().await;
}

#[tokio::test]
async fn test_reregistration_closes_previous_listener() {
    let server = TestServer::spawn().await;
    let mut first = server.register(ListenerRole::Log).await;

    // Second registration on the same role replaces the first.
    let mut second = server.connect().await;
    write_code_async(&mut second, Command::RegisterLog.code())
        .await
        .unwrap();

    let mut rest = Vec::new();
    let n = timeout(READ_TIMEOUT, first.read_to_end(&mut rest))
        .await
        .expect("previous listener was not closed")
        .unwrap();
    assert_eq!(n, 0);

    assert_eq!(server.registry.publish(PLAIN_LINE.as_bytes()).await, 1);
    let mut second = BufReader::new(second);
    assert_eq!(read_line(&mut second).await, PLAIN_LINE);

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_back_to_back_registrations_keep_the_latest() {
    let server = TestServer::spawn().await;

    for round in 0..50 {
        let mut earlier = server.connect().await;
        write_code_async(&mut earlier, Command::RegisterHide.code())
            .await
            .unwrap();
        let mut later = server.connect().await;
        write_code_async(&mut later, Command::RegisterHide.code())
            .await
            .unwrap();

        // Whichever handler runs last, the earlier connection ends up closed.
        let mut rest = Vec::new();
        let n = timeout(READ_TIMEOUT, earlier.read_to_end(&mut rest))
            .await
            .unwrap_or_else(|_| panic!("round {round}: earlier listener was not closed"))
            .unwrap();
        assert_eq!(n, 0, "round {round}: earlier listener received data");

        assert_eq!(
            server.registry.publish(PROC_START_LINE.as_bytes()).await,
            1,
            "round {round}: later listener lost the slot"
        );
        let mut later = BufReader::new(later);
        assert_eq!(read_line(&mut later).await, PROC_START_LINE);
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_disconnected_listener_is_dropped() {
    let server = TestServer::spawn().await;
    let hide = server.register(ListenerRole::Hide).await;
    drop(hide);

    assert_eq!(server.registry.publish(PROC_START_LINE.as_bytes()).await, 0);
    assert!(!server.registry.is_registered(ListenerRole::Hide).await);

    server.shutdown().await;
}

// ============================================================================
// Shutdown Tests
// ============================================================================

#[tokio::test]
async fn test_shutdown_removes_socket() {
    let server = TestServer::spawn().await;
    let socket_path = server.shutdown().await;
    assert!(!socket_path.exists());
}
