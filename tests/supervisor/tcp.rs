//! Supervision of a real loopback endpoint.
//!
//! These run in real time, so intervals are kept short.

use crate::mock::eventually;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tether::tcp::{TcpOption, TcpTransport};
use tether::{ConnectError, Connection, ConnectionManager};
use tokio::net::{TcpListener, TcpSocket};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A server that can be taken down and brought back on the same port.
struct Server {
    addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Server {
    fn bind(addr: SocketAddr) -> Self {
        let socket = TcpSocket::new_v4().unwrap();
        socket.set_reuseaddr(true).unwrap();
        socket.bind(addr).unwrap();
        let listener = socket.listen(64).unwrap();
        let addr = listener.local_addr().unwrap();

        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&accepted);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            // Held until shutdown so clients only see EOF when the server goes away.
            let mut peers = Vec::new();
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    incoming = listener.accept() => match incoming {
                        Ok((stream, _)) => {
                            counter.fetch_add(1, Ordering::SeqCst);
                            peers.push(stream);
                        }
                        Err(_) => break,
                    },
                }
            }
        });

        Self {
            addr,
            accepted,
            cancel,
            task,
        }
    }

    fn ephemeral() -> Self {
        Self::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
    }

    async fn stop(self) -> SocketAddr {
        self.cancel.cancel();
        let _ = self.task.await;
        self.addr
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
        .try_init();
}

async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

fn manager(addr: SocketAddr) -> ConnectionManager<TcpTransport> {
    let mut manager = ConnectionManager::tcp(
        addr.to_string(),
        [TcpOption::ConnectTimeout(Duration::from_millis(500))],
    );
    manager.set_reconnect_interval(Duration::from_millis(50));
    manager
}

#[tokio::test]
async fn reconnects_when_server_comes_back() {
    init_tracing();
    let server = Server::ephemeral();
    let manager = manager(server.addr);
    let up = Arc::new(AtomicUsize::new(0));
    let down = Arc::new(AtomicUsize::new(0));
    let u = Arc::clone(&up);
    manager.set_on_connection_established(move |_| {
        u.fetch_add(1, Ordering::SeqCst);
    });
    let d = Arc::clone(&down);
    manager.set_on_connection_lost(move |_| {
        d.fetch_add(1, Ordering::SeqCst);
    });

    let scope = CancellationToken::new();
    manager.start_under_scope(&scope);
    assert!(eventually(|| manager.is_connected()).await);
    assert_eq!(up.load(Ordering::SeqCst), 1);

    let addr = server.stop().await;
    assert!(eventually(|| !manager.is_connected()).await);
    assert_eq!(down.load(Ordering::SeqCst), 1);

    // Let a few dials fail against the closed port.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!manager.is_connected());

    let server = Server::bind(addr);
    assert!(eventually(|| manager.is_connected()).await);
    assert_eq!(up.load(Ordering::SeqCst), 2);

    scope.cancel();
    assert!(eventually(|| !manager.is_connected()).await);
    assert_eq!(down.load(Ordering::SeqCst), 2);
    server.stop().await;
}

#[tokio::test]
async fn connect_succeeds_against_a_listening_server() {
    let server = Server::ephemeral();
    let manager = manager(server.addr);
    let scope = CancellationToken::new();

    let result = tokio::time::timeout(Duration::from_secs(1), manager.connect(&scope)).await;

    assert_eq!(result, Ok(Ok(())));
    let conn = manager.current_connection().expect("live connection");
    assert_eq!(conn.remote_addr(), Some(server.addr));
    scope.cancel();
    server.stop().await;
}

#[tokio::test]
async fn connect_is_cancelled_against_a_closed_port() {
    let manager = manager(closed_port().await);
    let scope = CancellationToken::new();

    let canceller = scope.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let result = manager.connect(&scope).await;
    assert_eq!(result, Err(ConnectError::Cancelled));
}

#[tokio::test]
async fn connect_with_timeout_against_a_closed_port() {
    let addr = closed_port().await;
    let manager = manager(addr);

    let started = std::time::Instant::now();
    let err = manager
        .connect_with_timeout(Duration::from_millis(100))
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert!(err.is_timeout());
    assert!(err.to_string().contains("connect timeout"));
    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed < Duration::from_millis(500), "gave up after {elapsed:?}");
    assert!(!manager.is_running());

    // Anything still dialing would now get through.
    let server = Server::bind(addr);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(server.accepted.load(Ordering::SeqCst), 0);
    assert!(!manager.is_connected());
    server.stop().await;
}

#[tokio::test]
async fn connect_with_timeout_succeeds() {
    let server = Server::ephemeral();
    let manager = manager(server.addr);

    manager
        .connect_with_timeout(Duration::from_secs(1))
        .await
        .unwrap();
    assert!(manager.is_connected());

    manager.shutdown().await;
    assert!(!manager.is_connected());
    assert!(manager.current_connection().is_none());
    server.stop().await;
}

#[tokio::test]
async fn stop_disconnects() {
    let server = Server::ephemeral();
    let manager = manager(server.addr);
    let scope = CancellationToken::new();
    manager.start_under_scope(&scope);
    assert!(eventually(|| manager.is_connected()).await);

    manager.stop();
    assert!(eventually(|| !manager.is_connected()).await);
    assert!(manager.current_connection().is_none());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!manager.is_connected(), "no redial after stop");
    server.stop().await;
}
