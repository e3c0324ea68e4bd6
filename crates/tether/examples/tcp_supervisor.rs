use std::time::Duration;
use tether::tcp::{TcpConnection, TcpOption};
use tether::{Connection, ConnectionManager, SupervisorConfig};
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Example driving a supervised TCP connection three ways.
///
/// An in-process server accepts connections and prints whatever it reads.
/// Each scenario builds a fresh manager against it:
/// - background supervision under a scope
/// - waiting for the first connection under a scope
/// - waiting for the first connection with a deadline
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?.to_string();
    tokio::spawn(serve(listener));

    println!("1. Background supervision");
    start_under_scope(&addr).await;

    println!("\n2. Connect under a scope");
    connect(&addr).await?;

    println!("\n3. Connect with a deadline");
    connect_with_timeout(&addr).await?;

    println!("\n4. Connect with a deadline to a closed port");
    let unreachable = TcpListener::bind("127.0.0.1:0").await?.local_addr()?;
    let manager = ConnectionManager::tcp(
        unreachable.to_string(),
        [TcpOption::ConnectTimeout(Duration::from_millis(200))],
    );
    match manager.connect_with_timeout(Duration::from_millis(500)).await {
        Ok(()) => println!("   unexpectedly connected"),
        Err(e) => println!("   {e}"),
    }

    Ok(())
}

fn manager(addr: &str, name: &str) -> ConnectionManager<tether::tcp::TcpTransport> {
    let config = SupervisorConfig::builder()
        .name(name)
        .reconnect_interval(Duration::from_millis(500))
        .on_reconnect(|reason, delay| println!("   reconnecting after {reason} in {delay:?}"))
        .on_stopped(|| println!("   supervision stopped"))
        .build();

    let manager = ConnectionManager::with_config(
        tether::tcp::TcpTransport::with_options(addr, [TcpOption::NoDelay(true)]),
        config,
    );
    manager.set_on_connection_established(on_connected);
    manager.set_on_connection_lost(on_lost);
    manager
}

fn on_connected(conn: &TcpConnection) {
    println!(
        "   connected: {:?} -> {:?}",
        conn.local_addr(),
        conn.remote_addr()
    );
}

fn on_lost(conn: &TcpConnection) {
    println!("   lost connection #{}", conn.id());
}

async fn start_under_scope(addr: &str) {
    let manager = manager(addr, "background");
    let scope = CancellationToken::new();
    manager.start_under_scope(&scope);

    tokio::time::sleep(Duration::from_secs(1)).await;
    println!("   connected = {}", manager.is_connected());

    manager.stop();
    manager.shutdown().await;
}

async fn connect(addr: &str) -> Result<(), tether::ConnectError> {
    let manager = manager(addr, "connect");
    let scope = CancellationToken::new();

    manager.connect(&scope).await?;
    println!("   connect succeeded");

    tokio::time::sleep(Duration::from_secs(1)).await;
    manager.shutdown().await;
    Ok(())
}

async fn connect_with_timeout(addr: &str) -> Result<(), tether::ConnectError> {
    let manager = manager(addr, "deadline");

    manager.connect_with_timeout(Duration::from_secs(5)).await?;
    println!("   connect succeeded");

    tokio::time::sleep(Duration::from_secs(1)).await;
    manager.shutdown().await;
    Ok(())
}

async fn serve(listener: TcpListener) {
    while let Ok((mut socket, peer)) = listener.accept().await {
        tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            loop {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => println!("   server read {n} bytes from {peer}"),
                }
            }
            println!("   server saw {peer} disconnect");
        });
    }
}
