use crate::mock::{eventually, Dial, MockTransport};
use std::sync::Arc;
use std::time::Duration;
use tether::{ConnectError, ConnectionManager};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn connect_waits_for_first_success() {
    let transport = MockTransport::scripted([Dial::Fail, Dial::Fail], Dial::Connect);
    let mut manager = ConnectionManager::new(transport);
    manager.set_reconnect_interval(Duration::from_millis(50));
    let scope = CancellationToken::new();

    let result = manager.connect(&scope).await;

    assert_eq!(result, Ok(()));
    assert!(manager.is_connected());
    assert_eq!(manager.transport().restarts(), 2);
    assert!(manager.is_running(), "supervision outlives the connect call");
    scope.cancel();
}

#[tokio::test(start_paused = true)]
async fn connect_returns_cancelled_when_scope_is_cancelled() {
    let mut manager = ConnectionManager::new(MockTransport::new(Dial::Fail));
    manager.set_reconnect_interval(Duration::from_millis(20));
    let scope = CancellationToken::new();

    let canceller = scope.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let err = manager.connect(&scope).await.unwrap_err();
    assert_eq!(err, ConnectError::Cancelled);
    assert!(err.is_cancelled());
    assert!(!err.is_timeout());
    assert_eq!(err.to_string(), "connect cancelled");

    assert!(eventually(|| manager.transport().stops() == 1).await);
    assert!(!manager.is_running());
}

#[tokio::test(start_paused = true)]
async fn connect_observes_stop() {
    let manager = Arc::new(ConnectionManager::new(MockTransport::new(Dial::Hang)));
    let scope = CancellationToken::new();

    let stopper = Arc::clone(&manager);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        stopper.stop();
    });

    let result = manager.connect(&scope).await;
    assert_eq!(result, Err(ConnectError::Cancelled));
    assert!(!scope.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn connect_when_already_connected_returns_at_once() {
    let manager = ConnectionManager::new(MockTransport::new(Dial::Connect));
    let background = CancellationToken::new();
    manager.start_under_scope(&background);
    assert!(eventually(|| manager.is_connected()).await);

    let other = CancellationToken::new();
    let result = tokio::time::timeout(Duration::from_millis(1), manager.connect(&other)).await;

    assert_eq!(result, Ok(Ok(())));
    assert_eq!(manager.transport().dials(), 1);
    other.cancel();
    assert!(eventually(|| manager.transport().stops() == 1).await);
}

#[tokio::test(start_paused = true)]
async fn connect_with_cancelled_scope_reports_cancelled_even_when_connected() {
    let manager = ConnectionManager::new(MockTransport::new(Dial::Connect));
    let background = CancellationToken::new();
    manager.start_under_scope(&background);
    assert!(eventually(|| manager.is_connected()).await);

    let cancelled = CancellationToken::new();
    cancelled.cancel();

    assert_eq!(manager.connect(&cancelled).await, Err(ConnectError::Cancelled));
    assert!(!manager.is_running());
    assert!(eventually(|| manager.transport().stops() == 1).await);
}

#[tokio::test(start_paused = true)]
async fn cancelling_connect_scope_stops_a_run_started_elsewhere() {
    let mut manager = ConnectionManager::new(MockTransport::new(Dial::Fail));
    manager.set_reconnect_interval(Duration::from_millis(20));
    let background = CancellationToken::new();
    manager.start_under_scope(&background);

    let scope = CancellationToken::new();
    let canceller = scope.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(110)).await;
        canceller.cancel();
    });

    assert_eq!(manager.connect(&scope).await, Err(ConnectError::Cancelled));
    assert!(!manager.is_running());
    assert!(eventually(|| manager.transport().stops() == 1).await);

    let dials = manager.transport().dials();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(manager.transport().dials(), dials, "no redial after cancel");
    assert!(!background.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn connect_with_timeout_succeeds_and_keeps_supervising() {
    let transport = MockTransport::scripted([Dial::Fail], Dial::Connect);
    let mut manager = ConnectionManager::new(transport);
    manager.set_reconnect_interval(Duration::from_millis(50));

    manager
        .connect_with_timeout(Duration::from_secs(1))
        .await
        .unwrap();
    assert!(manager.is_connected());
    assert!(manager.is_running());

    manager.transport().drop_connection();
    assert!(eventually(|| manager.is_connected()).await);
    assert_eq!(manager.transport().restarts(), 2);

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn connect_with_timeout_gives_up_and_stops() {
    let manager = ConnectionManager::new(MockTransport::new(Dial::Hang));

    let started = Instant::now();
    let err = manager
        .connect_with_timeout(Duration::from_millis(100))
        .await
        .unwrap_err();

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed < Duration::from_millis(110), "gave up after {elapsed:?}");
    assert_eq!(
        err,
        ConnectError::Timeout {
            timeout: Duration::from_millis(100)
        }
    );
    assert!(err.is_timeout());
    assert!(err.to_string().contains("connect timeout"));

    assert!(!manager.is_running());
    assert!(eventually(|| manager.transport().stops() == 1).await);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(manager.transport().dials(), 1);
}

#[tokio::test(start_paused = true)]
async fn connect_with_timeout_retries_until_deadline() {
    let mut manager = ConnectionManager::new(MockTransport::new(Dial::Fail));
    manager.set_reconnect_interval(Duration::from_millis(30));

    let err = manager
        .connect_with_timeout(Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(err.is_timeout());

    // Dials at 0, 30, 60, and 90ms.
    let dials = manager.transport().dials();
    assert!((3..=5).contains(&dials), "got {dials} dials");
    assert_eq!(manager.transport().restarts(), dials - 1);
}

#[tokio::test(start_paused = true)]
async fn connect_with_timeout_can_be_retried() {
    let manager = ConnectionManager::new(MockTransport::new(Dial::Hang));

    let first = manager.connect_with_timeout(Duration::from_millis(50)).await;
    assert!(first.unwrap_err().is_timeout());

    manager.transport().set_fallback(Dial::Connect);
    let second = manager.connect_with_timeout(Duration::from_millis(50)).await;

    assert_eq!(second, Ok(()));
    assert_eq!(manager.transport().dials(), 2);
    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn stale_success_does_not_satisfy_a_later_wait() {
    let manager = ConnectionManager::new(MockTransport::new(Dial::Connect));
    let scope = CancellationToken::new();

    // Nobody waits on this first success, so its signal stays pending.
    manager.start_under_scope(&scope);
    assert!(eventually(|| manager.is_connected()).await);

    manager.transport().set_fallback(Dial::Hang);
    manager.transport().drop_connection();

    let result = manager
        .connect_with_timeout(Duration::from_millis(200))
        .await;
    assert!(result.unwrap_err().is_timeout());
}

#[tokio::test(start_paused = true)]
async fn connect_wakes_for_the_next_connection_after_a_drop() {
    let mut manager = ConnectionManager::new(MockTransport::new(Dial::Connect));
    manager.set_reconnect_interval(Duration::from_millis(100));
    let scope = CancellationToken::new();

    manager.start_under_scope(&scope);
    assert!(eventually(|| manager.is_connected()).await);
    manager.transport().drop_connection();

    let started = Instant::now();
    manager.connect(&scope).await.unwrap();

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed < Duration::from_millis(110), "reconnected after {elapsed:?}");
    assert_eq!(manager.transport().restarts(), 1);
    scope.cancel();
}
