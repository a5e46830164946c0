//! Health check behavior with real sockets, files, and short deadlines.

use std::time::Duration;

use tokio::net::TcpListener;

use stevedore::health::{HealthOutcome, PortCheck, StateFileCheck};

const SHORT: Duration = Duration::from_millis(50);

#[tokio::test]
async fn port_check_succeeds_against_listening_port() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        loop {
            let _ = listener.accept().await;
        }
    });

    let probe = PortCheck::new("127.0.0.1", port)
        .retry_interval(SHORT)
        .start(Duration::from_secs(5));
    assert_eq!(probe.wait().await, HealthOutcome::Ready);
}

#[tokio::test]
async fn port_check_succeeds_when_listener_arrives_late() {
    // Bind then drop to reserve a port that initially refuses connections.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let probe = PortCheck::new("127.0.0.1", addr.port())
        .retry_interval(SHORT)
        .start(Duration::from_secs(5));

    // Let a few connection attempts fail before the listener appears.
    tokio::time::sleep(Duration::from_millis(150)).await;
    let listener = TcpListener::bind(addr).await.unwrap();
    tokio::spawn(async move {
        loop {
            let _ = listener.accept().await;
        }
    });

    assert_eq!(probe.wait().await, HealthOutcome::Ready);
}

#[tokio::test]
async fn port_check_times_out_when_nothing_listens() {
    // Bind then drop to obtain a port that refuses connections.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let probe = PortCheck::new("127.0.0.1", port)
        .retry_interval(SHORT)
        .start(Duration::from_millis(300));
    assert_eq!(probe.wait().await, HealthOutcome::TimedOut);
}

#[tokio::test]
async fn port_check_stop_resolves_to_stopped() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let probe = PortCheck::new("127.0.0.1", port)
        .retry_interval(SHORT)
        .start(Duration::from_secs(60));
    probe.stop();
    assert_eq!(probe.wait().await, HealthOutcome::Stopped);
}

#[tokio::test]
async fn state_file_ready_when_running() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, r#"{"state": "RUNNING"}"#).unwrap();

    let probe = StateFileCheck::new(&path)
        .poll_interval(SHORT)
        .start(Duration::from_secs(5));
    assert_eq!(probe.wait().await, HealthOutcome::Ready);
}

#[tokio::test]
async fn state_file_becomes_ready_after_update() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, r#"{"state": "STARTING"}"#).unwrap();

    let probe = StateFileCheck::new(&path)
        .poll_interval(SHORT)
        .start(Duration::from_secs(5));

    tokio::time::sleep(Duration::from_millis(120)).await;
    std::fs::write(&path, r#"{"state": "RUNNING"}"#).unwrap();

    assert_eq!(probe.wait().await, HealthOutcome::Ready);
}

#[tokio::test]
async fn missing_state_file_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let probe = StateFileCheck::new(dir.path().join("never-written.json"))
        .poll_interval(SHORT)
        .start(Duration::from_millis(300));
    assert_eq!(probe.wait().await, HealthOutcome::TimedOut);
}

#[tokio::test]
async fn corrupt_state_file_is_not_ready() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, "{not json").unwrap();

    let probe = StateFileCheck::new(&path)
        .poll_interval(SHORT)
        .start(Duration::from_millis(300));
    assert_eq!(probe.wait().await, HealthOutcome::TimedOut);
}

#[tokio::test]
async fn state_file_stop_resolves_to_stopped() {
    let dir = tempfile::tempdir().unwrap();
    let probe = StateFileCheck::new(dir.path().join("absent.json"))
        .poll_interval(SHORT)
        .start(Duration::from_secs(60));
    probe.stop();
    assert_eq!(probe.wait().await, HealthOutcome::Stopped);
}
