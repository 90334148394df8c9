//! Reconnect behavior against a mock AMI server

mod common;

use std::time::Duration;

use tokio::net::TcpListener;

use ami_manager::{Action, ConnectionState, Manager};
use ami_utils::AmiError;
use common::{bind, wait_for_state, MockAmi};

#[tokio::test]
async fn pending_actions_fail_with_connection_lost_on_disconnect() {
    let (listener, config) = bind().await;
    let manager = Manager::connect(config);
    let mut server = MockAmi::accept_and_login(&listener).await;
    wait_for_state(&manager, ConnectionState::Ready).await;

    // Three actions in flight when the transport dies
    let mut clients = Vec::new();
    for _ in 0..3 {
        let manager = manager.clone();
        clients.push(tokio::spawn(async move {
            manager.execute("Ping", &[]).await
        }));
    }
    for _ in 0..3 {
        server.read_frame().await;
    }
    drop(server);

    // All three resolve with ConnectionLost; only then does the test let
    // the supervisor reach Ready on a fresh connection.
    for client in clients {
        let result = client.await.unwrap();
        assert!(matches!(result, Err(AmiError::ConnectionLost)));
    }

    let mut server = MockAmi::accept_and_login(&listener).await;
    wait_for_state(&manager, ConnectionState::Ready).await;

    // The replacement connection serves traffic normally
    let client = tokio::spawn({
        let manager = manager.clone();
        async move { manager.execute("Ping", &[]).await }
    });
    let frame = server.read_frame().await;
    server.send_success(frame.action_id()).await;
    assert!(client.await.unwrap().is_ok());

    manager.shutdown().await;
}

#[tokio::test]
async fn auth_failure_schedules_reconnect() {
    let (listener, config) = bind().await;
    let manager = Manager::connect(config);

    // First attempt: reject the login
    let mut server = MockAmi::accept(&listener).await;
    let frame = server.read_frame().await;
    assert_eq!(frame.header("Action"), Some("Login"));
    server
        .send_error(frame.action_id(), "Authentication failed")
        .await;
    drop(server);

    // The rejection is surfaced as a typed auth failure
    let mut tries = 0;
    while !matches!(
        manager.last_error().as_deref(),
        Some(AmiError::AuthFailure(_))
    ) {
        tries += 1;
        assert!(tries < 250, "auth failure was never recorded");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    // The supervisor treats it as connection failure and retries
    let _server = MockAmi::accept_and_login(&listener).await;
    wait_for_state(&manager, ConnectionState::Ready).await;
    assert!(manager.last_error().is_none());

    manager.shutdown().await;
}

#[tokio::test]
async fn reconnects_after_initial_connect_failure() {
    let (listener, config) = bind().await;
    let addr = listener.local_addr().unwrap();
    drop(listener);

    // Nothing listening yet: the first attempts are refused
    let manager = Manager::connect(config);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!manager.is_ready());

    // Bring the server up on the same port; the fixed-delay retry finds it
    let listener = TcpListener::bind(addr).await.unwrap();
    let _server = MockAmi::accept_and_login(&listener).await;
    wait_for_state(&manager, ConnectionState::Ready).await;

    manager.shutdown().await;
}

#[tokio::test]
async fn shutdown_stops_the_supervisor() {
    let (listener, config) = bind().await;
    let manager = Manager::connect(config);
    let _server = MockAmi::accept_and_login(&listener).await;
    wait_for_state(&manager, ConnectionState::Ready).await;

    manager.shutdown().await;
    assert_eq!(manager.state(), ConnectionState::Disconnected);

    // No reconnect attempts after shutdown; submits are rejected outright
    let result = manager.submit(Action::new("Ping")).await;
    assert!(matches!(result, Err(AmiError::NotConnected)));
}

#[tokio::test]
async fn shutdown_fails_in_flight_actions() {
    let (listener, config) = bind().await;
    let manager = Manager::connect(config);
    let mut server = MockAmi::accept_and_login(&listener).await;
    wait_for_state(&manager, ConnectionState::Ready).await;

    let client = tokio::spawn({
        let manager = manager.clone();
        async move { manager.execute("Ping", &[]).await }
    });
    server.read_frame().await;

    manager.shutdown().await;

    let result = client.await.unwrap();
    assert!(matches!(result, Err(AmiError::ConnectionLost)));
}
