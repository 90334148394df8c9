//! In-process mock AMI server for integration tests

#![allow(dead_code)]

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use ami_manager::{ConnectionState, Manager, ManagerConfig};

/// Bind an ephemeral listener and build a config pointing at it, with
/// delays shortened for test turnaround.
pub async fn bind() -> (TcpListener, ManagerConfig) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let config = ManagerConfig::new("127.0.0.1", "admin", "hunter2")
        .with_port(port)
        .with_reconnect_delay(Duration::from_millis(50))
        .with_action_timeout(Duration::from_secs(5));
    (listener, config)
}

/// One accepted mock-server connection. Dropping it closes the transport.
pub struct MockAmi {
    stream: TcpStream,
    buf: Vec<u8>,
}

impl MockAmi {
    /// Accept a connection and send the protocol greeting banner
    pub async fn accept(listener: &TcpListener) -> Self {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream
            .write_all(b"Asterisk Call Manager/5.0.1\r\n")
            .await
            .unwrap();
        Self {
            stream,
            buf: Vec::new(),
        }
    }

    /// Accept a connection and complete the login handshake
    pub async fn accept_and_login(listener: &TcpListener) -> Self {
        let mut server = Self::accept(listener).await;
        let frame = server.read_frame().await;
        assert_eq!(frame.header("Action"), Some("Login"));
        assert_eq!(frame.header("Username"), Some("admin"));
        assert_eq!(frame.header("Secret"), Some("hunter2"));
        let id = frame.action_id();
        server.send_success(id).await;
        server
    }

    /// Read one inbound action frame
    pub async fn read_frame(&mut self) -> Frame {
        loop {
            if let Some(pos) = find(&self.buf, b"\r\n\r\n") {
                let frame: Vec<u8> = self.buf.drain(..pos + 4).collect();
                let text = String::from_utf8(frame[..pos].to_vec()).unwrap();
                let headers = text
                    .split("\r\n")
                    .filter_map(|line| line.split_once(": "))
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect();
                return Frame { headers };
            }
            let mut chunk = [0u8; 4096];
            let n = self.stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client closed the connection");
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }

    pub async fn send_success(&mut self, id: u64) {
        self.send_raw(format!("Response: Success\r\nActionID: {id}\r\n\r\n").as_bytes())
            .await;
    }

    pub async fn send_error(&mut self, id: u64, message: &str) {
        self.send_raw(
            format!("Response: Error\r\nActionID: {id}\r\nMessage: {message}\r\n\r\n").as_bytes(),
        )
        .await;
    }

    pub async fn send_event(&mut self, name: &str, extra: &[(&str, &str)]) {
        let mut frame = format!("Event: {name}\r\n");
        for (key, value) in extra {
            frame.push_str(&format!("{key}: {value}\r\n"));
        }
        frame.push_str("\r\n");
        self.send_raw(frame.as_bytes()).await;
    }
}

/// Headers of one action frame as read by the mock server
pub struct Frame {
    headers: Vec<(String, String)>,
}

impl Frame {
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn action_id(&self) -> u64 {
        self.header("ActionID").unwrap().parse().unwrap()
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Block until the manager reaches `state`, with a hard test deadline
pub async fn wait_for_state(manager: &Manager, state: ConnectionState) {
    let mut rx = manager.state_changes();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == state))
        .await
        .expect("timed out waiting for connection state")
        .expect("state channel closed");
}
