//! Shared helpers for the server integration tests.

#![allow(dead_code)]

use pixboard_protocol::{decode_server, AuthRequest, ClientMessage, ServerMessage};
use pixboard_server::{Backends, ConnectionId, Frame, HubHandle, NotificationSink, ServerConfig};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// How long a test waits for a frame before failing.
pub const FRAME_TIMEOUT: Duration = Duration::from_secs(5);

/// Notification sink that keeps every line.
#[derive(Debug, Default)]
pub struct RecordingSink {
    lines: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, line: &str) {
        self.lines.lock().unwrap().push(line.to_string());
    }
}

/// Loopback config with the admin listener disabled.
pub fn test_config(width: u32, height: u32) -> ServerConfig {
    ServerConfig::new("127.0.0.1:0".parse().unwrap())
        .with_admin_addr(None)
        .with_dimensions(width, height)
        .with_save_debounce(Duration::from_millis(50))
}

/// Backends plus a handle on the recording sink.
pub fn recording_backends() -> (Backends, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let backends = Backends::in_memory().with_notifier(Arc::clone(&sink) as Arc<dyn NotificationSink>);
    (backends, sink)
}

/// A client attached straight to the hub, without a socket.
pub struct TestClient {
    pub conn: ConnectionId,
    rx: mpsc::Receiver<Frame>,
    hub: HubHandle,
}

impl TestClient {
    /// Attaches and consumes the initial `init` frame.
    pub async fn connect(hub: &HubHandle) -> Self {
        let (tx, rx) = mpsc::channel(256);
        let conn = ConnectionId::next();
        hub.attach(conn, tx).unwrap();
        let mut client = Self {
            conn,
            rx,
            hub: hub.clone(),
        };
        assert!(matches!(client.recv().await, ServerMessage::Init(_)));
        client
    }

    pub fn send(&self, message: ClientMessage) {
        self.hub.client(self.conn, message).unwrap();
    }

    pub fn auth(&self, user_id: Option<&str>, discord_id: Option<&str>, client_token: Option<&str>) {
        self.send(ClientMessage::Auth(AuthRequest {
            user_id: user_id.map(str::to_string),
            discord_id: discord_id.map(str::to_string),
            client_token: client_token.map(str::to_string),
        }));
    }

    pub async fn recv(&mut self) -> ServerMessage {
        let frame = tokio::time::timeout(FRAME_TIMEOUT, self.rx.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("outbox closed");
        decode_server(&frame).unwrap()
    }

    /// Sends a ping and asserts that `pong` is the very next frame, proving
    /// nothing else was queued before it.
    pub async fn assert_quiet(&mut self) {
        self.send(ClientMessage::Ping);
        assert_eq!(self.recv().await, ServerMessage::Pong);
    }
}
