//! The canvas hub: the one task that owns canvas state.
//!
//! Grid, palette, counter and connection registry live inside [`Hub`] and
//! are touched only by its run loop. Connection tasks, the event bus and
//! timers talk to it through [`HubHandle`], which wraps an unbounded command
//! channel. Commands are handled strictly in arrival order, so placements
//! from one connection are applied in order and broadcasts go out in
//! application order.
//!
//! Backend I/O never happens on the hub: snapshot saves go to the
//! [`SnapshotWriter`] and queued placements to the [`QueueWriter`].

use crate::error::{ServerError, ServerResult};
use crate::notify::NotificationSink;
use crate::persistence::SnapshotWriter;
use crate::pipeline::{validate, Canvas};
use crate::queue::QueueWriter;
use crate::registry::{ConnectionId, ConnectionRegistry};
use crate::scheduler::SingleFlight;
use pixboard_core::Color;
use pixboard_protocol::{
    encode_server, timestamp_ms, AdminEvent, AuthRequest, CanvasClearEvent, ClientMessage,
    LinkEvent, LinkedNotice, PlacePixel, ServerMessage,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// An encoded server frame, shared between all recipients of a broadcast.
pub type Frame = Arc<str>;

/// Sending side of a connection's outgoing frame queue.
///
/// The hub never waits on an outbox: a connection whose queue is full is
/// detached, which closes its outbox.
pub type Outbox = mpsc::Sender<Frame>;

/// Point-in-time counters of the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HubStats {
    /// Attached connections.
    pub connections: usize,
    /// Distinct identities with live connections.
    pub identities: usize,
    /// Placements accepted so far.
    pub total_pixels: u64,
    /// Palette entries in use.
    pub palette_len: usize,
    /// Chunks changed since the last checkpoint.
    pub dirty_chunks: usize,
}

enum Command {
    Attach {
        conn: ConnectionId,
        outbox: Outbox,
    },
    Detach(ConnectionId),
    Client(ConnectionId, ClientMessage),
    Admin(AdminEvent),
    Checkpoint,
    Stats(oneshot::Sender<HubStats>),
    Shutdown(oneshot::Sender<()>),
}

/// Cloneable handle for sending commands to the hub.
#[derive(Debug, Clone)]
pub struct HubHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl HubHandle {
    fn send(&self, command: Command) -> ServerResult<()> {
        self.tx.send(command).map_err(|_| ServerError::HubClosed)
    }

    /// Attaches a connection. The hub replies on `outbox` with `init`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::HubClosed`] if the hub has stopped.
    pub fn attach(&self, conn: ConnectionId, outbox: Outbox) -> ServerResult<()> {
        self.send(Command::Attach { conn, outbox })
    }

    /// Detaches a connection and forgets its identities.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::HubClosed`] if the hub has stopped.
    pub fn detach(&self, conn: ConnectionId) -> ServerResult<()> {
        self.send(Command::Detach(conn))
    }

    /// Delivers a decoded client frame.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::HubClosed`] if the hub has stopped.
    pub fn client(&self, conn: ConnectionId, message: ClientMessage) -> ServerResult<()> {
        self.send(Command::Client(conn, message))
    }

    /// Delivers an administrative event.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::HubClosed`] if the hub has stopped.
    pub fn admin(&self, event: AdminEvent) -> ServerResult<()> {
        self.send(Command::Admin(event))
    }

    /// Saves the canvas now if anything changed since the last save.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::HubClosed`] if the hub has stopped.
    pub fn checkpoint(&self) -> ServerResult<()> {
        self.send(Command::Checkpoint)
    }

    /// Returns current counters.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::HubClosed`] if the hub has stopped.
    pub async fn stats(&self) -> ServerResult<HubStats> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Stats(reply))?;
        rx.await.map_err(|_| ServerError::HubClosed)
    }

    /// Stops the hub after a final save and waits until pending snapshot
    /// and queue writes are done.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::HubClosed`] if the hub had already stopped.
    pub async fn shutdown(&self) -> ServerResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Shutdown(reply))?;
        rx.await.map_err(|_| ServerError::HubClosed)
    }

    /// Returns true once the hub has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Settings the hub needs from the server configuration.
#[derive(Debug, Clone)]
pub struct HubSettings {
    /// Fallback default color for wipes with an unusable color.
    pub default_color: Color,
    /// Whether placements without identity are accepted.
    pub allow_anonymous: bool,
    /// Delay of the debounced snapshot save.
    pub save_debounce: Duration,
    /// Whether checkpoints include the legacy string grid.
    pub write_legacy: bool,
}

struct ConnectionEntry {
    outbox: Outbox,
    session: Uuid,
    user_id: Option<String>,
    client_token: Option<String>,
}

/// The owner task. Create with [`Hub::new`] and drive with [`Hub::run`].
pub struct Hub {
    settings: HubSettings,
    canvas: Canvas,
    registry: ConnectionRegistry,
    connections: HashMap<ConnectionId, ConnectionEntry>,
    snapshots: SnapshotWriter,
    queue: QueueWriter,
    notifier: Arc<dyn NotificationSink>,
    saves: SingleFlight,
    rx: mpsc::UnboundedReceiver<Command>,
    loopback: mpsc::WeakUnboundedSender<Command>,
}

impl Hub {
    /// Creates a hub and the handle that reaches it.
    pub fn new(
        settings: HubSettings,
        canvas: Canvas,
        snapshots: SnapshotWriter,
        queue: QueueWriter,
        notifier: Arc<dyn NotificationSink>,
    ) -> (Self, HubHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let hub = Self {
            settings,
            canvas,
            registry: ConnectionRegistry::new(),
            connections: HashMap::new(),
            snapshots,
            queue,
            notifier,
            saves: SingleFlight::new(),
            rx,
            loopback: tx.downgrade(),
        };
        (hub, HubHandle { tx })
    }

    /// Processes commands until shutdown is requested or every handle is
    /// dropped, then saves once more and drains the writers.
    pub async fn run(mut self) {
        let mut reply = None;
        while let Some(command) = self.rx.recv().await {
            match command {
                Command::Attach { conn, outbox } => self.attach(conn, outbox),
                Command::Detach(conn) => self.detach(conn),
                Command::Client(conn, message) => self.handle_client(conn, message),
                Command::Admin(event) => self.handle_admin(event),
                Command::Checkpoint => self.checkpoint(false),
                Command::Stats(tx) => {
                    let _ = tx.send(self.stats());
                }
                Command::Shutdown(tx) => {
                    reply = Some(tx);
                    break;
                }
            }
        }

        info!(
            total_pixels = self.canvas.total_pixels(),
            connections = self.connections.len(),
            "canvas hub stopping"
        );
        self.checkpoint(true);
        // closes every outbox, which ends the connection writers
        self.connections.clear();

        let Hub {
            snapshots, queue, ..
        } = self;
        snapshots.close().await;
        queue.close().await;

        if let Some(tx) = reply {
            let _ = tx.send(());
        }
    }

    fn stats(&self) -> HubStats {
        HubStats {
            connections: self.connections.len(),
            identities: self.registry.identity_count(),
            total_pixels: self.canvas.total_pixels(),
            palette_len: self.canvas.palette().len(),
            dirty_chunks: self.canvas.dirty_chunks(),
        }
    }

    fn attach(&mut self, conn: ConnectionId, outbox: Outbox) {
        let session = Uuid::new_v4();
        info!(%conn, %session, "connection attached");

        let init = ServerMessage::Init(self.canvas.init_payload(timestamp_ms()));
        if let Some(frame) = encode(&init) {
            let _ = outbox.try_send(frame);
        }
        self.connections.insert(
            conn,
            ConnectionEntry {
                outbox,
                session,
                user_id: None,
                client_token: None,
            },
        );
    }

    fn detach(&mut self, conn: ConnectionId) {
        let identities = self.registry.unregister(conn);
        if let Some(entry) = self.connections.remove(&conn) {
            info!(%conn, session = %entry.session, identities, "connection detached");
        }
    }

    fn handle_client(&mut self, conn: ConnectionId, message: ClientMessage) {
        match message {
            ClientMessage::PlacePixel(request) => self.place(conn, request),
            ClientMessage::Auth(auth) => self.authenticate(conn, auth),
            ClientMessage::RequestInit => {
                let init = ServerMessage::Init(self.canvas.init_payload(timestamp_ms()));
                self.send_to(conn, &init);
            }
            ClientMessage::Ping => self.send_to(conn, &ServerMessage::Pong),
        }
    }

    fn place(&mut self, conn: ConnectionId, request: PlacePixel) {
        let fallback = self
            .connections
            .get(&conn)
            .and_then(|entry| entry.user_id.as_deref());
        let placement = match validate(
            request,
            self.canvas.dimensions(),
            self.canvas.palette(),
            fallback,
            self.settings.allow_anonymous,
        ) {
            Ok(placement) => placement,
            Err(rejection) => {
                debug!(%conn, %rejection, "placement dropped");
                return;
            }
        };

        let applied = match self.canvas.apply(&placement, timestamp_ms()) {
            Ok(Some(applied)) => applied,
            Ok(None) => return,
            Err(err) => {
                debug!(%conn, error = %err, "placement dropped");
                return;
            }
        };

        self.queue.submit(applied.record);
        self.broadcast(&ServerMessage::UpdatePixel(applied.update));
        self.schedule_save();
    }

    fn authenticate(&mut self, conn: ConnectionId, auth: AuthRequest) {
        let Some(entry) = self.connections.get_mut(&conn) else {
            return;
        };

        let AuthRequest {
            user_id,
            discord_id,
            client_token,
        } = auth;
        let user_id = user_id.filter(|id| !id.is_empty());
        let discord_id = discord_id.filter(|id| !id.is_empty());
        let client_token = client_token.filter(|token| !token.is_empty());

        if user_id.is_some() {
            entry.user_id.clone_from(&user_id);
        }
        if client_token.is_some() {
            entry.client_token.clone_from(&client_token);
        }

        let mut registered = 0;
        for identity in [user_id, discord_id, client_token].into_iter().flatten() {
            if self.registry.register(&identity, conn) {
                registered += 1;
            }
        }
        debug!(%conn, registered, "connection authenticated");
    }

    fn handle_admin(&mut self, event: AdminEvent) {
        match event {
            AdminEvent::Logout(logout) => {
                let conns = self.registry.lookup(&logout.user_id);
                for conn in &conns {
                    self.send_to(*conn, &ServerMessage::Logout);
                }
                info!(user = %logout.user_id, connections = conns.len(), "forced logout");
            }
            AdminEvent::Link(link) => self.link(link),
            AdminEvent::CanvasClear(clear) => self.wipe(clear),
        }
    }

    fn link(&mut self, link: LinkEvent) {
        let conns = self.registry.lookup_any(
            link.client_token
                .as_deref()
                .into_iter()
                .chain([link.user_id.as_str()]),
        );

        let ts = timestamp_ms();
        for conn in &conns {
            let registered_token = self
                .connections
                .get(conn)
                .and_then(|entry| entry.client_token.clone());
            let notice = ServerMessage::Linked(LinkedNotice {
                ts,
                client_token: link.client_token.clone().or(registered_token),
                for_discord_id: link.user_id.clone(),
            });
            self.send_to(*conn, &notice);
        }
        info!(user = %link.user_id, connections = conns.len(), "account link notified");
    }

    fn wipe(&mut self, clear: CanvasClearEvent) {
        let dims = self.canvas.dimensions();
        if clear.width != dims.width || clear.height != dims.height {
            warn!(
                requested = %format!("{}x{}", clear.width, clear.height),
                actual = %dims,
                "canvas-clear dimensions differ, keeping the running grid size"
            );
        }
        let default = match Color::parse(&clear.default_color) {
            Ok(color) => color,
            Err(err) => {
                warn!(color = %clear.default_color, error = %err, "canvas-clear color invalid, using configured default");
                self.settings.default_color.clone()
            }
        };

        let cleared = match self.canvas.wipe(default, clear.admin_id.clone(), clear.timestamp) {
            Ok(cleared) => cleared,
            Err(err) => {
                warn!(error = %err, "canvas wipe failed");
                return;
            }
        };

        self.broadcast(&ServerMessage::CanvasClear(cleared));
        self.checkpoint(true);

        let by = clear.admin_id.as_deref().unwrap_or("unknown");
        info!(admin = by, %dims, "canvas wiped");
        self.notifier
            .notify(&format!("Canvas {dims} cleared by {by}"));
    }

    fn schedule_save(&self) {
        let loopback = self.loopback.clone();
        self.saves.schedule(self.settings.save_debounce, move || {
            if let Some(tx) = loopback.upgrade() {
                let _ = tx.send(Command::Checkpoint);
            }
        });
    }

    /// Submits a checkpoint if any chunk changed, or always when `force`.
    fn checkpoint(&mut self, force: bool) {
        let dirty = self.canvas.take_dirty();
        if dirty == 0 && !force {
            return;
        }
        debug!(dirty, force, "checkpoint");
        self.snapshots
            .submit(self.canvas.checkpoint(self.settings.write_legacy));
    }

    fn send_to(&mut self, conn: ConnectionId, message: &ServerMessage) {
        let Some(entry) = self.connections.get(&conn) else {
            return;
        };
        let Some(frame) = encode(message) else {
            return;
        };
        let sent = entry.outbox.try_send(frame);
        match sent {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => self.drop_slow(conn, message),
            Err(TrySendError::Closed(_)) => {
                debug!(%conn, kind = message.type_name(), "send to closed connection");
            }
        }
    }

    fn broadcast(&mut self, message: &ServerMessage) {
        let Some(frame) = encode(message) else {
            return;
        };
        let mut slow = Vec::new();
        for (conn, entry) in &self.connections {
            match entry.outbox.try_send(Arc::clone(&frame)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => slow.push(*conn),
                Err(TrySendError::Closed(_)) => {
                    debug!(%conn, kind = message.type_name(), "broadcast to closed connection");
                }
            }
        }
        for conn in slow {
            self.drop_slow(conn, message);
        }
    }

    fn drop_slow(&mut self, conn: ConnectionId, message: &ServerMessage) {
        warn!(%conn, kind = message.type_name(), "outbox full, dropping slow connection");
        self.detach(conn);
    }
}

fn encode(message: &ServerMessage) -> Option<Frame> {
    match encode_server(message) {
        Ok(text) => Some(Arc::from(text)),
        Err(err) => {
            warn!(kind = message.type_name(), error = %err, "cannot encode frame");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::TracingSink;
    use crate::persistence::GridStore;
    use crate::queue::DurableQueue;
    use pixboard_core::{Grid, Palette};
    use pixboard_protocol::{decode_server, LogoutEvent};
    use pixboard_storage::{InMemoryBackend, KvBackend};

    struct Fixture {
        handle: HubHandle,
        backend: Arc<InMemoryBackend>,
    }

    fn start(width: u32, height: u32) -> Fixture {
        let backend = Arc::new(InMemoryBackend::new());
        let kv = Arc::clone(&backend) as Arc<dyn KvBackend>;
        let store = Arc::new(GridStore::new(Arc::clone(&kv), "grid"));
        let queue = Arc::new(DurableQueue::new(kv, "queue"));
        let white = Color::parse("#FFFFFF").unwrap();
        let canvas = Canvas::new(
            Grid::new(width, height).unwrap(),
            Palette::new(white.clone()),
            0,
        );
        let (hub, handle) = Hub::new(
            HubSettings {
                default_color: white,
                allow_anonymous: true,
                save_debounce: Duration::from_secs(60),
                write_legacy: false,
            },
            canvas,
            SnapshotWriter::spawn(store),
            QueueWriter::spawn(queue),
            Arc::new(TracingSink),
        );
        tokio::spawn(hub.run());
        Fixture { handle, backend }
    }

    fn connect(handle: &HubHandle) -> (ConnectionId, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(64);
        let conn = ConnectionId::next();
        handle.attach(conn, tx).unwrap();
        (conn, rx)
    }

    async fn next(rx: &mut mpsc::Receiver<Frame>) -> ServerMessage {
        let frame = rx.recv().await.unwrap();
        decode_server(&frame).unwrap()
    }

    #[tokio::test]
    async fn attach_sends_init() {
        let fixture = start(3, 2);
        let (_, mut rx) = connect(&fixture.handle);
        let ServerMessage::Init(init) = next(&mut rx).await else {
            panic!("expected init");
        };
        assert_eq!((init.width, init.height), (3, 2));
        assert_eq!(init.grid.len(), 6);
        assert_eq!(init.total_pixels, 0);
    }

    #[tokio::test]
    async fn ping_gets_pong() {
        let fixture = start(2, 2);
        let (conn, mut rx) = connect(&fixture.handle);
        next(&mut rx).await;
        fixture.handle.client(conn, ClientMessage::Ping).unwrap();
        assert_eq!(next(&mut rx).await, ServerMessage::Pong);
    }

    #[tokio::test]
    async fn logout_reaches_every_tab() {
        let fixture = start(2, 2);
        let (a, mut rx_a) = connect(&fixture.handle);
        let (b, mut rx_b) = connect(&fixture.handle);
        next(&mut rx_a).await;
        next(&mut rx_b).await;

        for conn in [a, b] {
            fixture
                .handle
                .client(
                    conn,
                    ClientMessage::Auth(AuthRequest {
                        user_id: Some("u1".into()),
                        ..AuthRequest::default()
                    }),
                )
                .unwrap();
        }
        fixture
            .handle
            .admin(AdminEvent::Logout(LogoutEvent {
                user_id: "u1".into(),
            }))
            .unwrap();

        assert_eq!(next(&mut rx_a).await, ServerMessage::Logout);
        assert_eq!(next(&mut rx_b).await, ServerMessage::Logout);
    }

    #[tokio::test]
    async fn stats_track_connections() {
        let fixture = start(2, 2);
        let (a, _rx_a) = connect(&fixture.handle);
        let (_b, _rx_b) = connect(&fixture.handle);
        fixture
            .handle
            .client(
                a,
                ClientMessage::Auth(AuthRequest {
                    user_id: Some("u1".into()),
                    discord_id: Some("d1".into()),
                    client_token: None,
                }),
            )
            .unwrap();

        let stats = fixture.handle.stats().await.unwrap();
        assert_eq!(stats.connections, 2);
        assert_eq!(stats.identities, 2);
        assert_eq!(stats.palette_len, 1);

        fixture.handle.detach(a).unwrap();
        let stats = fixture.handle.stats().await.unwrap();
        assert_eq!(stats.connections, 1);
        assert_eq!(stats.identities, 0);
    }

    #[tokio::test]
    async fn full_outbox_drops_the_connection() {
        let fixture = start(4, 4);
        let (slow_tx, mut slow_rx) = mpsc::channel(2);
        let slow = ConnectionId::next();
        fixture.handle.attach(slow, slow_tx).unwrap();
        fixture
            .handle
            .client(
                slow,
                ClientMessage::Auth(AuthRequest {
                    user_id: Some("slow".into()),
                    ..AuthRequest::default()
                }),
            )
            .unwrap();

        let (fast, mut fast_rx) = connect(&fixture.handle);
        next(&mut fast_rx).await;
        for x in 0..3 {
            fixture
                .handle
                .client(fast, ClientMessage::PlacePixel(PlacePixel::new(x, 0, "#FF0000")))
                .unwrap();
        }
        for _ in 0..3 {
            assert!(matches!(next(&mut fast_rx).await, ServerMessage::UpdatePixel(_)));
        }

        let stats = fixture.handle.stats().await.unwrap();
        assert_eq!(stats.connections, 1);
        assert_eq!(stats.identities, 0);

        // The backlog is delivered, then the outbox is closed
        assert!(matches!(next(&mut slow_rx).await, ServerMessage::Init(_)));
        assert!(matches!(next(&mut slow_rx).await, ServerMessage::UpdatePixel(_)));
        assert!(slow_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn shutdown_saves_and_closes_outboxes() {
        let fixture = start(2, 2);
        let (conn, mut rx) = connect(&fixture.handle);
        next(&mut rx).await;
        fixture
            .handle
            .client(
                conn,
                ClientMessage::PlacePixel(PlacePixel::new(1, 1, "#000000")),
            )
            .unwrap();

        fixture.handle.shutdown().await.unwrap();
        assert!(matches!(next(&mut rx).await, ServerMessage::UpdatePixel(_)));
        assert!(rx.recv().await.is_none());

        assert_eq!(fixture.backend.get("grid").unwrap(), Some(vec![0, 0, 0, 1]));
        assert_eq!(fixture.backend.list_len("queue").unwrap(), 1);
        assert!(fixture.handle.is_closed() || fixture.handle.stats().await.is_err());
    }
}
