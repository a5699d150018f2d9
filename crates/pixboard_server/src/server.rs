//! WebSocket server.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::events::{EventBus, EventListener};
use crate::flush::FlushWorker;
use crate::hub::{Frame, Hub, HubHandle, HubSettings};
use crate::notify::{NotificationSink, TracingSink};
use crate::persistence::{GridStore, SnapshotWriter};
use crate::pipeline::Canvas;
use crate::queue::{DurableQueue, QueueWriter};
use crate::registry::ConnectionId;
use futures_util::{SinkExt, StreamExt};
use pixboard_core::Grid;
use pixboard_protocol::{decode_client, AdminEvent};
use pixboard_storage::{InMemoryBackend, InMemoryPlacementStore, KvBackend, PlacementStore};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// External collaborators of the server.
#[derive(Clone)]
pub struct Backends {
    /// Key/value store for the snapshot, legacy grid and durable queue.
    pub kv: Arc<dyn KvBackend>,
    /// Placement history store.
    pub store: Arc<dyn PlacementStore>,
    /// Operational notices.
    pub notifier: Arc<dyn NotificationSink>,
}

impl Backends {
    /// Bundles the given backends with a [`TracingSink`] notifier.
    pub fn new(kv: Arc<dyn KvBackend>, store: Arc<dyn PlacementStore>) -> Self {
        Self {
            kv,
            store,
            notifier: Arc::new(TracingSink),
        }
    }

    /// Ephemeral in-memory backends.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryBackend::new()),
            Arc::new(InMemoryPlacementStore::new()),
        )
    }

    /// Replaces the notifier.
    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }
}

impl std::fmt::Debug for Backends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backends").finish_non_exhaustive()
    }
}

/// The canvas synchronization server.
///
/// [`bind`](Self::bind) boots the canvas, binds the listeners and starts
/// the hub, so the hub and the event bus are usable right away.
/// [`run`](Self::run) accepts WebSocket clients and runs the flush worker
/// and the admin listener until the shutdown future completes.
///
/// # Example
///
/// ```rust,ignore
/// let config = ServerConfig::from_env()?;
/// let server = PixboardServer::bind(config, Backends::in_memory()).await?;
/// server.run(tokio::signal::ctrl_c()).await?;
/// ```
pub struct PixboardServer {
    config: ServerConfig,
    listener: TcpListener,
    admin: Option<EventListener>,
    hub: HubHandle,
    hub_task: JoinHandle<()>,
    events: EventBus,
    flush: Arc<FlushWorker>,
}

impl PixboardServer {
    /// Boots the canvas from the backends and binds the listeners.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid, the placement store cannot be
    /// counted or a listener cannot be bound. Snapshot problems are not
    /// errors; the canvas then starts empty.
    pub async fn bind(config: ServerConfig, backends: Backends) -> ServerResult<Self> {
        config.validate()?;
        let default_color = config.default_color()?;

        let store = Arc::clone(&backends.store);
        let total_pixels = tokio::task::spawn_blocking(move || store.count_placements())
            .await?
            .map_err(|err| ServerError::StoreUnreachable(err.to_string()))?;

        let grid_store = Arc::new(
            GridStore::new(Arc::clone(&backends.kv), config.grid_key.clone())
                .with_legacy_key(config.legacy_grid_key.clone()),
        );
        let mut grid = Grid::with_chunk_size(config.width, config.height, config.chunk_size)?;
        let recovered = {
            let grid_store = Arc::clone(&grid_store);
            let dims = grid.dimensions();
            let default = default_color.clone();
            tokio::task::spawn_blocking(move || grid_store.recover(dims, &default)).await?
        };
        grid.restore(&recovered.cells)?;
        // restoring marks everything dirty; the stored copy is already current
        grid.drain_dirty_chunks();
        info!(
            source = %recovered.source,
            total_pixels,
            colors = recovered.palette.len(),
            dims = %grid.dimensions(),
            "canvas loaded"
        );

        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.bind_addr,
                source,
            })?;
        let events = EventBus::default();
        let admin = match config.admin_addr {
            Some(addr) => Some(EventListener::bind(addr, events.clone()).await?),
            None => None,
        };

        let queue = Arc::new(DurableQueue::new(
            Arc::clone(&backends.kv),
            config.queue_key.clone(),
        ));
        let flush = Arc::new(FlushWorker::new(
            Arc::clone(&queue),
            Arc::clone(&backends.store),
            config.flush_batch_size,
        ));

        let settings = HubSettings {
            default_color,
            allow_anonymous: config.allow_anonymous,
            save_debounce: config.save_debounce,
            write_legacy: grid_store.writes_legacy(),
        };
        let (hub, handle) = Hub::new(
            settings,
            Canvas::new(grid, recovered.palette, total_pixels),
            SnapshotWriter::spawn(grid_store),
            QueueWriter::spawn(queue),
            Arc::clone(&backends.notifier),
        );
        let hub_task = tokio::spawn(hub.run());
        tokio::spawn(forward_events(events.subscribe(), handle.clone()));

        backends
            .notifier
            .notify(&format!("Canvas server started with {total_pixels} placements"));

        Ok(Self {
            config,
            listener,
            admin,
            hub: handle,
            hub_task,
            events,
            flush,
        })
    }

    /// Returns the WebSocket address.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket has no local address.
    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Returns the admin event address, if enabled.
    pub fn admin_addr(&self) -> Option<SocketAddr> {
        self.admin
            .as_ref()
            .and_then(|admin| admin.local_addr().ok())
    }

    /// Returns a handle to the hub.
    pub fn hub(&self) -> HubHandle {
        self.hub.clone()
    }

    /// Returns the in-process event bus.
    pub fn events(&self) -> EventBus {
        self.events.clone()
    }

    /// Returns the configuration in use.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Serves clients until `shutdown` completes.
    ///
    /// Shutdown stops accepting, closes client connections, saves the
    /// canvas, lets queued placements reach the queue and runs a final
    /// flush.
    ///
    /// # Errors
    ///
    /// Returns an error if the hub task panicked.
    pub async fn run<F>(self, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()>,
    {
        let Self {
            config,
            listener,
            admin,
            hub,
            hub_task,
            events: _events,
            flush,
        } = self;

        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "canvas server listening");
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let (flush_stop_tx, flush_stop_rx) = watch::channel(false);
        if let Some(admin) = admin {
            tokio::spawn(admin.run(stop_rx.clone()));
        }
        let flush_task = tokio::spawn(Arc::clone(&flush).run(config.flush_interval, flush_stop_rx));

        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        connections.spawn(serve_connection(
                            stream,
                            peer,
                            hub.clone(),
                            config.outbox_capacity,
                            stop_rx.clone(),
                        ));
                    }
                    Err(err) => warn!(error = %err, "accept failed"),
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                () = &mut shutdown => break,
            }
        }

        info!("canvas server shutting down");
        drop(listener);
        let _ = stop_tx.send(true);

        if let Err(err) = hub.shutdown().await {
            debug!(error = %err, "hub already stopped");
        }
        hub_task.await?;

        let _ = flush_stop_tx.send(true);
        flush_task.await?;

        while connections.join_next().await.is_some() {}
        info!("canvas server stopped");
        Ok(())
    }
}

impl std::fmt::Debug for PixboardServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixboardServer")
            .field("config", &self.config)
            .field("flush", &self.flush)
            .finish_non_exhaustive()
    }
}

async fn forward_events(mut rx: broadcast::Receiver<AdminEvent>, hub: HubHandle) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                if hub.admin(event).is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "admin events dropped, forwarder lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    hub: HubHandle,
    outbox_capacity: usize,
    mut shutdown: watch::Receiver<bool>,
) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(err) => {
            debug!(%peer, error = %err, "websocket handshake failed");
            return;
        }
    };
    let (mut sink, mut source) = ws.split();

    let conn = ConnectionId::next();
    let (outbox, mut frames) = mpsc::channel::<Frame>(outbox_capacity);
    if hub.attach(conn, outbox).is_err() {
        return;
    }
    debug!(%conn, %peer, "websocket connected");

    let mut writer = tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            if let Err(err) = sink.send(Message::Text(frame.to_string())).await {
                debug!(%conn, error = %err, "websocket send failed");
                break;
            }
        }
        let _ = sink.close().await;
    });

    let mut writer_done = false;
    loop {
        tokio::select! {
            incoming = source.next() => match incoming {
                Some(Ok(Message::Text(text))) => match decode_client(&text) {
                    Ok(message) => {
                        if hub.client(conn, message).is_err() {
                            break;
                        }
                    }
                    Err(err) => debug!(%conn, error = %err, "malformed client frame"),
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    debug!(%conn, error = %err, "websocket read failed");
                    break;
                }
            },
            // the hub dropped this connection's outbox
            finished = &mut writer => {
                writer_done = true;
                if let Err(err) = finished {
                    warn!(%conn, error = %err, "websocket writer failed");
                }
                break;
            }
            _ = shutdown.changed() => break,
        }
    }

    let _ = hub.detach(conn);
    if !writer_done {
        if let Err(err) = writer.await {
            warn!(%conn, error = %err, "websocket writer failed");
        }
    }
    debug!(%conn, %peer, "websocket closed");
}
