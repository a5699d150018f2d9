//! Cross-process administrative event channel.
//!
//! Inside the process, [`EventBus`] fans [`AdminEvent`]s out to every
//! subscriber. Other processes reach the bus through [`EventListener`], a
//! TCP endpoint that accepts one JSON event per line and answers each line
//! with `ok` or `error: <reason>`. [`publish_remote`] is the client side.

use crate::error::{ServerError, ServerResult};
use pixboard_protocol::{decode_event, encode_event, AdminEvent, MAX_EVENT_LINE_LEN};
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

/// Default number of events a slow subscriber may fall behind.
pub const DEFAULT_BUS_CAPACITY: usize = 64;

/// In-process publish/subscribe bus for admin events.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AdminEvent>,
}

impl EventBus {
    /// Creates a bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event. Returns how many subscribers will see it.
    pub fn publish(&self, event: AdminEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Subscribes to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<AdminEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

/// TCP endpoint feeding events from other processes into an [`EventBus`].
#[derive(Debug)]
pub struct EventListener {
    listener: TcpListener,
    bus: EventBus,
}

impl EventListener {
    /// Binds the endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address is unavailable.
    pub async fn bind(addr: SocketAddr, bus: EventBus) -> ServerResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        Ok(Self { listener, bus })
    }

    /// Returns the bound address.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket has no local address.
    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts publishers until `shutdown` turns true.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        if let Ok(addr) = self.listener.local_addr() {
            info!(%addr, "admin event listener started");
        }

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let bus = self.bus.clone();
                        tokio::spawn(async move {
                            if let Err(err) = serve_publisher(stream, &bus).await {
                                debug!(%peer, error = %err, "publisher connection ended");
                            }
                        });
                    }
                    Err(err) => warn!(error = %err, "admin accept failed"),
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("admin event listener stopped");
    }
}

async fn serve_publisher(stream: TcpStream, bus: &EventBus) -> ServerResult<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    loop {
        line.clear();
        let read = (&mut reader)
            .take(MAX_EVENT_LINE_LEN as u64 + 1)
            .read_line(&mut line)
            .await?;
        if read == 0 {
            return Ok(());
        }
        if line.trim().is_empty() {
            continue;
        }

        let reply = match decode_event(&line) {
            Ok(event) => {
                info!(topic = event.topic(), "admin event received");
                bus.publish(event);
                "ok\n".to_string()
            }
            Err(err) => {
                debug!(error = %err, "rejected admin event");
                format!("error: {err}\n")
            }
        };
        write_half.write_all(reply.as_bytes()).await?;

        // an oversized line was cut short; the rest of the stream is garbage
        if read > MAX_EVENT_LINE_LEN {
            return Ok(());
        }
    }
}

/// Publishes one event to a running server's [`EventListener`].
///
/// # Errors
///
/// Returns [`ServerError::EventRejected`] if the server refused the event,
/// or an I/O error if it could not be reached.
pub async fn publish_remote(addr: SocketAddr, event: &AdminEvent) -> ServerResult<()> {
    let mut line = encode_event(event)?;
    line.push('\n');

    let stream = TcpStream::connect(addr).await?;
    let (read_half, mut write_half) = stream.into_split();
    write_half.write_all(line.as_bytes()).await?;
    write_half.flush().await?;

    let mut reply = String::new();
    BufReader::new(read_half).read_line(&mut reply).await?;
    match reply.trim() {
        "ok" => Ok(()),
        "" => Err(ServerError::EventRejected("connection closed".into())),
        other => Err(ServerError::EventRejected(
            other.trim_start_matches("error: ").to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixboard_protocol::{LinkEvent, LogoutEvent};

    fn logout(user: &str) -> AdminEvent {
        AdminEvent::Logout(LogoutEvent {
            user_id: user.into(),
        })
    }

    #[tokio::test]
    async fn bus_fans_out() {
        let bus = EventBus::default();
        assert_eq!(bus.publish(logout("nobody")), 0);

        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        assert_eq!(bus.publish(logout("u1")), 2);
        assert_eq!(a.recv().await.unwrap(), logout("u1"));
        assert_eq!(b.recv().await.unwrap(), logout("u1"));
    }

    #[tokio::test]
    async fn remote_publish_reaches_bus() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let listener = EventListener::bind("127.0.0.1:0".parse().unwrap(), bus.clone())
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        let (_stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(listener.run(stop_rx));

        let event = AdminEvent::Link(LinkEvent {
            user_id: "d1".into(),
            client_token: Some("tok".into()),
        });
        publish_remote(addr, &event).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn malformed_line_is_refused() {
        let bus = EventBus::default();
        let listener = EventListener::bind("127.0.0.1:0".parse().unwrap(), bus)
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        let (_stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(listener.run(stop_rx));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"{\"topic\":\"nope\"}\n").await.unwrap();
        let mut reply = String::new();
        BufReader::new(stream).read_line(&mut reply).await.unwrap();
        assert!(reply.starts_with("error:"));
    }
}
