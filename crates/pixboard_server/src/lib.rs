//! # Pixboard Server
//!
//! Real-time synchronization server for the Pixboard shared canvas.
//!
//! This crate provides:
//! - The canvas hub, the single task that owns grid, palette and counter
//! - Placement validation and broadcast to every WebSocket client
//! - Debounced snapshot persistence with a legacy string-grid dual write
//! - A durable placement queue and the flush worker draining it into the
//!   placement history store
//! - The administrative event channel (wipe, forced logout, account link)
//!
//! # Architecture
//!
//! ```text
//!  client ──ws──▶ connection task ──▶ HubHandle ──▶ Hub (owner task)
//!                                                    │  ├─▶ SnapshotWriter ─▶ KvBackend
//!  admin process ──tcp──▶ EventListener ─▶ EventBus ─┘  ├─▶ QueueWriter ────▶ KvBackend list
//!                                                       └─▶ outboxes ───────▶ clients
//!  FlushWorker: KvBackend list ─▶ PlacementStore (one transaction per batch)
//! ```
//!
//! Backends are never called from the hub itself, so a slow store only
//! delays its own subsystem.
//!
//! # Protocol
//!
//! 1. A client connects and immediately receives `init` with the full grid
//! 2. It may send `auth` to register its identities
//! 3. Each `placePixel` that changes a cell is broadcast as `updatePixel`
//! 4. `requestInit` resends the grid after a suspected desync

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code must not panic; errors are logged or propagated
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod events;
mod flush;
mod hub;
mod legacy;
mod notify;
mod persistence;
mod pipeline;
mod queue;
mod registry;
mod scheduler;
mod server;

pub use config::{ConfigError, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use events::{publish_remote, EventBus, EventListener, DEFAULT_BUS_CAPACITY};
pub use flush::{FlushOutcome, FlushWorker};
pub use hub::{Frame, Hub, HubHandle, HubSettings, HubStats, Outbox};
pub use legacy::LegacyGridShim;
pub use notify::{NotificationSink, TracingSink};
pub use persistence::{GridCheckpoint, GridStore, RecoveredCanvas, RecoverySource, SnapshotWriter};
pub use pipeline::{validate, Applied, Canvas, Placement, Rejection};
pub use queue::{DurableQueue, QueueWriter};
pub use registry::{ConnectionId, ConnectionRegistry};
pub use scheduler::SingleFlight;
pub use server::{Backends, PixboardServer};
