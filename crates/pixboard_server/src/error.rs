//! Error types for the canvas server.

use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the canvas server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    /// Grid or palette error.
    #[error("canvas error: {0}")]
    Core(#[from] pixboard_core::CoreError),

    /// Key/value or history backend error.
    #[error("storage error: {0}")]
    Storage(#[from] pixboard_storage::StorageError),

    /// Frame encoding or decoding error.
    #[error("protocol error: {0}")]
    Protocol(#[from] pixboard_protocol::ProtocolError),

    /// A stored snapshot does not fit the configured grid.
    #[error("snapshot under {key:?} has {actual} bytes, expected {expected}")]
    SnapshotMismatch {
        /// Key the snapshot was read from.
        key: String,
        /// Expected length (width * height).
        expected: usize,
        /// Length found in the store.
        actual: usize,
    },

    /// A listener could not be bound.
    #[error("cannot bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: std::net::SocketAddr,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The placement store could not be reached at boot.
    #[error("placement store unreachable at boot: {0}")]
    StoreUnreachable(String),

    /// The canvas hub task has stopped.
    #[error("canvas hub is not running")]
    HubClosed,

    /// A remote publisher was refused by the event listener.
    #[error("event rejected: {0}")]
    EventRejected(String),

    /// WebSocket transport error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// A blocking backend call panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Returns true if this error should stop the process.
    ///
    /// Only startup failures are fatal; everything else degrades the
    /// subsystem that hit it.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ServerError::Config(_) | ServerError::Bind { .. } | ServerError::StoreUnreachable(_)
        )
    }
}

impl From<tokio::task::JoinError> for ServerError {
    fn from(err: tokio::task::JoinError) -> Self {
        ServerError::Task(err.to_string())
    }
}
