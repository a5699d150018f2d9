//! Out-of-band notification sink.

use tracing::info;

/// Fire-and-forget destination for operational notices.
///
/// Implementations must not block; a lost line is acceptable.
pub trait NotificationSink: Send + Sync {
    /// Records one line.
    fn notify(&self, line: &str);
}

/// Sink that writes notices to the `pixboard::notify` tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, line: &str) {
        info!(target: "pixboard::notify", "{line}");
    }
}
