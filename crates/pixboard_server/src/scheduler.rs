//! Single-flight timer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Schedules at most one pending delayed action at a time.
///
/// While an action is pending, further [`schedule`](Self::schedule) calls
/// are no-ops. The pending flag clears just before the action runs, so a
/// request made while the action executes schedules the next one.
///
/// # Example
///
/// ```rust,ignore
/// let saves = SingleFlight::new();
/// saves.schedule(Duration::from_secs(2), move || tx.send(Command::Checkpoint));
/// ```
#[derive(Debug, Clone, Default)]
pub struct SingleFlight {
    pending: Arc<AtomicBool>,
}

impl SingleFlight {
    /// Creates an idle scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true while an action is waiting to run.
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Runs `action` after `delay` unless an action is already pending.
    ///
    /// Returns true if this call scheduled the action. Must be called from
    /// within a Tokio runtime.
    pub fn schedule<F>(&self, delay: Duration, action: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if self
            .pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let pending = Arc::clone(&self.pending);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            pending.store(false, Ordering::Release);
            action();
        });
        true
    }
}
