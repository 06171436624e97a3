//! Output observer hook

use std::sync::Arc;

/// Metrics callback invoked after each successful publish.
///
/// Fire-and-forget; implementations must not block.
pub trait OutputObserver: Send + Sync {
    /// A batch carrying `event_count` events was published
    fn record_batch_sent(&self, event_count: usize);
}

impl<T: OutputObserver + ?Sized> OutputObserver for Arc<T> {
    fn record_batch_sent(&self, event_count: usize) {
        (**self).record_batch_sent(event_count);
    }
}

/// Observer that discards every notification
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl OutputObserver for NoopObserver {
    fn record_batch_sent(&self, _event_count: usize) {}
}
