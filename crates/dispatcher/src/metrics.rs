//! Output metrics for observability

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use contracts::OutputObserver;

/// In-process counters fed by the workers' observer hook
#[derive(Debug, Default)]
pub struct OutputMetrics {
    /// Total batches published
    batches_sent: AtomicU64,
    /// Total events published
    events_sent: AtomicU64,
}

impl OutputMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Get total published batches
    pub fn batches_sent(&self) -> u64 {
        self.batches_sent.load(Ordering::Relaxed)
    }

    /// Get total published events
    pub fn events_sent(&self) -> u64 {
        self.events_sent.load(Ordering::Relaxed)
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            batches_sent: self.batches_sent(),
            events_sent: self.events_sent(),
        }
    }
}

impl OutputObserver for OutputMetrics {
    fn record_batch_sent(&self, event_count: usize) {
        self.batches_sent.fetch_add(1, Ordering::Relaxed);
        self.events_sent
            .fetch_add(event_count as u64, Ordering::Relaxed);
    }
}

/// Snapshot of output metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub batches_sent: u64,
    pub events_sent: u64,
}

/// Observer forwarding every notification to several observers
#[derive(Default, Clone)]
pub struct FanoutObserver {
    observers: Vec<Arc<dyn OutputObserver>>,
}

impl FanoutObserver {
    /// Create an empty fan-out
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an observer
    pub fn with(mut self, observer: Arc<dyn OutputObserver>) -> Self {
        self.observers.push(observer);
        self
    }
}

impl OutputObserver for FanoutObserver {
    fn record_batch_sent(&self, event_count: usize) {
        for observer in &self.observers {
            observer.record_batch_sent(event_count);
        }
    }
}
