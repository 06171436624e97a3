//! Delivery metrics
//!
//! Prometheus counters for the output stage plus an in-memory aggregator
//! used to print run summaries.

use contracts::OutputObserver;
use metrics::{counter, gauge, histogram};

/// Record a published batch
pub fn record_batch_sent(sink_name: &str, event_count: usize) {
    counter!(
        "events_shipper_batches_sent_total",
        "sink" => sink_name.to_string()
    )
    .increment(1);
    counter!(
        "events_shipper_events_sent_total",
        "sink" => sink_name.to_string()
    )
    .increment(event_count as u64);
}

/// Record a batch created by the producer
pub fn record_batch_produced(event_count: usize) {
    counter!("events_shipper_batches_produced_total").increment(1);
    histogram!("events_shipper_batch_size").record(event_count as f64);
}

/// Record a cancelled batch returning to the pipeline
pub fn record_batch_returned(cancel_count: u32) {
    counter!("events_shipper_batches_returned_total").increment(1);
    gauge!("events_shipper_batch_last_cancel_count").set(cancel_count as f64);
}

/// Record delivery queue depth
pub fn record_queue_depth(depth: usize) {
    gauge!("events_shipper_queue_depth").set(depth as f64);
}

/// Observer exporting published batches to Prometheus
#[derive(Debug, Clone)]
pub struct PrometheusObserver {
    sink: String,
}

impl PrometheusObserver {
    /// Create an observer labelled with the output name
    pub fn new(sink: impl Into<String>) -> Self {
        Self { sink: sink.into() }
    }
}

impl OutputObserver for PrometheusObserver {
    fn record_batch_sent(&self, event_count: usize) {
        record_batch_sent(&self.sink, event_count);
    }
}

/// Delivery statistics aggregator
///
/// Aggregates in memory for summary output.
#[derive(Debug, Clone, Default)]
pub struct DeliveryAggregator {
    /// Batches handed to the queue the first time
    pub batches_produced: u64,

    /// Events carried by produced batches
    pub events_produced: u64,

    /// Batches that came back cancelled
    pub batches_returned: u64,

    /// Batch size statistics
    pub batch_size_stats: RunningStats,

    /// How often a returned batch had been cancelled so far
    pub cancel_stats: RunningStats,
}

impl DeliveryAggregator {
    /// Create new aggregator
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh batch entered the queue
    pub fn on_produced(&mut self, event_count: usize) {
        self.batches_produced += 1;
        self.events_produced += event_count as u64;
        self.batch_size_stats.push(event_count as f64);
        record_batch_produced(event_count);
    }

    /// A cancelled batch came back
    pub fn on_returned(&mut self, cancel_count: u32) {
        self.batches_returned += 1;
        self.cancel_stats.push(cancel_count as f64);
        record_batch_returned(cancel_count);
    }

    /// Generate summary
    pub fn summary(&self) -> DeliverySummary {
        DeliverySummary {
            batches_produced: self.batches_produced,
            events_produced: self.events_produced,
            batches_returned: self.batches_returned,
            return_rate: if self.batches_produced > 0 {
                self.batches_returned as f64 / self.batches_produced as f64 * 100.0
            } else {
                0.0
            },
            batch_size: StatsSummary::from(&self.batch_size_stats),
            cancels_per_return: StatsSummary::from(&self.cancel_stats),
        }
    }

    /// Reset statistics
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Delivery summary
#[derive(Debug, Clone, Default)]
pub struct DeliverySummary {
    pub batches_produced: u64,
    pub events_produced: u64,
    pub batches_returned: u64,
    pub return_rate: f64,
    pub batch_size: StatsSummary,
    pub cancels_per_return: StatsSummary,
}

impl std::fmt::Display for DeliverySummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Delivery Summary ===")?;
        writeln!(f, "Batches produced: {}", self.batches_produced)?;
        writeln!(f, "Events produced: {}", self.events_produced)?;
        writeln!(
            f,
            "Batches returned: {} ({:.2}%)",
            self.batches_returned, self.return_rate
        )?;
        writeln!(f, "Batch size: {}", self.batch_size)?;
        writeln!(f, "Cancels per return: {}", self.cancels_per_return)?;
        Ok(())
    }
}

/// Statistics summary
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.1}, max={:.1}, mean={:.2}, std={:.2} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online statistics (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// Add a value
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    /// Sample count
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Mean
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// Standard deviation
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
