//! Pipeline statistics.

use std::time::Duration;

use dispatcher::MetricsSnapshot;
use observability::DeliveryAggregator;

/// Delivery counters of one output
#[derive(Debug, Clone)]
pub struct OutputStats {
    /// Output name from the configuration
    pub name: String,

    /// Workers draining the queue for this output
    pub workers: usize,

    /// Batches and events published
    pub sent: MetricsSnapshot,
}

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Total duration of the run
    pub duration: Duration,

    /// Per-output delivery counters
    pub outputs: Vec<OutputStats>,

    /// Batches dropped after too many redeliveries
    pub batches_dropped: u64,

    /// Batches still pending when the run stopped
    pub batches_undelivered: u64,

    /// Producer side aggregator
    pub delivery: DeliveryAggregator,
}

impl PipelineStats {
    /// Batches published across all outputs
    pub fn batches_sent(&self) -> u64 {
        self.outputs.iter().map(|o| o.sent.batches_sent).sum()
    }

    /// Events published across all outputs
    pub fn events_sent(&self) -> u64 {
        self.outputs.iter().map(|o| o.sent.events_sent).sum()
    }

    /// Published events per second
    pub fn throughput(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.events_sent() as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n=== Pipeline Statistics ===\n");

        println!("Overview");
        println!("   Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   Batches sent: {}", self.batches_sent());
        println!("   Events sent: {}", self.events_sent());
        println!("   Throughput: {:.2} events/s", self.throughput());
        println!("   Batches dropped: {}", self.batches_dropped);
        println!("   Batches undelivered: {}", self.batches_undelivered);

        println!("\nOutputs");
        for output in &self.outputs {
            println!(
                "   {} ({} worker(s)): {} batches, {} events",
                output.name, output.workers, output.sent.batches_sent, output.sent.events_sent
            );
        }

        println!("\n{}", self.delivery.summary());
    }
}
