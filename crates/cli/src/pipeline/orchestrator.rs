//! Pipeline orchestrator - wires the producer, the delivery queue and the
//! output workers.
//!
//! Batches cancelled by a worker come back over the retry channel and are
//! enqueued again, so another worker (or the same one after reconnecting)
//! gets to deliver them.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::Result;
use async_channel::Sender;
use contracts::{Batch, Event, EventBatch, ShipperBlueprint};
use dispatcher::{
    spawn_output, work_queue, FanoutObserver, OutputMetrics, OutputWorker, Tracer, WorkSender,
};
use observability::{record_queue_depth, PrometheusObserver};
use tracing::{debug, info, warn};

use super::stats::{OutputStats, PipelineStats};
use crate::error::CliError;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Validated output stage configuration
    pub blueprint: ShipperBlueprint,

    /// Batches to produce (None = until shutdown)
    pub batches: Option<u64>,

    /// Events per batch
    pub batch_size: usize,

    /// Delay between produced batches
    pub interval: Duration,

    /// Drop a batch after it was handed back more often than this (None = never)
    pub max_redeliveries: Option<u32>,

    /// Upper bound for waiting on workers after close
    pub shutdown_timeout: Duration,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

struct RunningOutput {
    name: String,
    workers: usize,
    metrics: Arc<OutputMetrics>,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run until every produced batch is delivered or `shutdown` resolves
    pub async fn run<F>(self, shutdown: F) -> Result<PipelineStats>
    where
        F: Future<Output = ()>,
    {
        let start_time = Instant::now();
        let blueprint = &self.config.blueprint;

        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        let (queue_tx, queue) = work_queue(blueprint.queue.capacity);
        let tracer = Tracer::new("events-shipper");

        let mut outputs = Vec::with_capacity(blueprint.outputs.len());
        let mut workers: Vec<Box<dyn OutputWorker>> =
            Vec::with_capacity(blueprint.total_workers());

        for output in &blueprint.outputs {
            let metrics = Arc::new(OutputMetrics::new());
            let observer = FanoutObserver::new()
                .with(metrics.clone())
                .with(Arc::new(PrometheusObserver::new(output.name.clone())));

            let spawned = match spawn_output(output, &queue, Arc::new(observer), &tracer) {
                Ok(spawned) => spawned,
                Err(e) => {
                    // already running outputs must not outlive the failed start
                    if let Err(stop_err) =
                        Self::stop(&queue_tx, &workers, self.config.shutdown_timeout).await
                    {
                        warn!(error = %stop_err, "Shutdown incomplete");
                    }
                    return Err(CliError::output_start(&output.name, e.to_string()).into());
                }
            };

            info!(
                output = %output.name,
                sink_type = ?output.sink_type,
                workers = spawned.len(),
                "Output started"
            );
            workers.extend(spawned);
            outputs.push(RunningOutput {
                name: output.name.clone(),
                workers: output.workers,
                metrics,
            });
        }
        drop(queue);

        let (retry_tx, retry_rx) = async_channel::unbounded::<EventBatch>();
        let mut stats = PipelineStats::default();
        let mut produced = 0u64;

        let mut ticker = tokio::time::interval(self.config.interval.max(Duration::from_millis(1)));
        let mut drain_check = tokio::time::interval(Duration::from_millis(20));
        tokio::pin!(shutdown);

        info!(
            batches = ?self.config.batches,
            batch_size = self.config.batch_size,
            workers = workers.len(),
            "Producer running"
        );

        'produce: loop {
            tokio::select! {
                _ = &mut shutdown => {
                    warn!("Received shutdown signal, stopping outputs...");
                    break;
                }
                _ = ticker.tick(), if self.has_remaining(produced) => {
                    produced += 1;
                    let batch = self.next_batch(produced, &retry_tx);
                    stats.delivery.on_produced(batch.len());

                    // a full queue must not hold off shutdown
                    let sent = tokio::select! {
                        sent = queue_tx.send(Box::new(batch)) => sent,
                        _ = &mut shutdown => {
                            warn!("Received shutdown signal, stopping outputs...");
                            break 'produce;
                        }
                    };
                    if sent.is_err() {
                        warn!("Delivery queue closed");
                        break;
                    }
                    record_queue_depth(queue_tx.len());
                }
                Ok(batch) = retry_rx.recv() => {
                    let cancels = batch.cancel_count();
                    stats.delivery.on_returned(cancels);

                    if self.config.max_redeliveries.is_some_and(|max| cancels > max) {
                        warn!(batch = batch.id(), cancels, "Dropping batch after too many redeliveries");
                        stats.batches_dropped += 1;
                        continue;
                    }

                    debug!(batch = batch.id(), cancels, "Re-enqueueing returned batch");
                    let sent = tokio::select! {
                        sent = queue_tx.send(Box::new(batch)) => sent,
                        _ = &mut shutdown => {
                            warn!("Received shutdown signal, stopping outputs...");
                            break 'produce;
                        }
                    };
                    if sent.is_err() {
                        warn!("Delivery queue closed");
                        break;
                    }
                }
                _ = drain_check.tick(), if !self.has_remaining(produced) => {
                    let sent: u64 = outputs.iter().map(|o| o.metrics.batches_sent()).sum();
                    if sent + stats.batches_dropped >= produced {
                        info!(batches = produced, "All produced batches settled");
                        break;
                    }
                }
            }
        }

        info!("Shutting down outputs...");
        if let Err(e) = Self::stop(&queue_tx, &workers, self.config.shutdown_timeout).await {
            warn!(error = %e, "Shutdown incomplete");
        }

        stats.outputs = outputs
            .iter()
            .map(|o| OutputStats {
                name: o.name.clone(),
                workers: o.workers,
                sent: o.metrics.snapshot(),
            })
            .collect();
        stats.batches_undelivered = produced
            .saturating_sub(stats.batches_sent())
            .saturating_sub(stats.batches_dropped);
        stats.duration = start_time.elapsed();

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            events_per_sec = format!("{:.2}", stats.throughput()),
            undelivered = stats.batches_undelivered,
            "Pipeline shutdown complete"
        );

        Ok(stats)
    }

    fn has_remaining(&self, produced: u64) -> bool {
        self.config.batches.is_none_or(|limit| produced < limit)
    }

    fn next_batch(&self, id: u64, retry: &Sender<EventBatch>) -> EventBatch {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();

        let events = (0..self.config.batch_size)
            .map(|seq| {
                Event::new(now + seq as u64, format!("synthetic event {id}/{seq}"))
                    .with_field("batch", id.to_string())
                    .with_field("seq", seq.to_string())
            })
            .collect();

        EventBatch::new(id, events).with_retry(retry.clone())
    }

    /// Close every worker, then the queue, then wait for the workers to exit.
    ///
    /// Closing and waiting share one `timeout`.
    async fn stop(
        queue_tx: &WorkSender,
        workers: &[Box<dyn OutputWorker>],
        timeout: Duration,
    ) -> Result<(), CliError> {
        let deadline = tokio::time::Instant::now() + timeout;

        let close_all = async {
            let mut close_errors = Vec::new();
            for worker in workers {
                if let Err(e) = worker.close().await {
                    warn!(sink = %worker.name(), error = %e, "Failed to close output");
                    close_errors.push(format!("{}: {e}", worker.name()));
                }
            }
            close_errors
        };
        let closed = tokio::time::timeout_at(deadline, close_all).await;

        queue_tx.close();

        let Ok(close_errors) = closed else {
            return Err(CliError::shutdown(format!(
                "outputs still closing after {:?}",
                timeout
            )));
        };

        let wait_all = async {
            for worker in workers {
                worker.wait().await;
            }
        };
        if tokio::time::timeout_at(deadline, wait_all).await.is_err() {
            return Err(CliError::shutdown(format!(
                "workers still running after {:?}",
                timeout
            )));
        }

        if close_errors.is_empty() {
            Ok(())
        } else {
            Err(CliError::shutdown(close_errors.join("; ")))
        }
    }
}
