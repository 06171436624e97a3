//! LogSink - logs batch summary via tracing

use async_trait::async_trait;
use contracts::{BatchHandle, Client, ContractError, PublishError};
use tracing::{info, instrument};

/// Sink that logs batch summaries for debugging
pub struct LogSink {
    name: String,
}

impl LogSink {
    /// Create a new LogSink with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn log_batch_summary(&self, batch: &BatchHandle) {
        let events = batch.events();
        let bytes: usize = events.iter().map(|e| e.payload.len()).sum();

        info!(
            sink = %self.name,
            events = events.len(),
            bytes,
            first_ts = events.first().map(|e| e.timestamp_ns),
            last_ts = events.last().map(|e| e.timestamp_ns),
            "Batch received"
        );
    }
}

#[async_trait]
impl Client for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "log_sink_publish", skip_all)]
    async fn publish(&mut self, batch: BatchHandle) -> Result<(), PublishError> {
        self.log_batch_summary(&batch);
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip_all)]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, "LogSink closed");
        Ok(())
    }
}
