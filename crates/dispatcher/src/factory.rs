//! Output construction from configuration

use std::sync::Arc;

use contracts::{OutputClient, OutputObserver, SinkConfig, SinkType};
use tracing::instrument;

use crate::error::DispatcherError;
use crate::queue::WorkQueue;
use crate::sinks::{FileSink, LogSink, NetworkSink};
use crate::trace::Tracer;
use crate::worker::{make_client_worker, OutputWorker};

/// Create a sink from configuration, tagged with its capability
#[instrument(
    name = "dispatcher_create_output_client",
    skip(config),
    fields(sink = %config.name, sink_type = ?config.sink_type)
)]
pub fn create_output_client(config: &SinkConfig) -> Result<OutputClient, DispatcherError> {
    match config.sink_type {
        SinkType::Log => Ok(OutputClient::basic(LogSink::new(&config.name))),
        SinkType::File => {
            let sink = FileSink::from_params(&config.name, &config.params)
                .map_err(|e| DispatcherError::sink_creation(&config.name, e.to_string()))?;
            Ok(OutputClient::basic(sink))
        }
        SinkType::Network => {
            let sink = NetworkSink::from_params(&config.name, &config.params)
                .map_err(|e| DispatcherError::sink_creation(&config.name, e.to_string()))?;
            Ok(OutputClient::network(sink))
        }
    }
}

/// Start `config.workers` workers for one output, each owning its own sink.
///
/// With more than one worker, sinks are named `<name>-<index>`.
#[instrument(
    name = "dispatcher_spawn_output",
    skip(config, queue, observer, tracer),
    fields(sink = %config.name, workers = config.workers)
)]
pub fn spawn_output(
    config: &SinkConfig,
    queue: &WorkQueue,
    observer: Arc<dyn OutputObserver>,
    tracer: &Tracer,
) -> Result<Vec<Box<dyn OutputWorker>>, DispatcherError> {
    let mut workers = Vec::with_capacity(config.workers);
    for index in 0..config.workers {
        let mut instance = config.clone();
        if config.workers > 1 {
            instance.name = format!("{}-{}", config.name, index);
        }
        let client = create_output_client(&instance)?;
        workers.push(make_client_worker(
            Arc::clone(&observer),
            queue.clone(),
            client,
            tracer.clone(),
        ));
    }
    Ok(workers)
}
