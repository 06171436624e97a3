//! # Dispatcher
//!
//! Output stage of the event pipeline.
//!
//! Responsibilities:
//! - Drain batches from the shared delivery queue
//! - Pick the worker state machine matching each sink's capability
//! - Hand back every batch that cannot be published, so no batch is lost
//!   while a connection is down

pub mod error;
pub mod factory;
pub mod metrics;
pub mod queue;
pub mod sinks;
pub mod trace;
pub mod worker;

pub use contracts::{Batch, BatchHandle, Client, NetworkClient, OutputClient, OutputObserver};
pub use error::DispatcherError;
pub use factory::{create_output_client, spawn_output};
pub use metrics::{FanoutObserver, MetricsSnapshot, OutputMetrics};
pub use queue::{work_queue, WorkQueue, WorkSender};
pub use sinks::{FileSink, LogSink, NetworkSink};
pub use trace::{Tracer, Transaction};
pub use worker::{
    make_client_worker, ClientWorker, CloseFlag, NetClientWorker, OutputWorker, WorkerKind,
};
