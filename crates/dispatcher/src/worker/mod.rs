//! Output workers - drain the delivery queue into one sink each
//!
//! [`make_client_worker`] is the single place that looks at a sink's
//! capability and picks the matching state machine:
//! - [`ClientWorker`] for publish-only sinks
//! - [`NetClientWorker`] for sinks that must connect before publishing

mod client;
mod flag;
mod net_client;

#[cfg(test)]
pub(crate) mod testing;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use contracts::{ContractError, OutputClient, OutputObserver, PublishError};
use tokio::sync::watch;
use tracing::{error, info};

use crate::queue::WorkQueue;
use crate::trace::Tracer;

pub use client::ClientWorker;
pub use flag::CloseFlag;
pub use net_client::NetClientWorker;

/// Worker variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerKind {
    /// Consume-publish loop over a basic sink
    Client,
    /// Connect/send state machine over a connection-oriented sink
    NetClient,
}

impl WorkerKind {
    /// Label used in logs and traces
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::NetClient => "netclient",
        }
    }
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle to a running output worker
#[async_trait]
pub trait OutputWorker: Send + Sync {
    /// Which state machine drives the sink
    fn kind(&self) -> WorkerKind;

    /// Name of the owned sink
    fn name(&self) -> &str;

    /// Whether `close` was requested
    fn is_closed(&self) -> bool;

    /// Request shutdown and close the sink.
    ///
    /// Only the first call closes the sink; later calls return `Ok(())`.
    /// Waits for an in-flight connect/publish to return first. Does not
    /// unblock a pending queue pull: the task exits once that pull returns.
    async fn close(&self) -> Result<(), ContractError>;

    /// Wait for the background task to terminate.
    ///
    /// Every caller, concurrent or later, waits for the same termination.
    async fn wait(&self);
}

/// Start the worker matching the sink's capability
pub fn make_client_worker(
    observer: Arc<dyn OutputObserver>,
    queue: WorkQueue,
    client: OutputClient,
    tracer: Tracer,
) -> Box<dyn OutputWorker> {
    match client {
        OutputClient::Network(client) => {
            info!(sink = %client.name(), kind = "netclient", "Starting output worker");
            Box::new(NetClientWorker::spawn(client, queue, observer, tracer))
        }
        OutputClient::Basic(client) => {
            info!(sink = %client.name(), kind = "client", "Starting output worker");
            Box::new(ClientWorker::spawn(client, queue, observer))
        }
    }
}

/// Take back a batch the sink handed back and return the failure cause
pub(crate) fn reclaim(err: PublishError) -> ContractError {
    let (source, batch) = err.into_parts();
    if let Some(batch) = batch {
        batch.cancel();
    }
    source
}

/// Completion signal of a spawned worker task
pub(crate) struct TaskSlot {
    done: watch::Receiver<bool>,
}

impl TaskSlot {
    /// Spawn `task` and a watcher that flips the signal once it ends
    pub(crate) fn spawn<F>(sink: &str, task: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (done_tx, done) = watch::channel(false);
        let handle = tokio::spawn(task);
        let sink = sink.to_string();
        tokio::spawn(async move {
            if let Err(e) = handle.await {
                error!(sink = %sink, error = ?e, "Worker task panicked");
            }
            done_tx.send_replace(true);
        });
        Self { done }
    }

    pub(crate) async fn join(&self) {
        let mut done = self.done.clone();
        // a dropped sender also means the watcher is gone
        let _ = done.wait_for(|finished| *finished).await;
    }
}
