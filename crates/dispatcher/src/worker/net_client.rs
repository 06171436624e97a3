//! NetClientWorker - connect/send state machine for reconnectable sinks
//!
//! ```text
//!            connect ok
//! Connecting ──────────▶ Sending
//!     ▲                     │
//!     └─────────────────────┘ publish failed
//!
//! close flag seen in either phase ──▶ Closed
//! ```
//!
//! Every batch pulled while Connecting is cancelled so the pipeline can
//! offer it to another output. Reconnects are not delayed: their rate is
//! bounded only by batch arrival.

use std::sync::Arc;

use async_trait::async_trait;
use contracts::{BatchHandle, ContractError, NetworkClient, OutputObserver};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, Instrument};

use super::{reclaim, CloseFlag, OutputWorker, TaskSlot, WorkerKind};
use crate::error::DispatcherError;
use crate::queue::WorkQueue;
use crate::trace::Tracer;

/// Worker owning a connection-oriented sink
pub struct NetClientWorker {
    name: String,
    client: Arc<Mutex<Box<dyn NetworkClient>>>,
    closed: CloseFlag,
    task: TaskSlot,
}

impl NetClientWorker {
    /// Create the worker and spawn its state machine
    pub fn spawn(
        client: Box<dyn NetworkClient>,
        queue: WorkQueue,
        observer: Arc<dyn OutputObserver>,
        tracer: Tracer,
    ) -> Self {
        let name = client.name().to_string();
        let client = Arc::new(Mutex::new(client));
        let closed = CloseFlag::new();

        let worker_loop = NetClientLoop {
            name: name.clone(),
            client: Arc::clone(&client),
            queue,
            observer,
            closed: closed.clone(),
            tracer,
        };
        let task = TaskSlot::spawn(&name, worker_loop.run());

        Self {
            name,
            client,
            closed,
            task,
        }
    }
}

#[async_trait]
impl OutputWorker for NetClientWorker {
    fn kind(&self) -> WorkerKind {
        WorkerKind::NetClient
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_closed(&self) -> bool {
        self.closed.is_set()
    }

    async fn close(&self) -> Result<(), ContractError> {
        if !self.closed.mark() {
            debug!(sink = %self.name, "Worker already closed");
            return Ok(());
        }
        self.client.lock().await.close().await
    }

    async fn wait(&self) {
        self.task.join().await;
    }
}

/// How a phase ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    /// Connect succeeded
    Connected,
    /// Publish failed, connect again
    Reconnect,
    /// Close flag observed
    Closed,
    /// Queue closed and drained
    Exhausted,
}

struct NetClientLoop {
    name: String,
    client: Arc<Mutex<Box<dyn NetworkClient>>>,
    queue: WorkQueue,
    observer: Arc<dyn OutputObserver>,
    closed: CloseFlag,
    tracer: Tracer,
}

impl NetClientLoop {
    #[instrument(name = "netclient_worker_loop", skip(self), fields(sink = %self.name))]
    async fn run(self) {
        debug!(sink = %self.name, "NetClient worker started");

        while !self.closed.is_set() {
            match self.connect_phase().await {
                Transition::Connected => {}
                Transition::Closed | Transition::Exhausted => break,
                Transition::Reconnect => continue,
            }

            match self.send_phase().await {
                Transition::Reconnect | Transition::Connected => continue,
                Transition::Closed | Transition::Exhausted => break,
            }
        }

        debug!(sink = %self.name, "NetClient worker stopped");
    }

    /// Cancel one batch per connect attempt until connected
    async fn connect_phase(&self) -> Transition {
        let mut reconnect_attempts: usize = 0;

        loop {
            let Ok(batch) = self.queue.recv().await else {
                debug!(sink = %self.name, "Delivery queue closed while connecting");
                return Transition::Exhausted;
            };

            // hand the batch back so other outputs can catch up while we connect
            batch.cancel();

            if self.closed.is_set() {
                info!(sink = %self.name, "Closed connection");
                return Transition::Closed;
            }

            if reconnect_attempts > 0 {
                info!(
                    sink = %self.name,
                    attempts = reconnect_attempts,
                    "Attempting to reconnect with {} reconnect attempt(s)",
                    reconnect_attempts
                );
            } else {
                info!(sink = %self.name, attempts = 0usize, "Connecting");
            }

            let result = {
                let mut client = self.client.lock().await;
                // close may have been requested while waiting for the lock
                if self.closed.is_set() {
                    info!(sink = %self.name, "Closed connection");
                    return Transition::Closed;
                }
                client.connect().await
            };
            match result {
                Ok(()) => {
                    info!(sink = %self.name, "Connection established");
                    return Transition::Connected;
                }
                Err(e) => {
                    error!(sink = %self.name, error = %e, "Failed to connect");
                    reconnect_attempts += 1;
                }
            }
        }
    }

    /// Publish batches until a failure, shutdown, or queue exhaustion
    async fn send_phase(&self) -> Transition {
        loop {
            let Ok(batch) = self.queue.recv().await else {
                debug!(sink = %self.name, "Delivery queue closed");
                return Transition::Exhausted;
            };

            if self.closed.is_set() {
                batch.cancel();
                return Transition::Closed;
            }

            let events = batch.len();
            match self.publish(batch).await {
                Ok(()) => self.observer.record_batch_sent(events),
                Err(_) => return Transition::Reconnect,
            }
        }
    }

    async fn publish(&self, batch: BatchHandle) -> Result<(), DispatcherError> {
        let mut tx = self.tracer.start_transaction("publish", "output");
        tx.set_worker_label(WorkerKind::NetClient.as_str());

        let result = {
            let mut client = self.client.lock().await;
            client.publish(batch).instrument(tx.span().clone()).await
        };

        result.map_err(|e| {
            let err = DispatcherError::publish(&self.name, reclaim(e));
            tx.capture_error(&err);
            error!(sink = %self.name, error = %err, "Publish failed, reconnecting");
            err
        })
    }
}
