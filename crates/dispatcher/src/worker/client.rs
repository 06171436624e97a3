//! ClientWorker - consume/publish loop for publish-only sinks

use std::sync::Arc;

use async_trait::async_trait;
use contracts::{Client, ContractError, OutputObserver};
use tokio::sync::Mutex;
use tracing::{debug, error, instrument};

use super::{reclaim, CloseFlag, OutputWorker, TaskSlot, WorkerKind};
use crate::queue::WorkQueue;

/// Worker owning a basic sink
pub struct ClientWorker {
    name: String,
    client: Arc<Mutex<Box<dyn Client>>>,
    closed: CloseFlag,
    task: TaskSlot,
}

impl ClientWorker {
    /// Create the worker and spawn its loop
    pub fn spawn(
        client: Box<dyn Client>,
        queue: WorkQueue,
        observer: Arc<dyn OutputObserver>,
    ) -> Self {
        let name = client.name().to_string();
        let client = Arc::new(Mutex::new(client));
        let closed = CloseFlag::new();

        let worker_loop = ClientLoop {
            name: name.clone(),
            client: Arc::clone(&client),
            queue,
            observer,
            closed: closed.clone(),
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
impl OutputWorker for ClientWorker {
    fn kind(&self) -> WorkerKind {
        WorkerKind::Client
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

struct ClientLoop {
    name: String,
    client: Arc<Mutex<Box<dyn Client>>>,
    queue: WorkQueue,
    observer: Arc<dyn OutputObserver>,
    closed: CloseFlag,
}

impl ClientLoop {
    #[instrument(name = "client_worker_loop", skip(self), fields(sink = %self.name))]
    async fn run(self) {
        debug!(sink = %self.name, "Client worker started");

        'outer: while !self.closed.is_set() {
            loop {
                let Ok(batch) = self.queue.recv().await else {
                    debug!(sink = %self.name, "Delivery queue closed");
                    break 'outer;
                };

                if self.closed.is_set() {
                    batch.cancel();
                    break 'outer;
                }

                let events = batch.len();
                let result = self.client.lock().await.publish(batch).await;
                match result {
                    Ok(()) => self.observer.record_batch_sent(events),
                    Err(e) => {
                        let cause = reclaim(e);
                        error!(sink = %self.name, error = %cause, "Publish failed");
                        // re-check the close flag before consuming again
                        continue 'outer;
                    }
                }
            }
        }

        debug!(sink = %self.name, "Client worker stopped");
    }
}
