//! Shared delivery queue
//!
//! A bounded multi-producer multi-consumer channel of batch handles. The
//! pipeline owns the sending side; every worker holds a clone of the
//! receiving side and competes for batches.

use async_channel::{bounded, Receiver, Sender};
use contracts::BatchHandle;

/// Consuming side of the delivery queue
pub type WorkQueue = Receiver<BatchHandle>;

/// Producing side of the delivery queue
pub type WorkSender = Sender<BatchHandle>;

/// Create a bounded delivery queue
pub fn work_queue(capacity: usize) -> (WorkSender, WorkQueue) {
    bounded(capacity)
}
