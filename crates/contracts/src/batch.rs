//! Batch handles flowing through the delivery queue

use std::collections::BTreeMap;
use std::fmt;

use async_channel::Sender;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A single event carried by a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event timestamp (unix nanoseconds)
    pub timestamp_ns: u64,

    /// Free-form metadata
    #[serde(default)]
    pub fields: BTreeMap<String, String>,

    /// Opaque payload
    pub payload: Bytes,
}

impl Event {
    /// Create an event without metadata
    pub fn new(timestamp_ns: u64, payload: impl Into<Bytes>) -> Self {
        Self {
            timestamp_ns,
            fields: BTreeMap::new(),
            payload: payload.into(),
        }
    }

    /// Attach a metadata field
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// Handle over a bounded group of events.
///
/// Each time a batch is pulled from the queue it must end exactly once:
/// moved into [`crate::Client::publish`], or returned via [`Batch::cancel`].
/// Both endings consume the handle.
pub trait Batch: Send + fmt::Debug {
    /// Events carried by this batch
    fn events(&self) -> &[Event];

    /// Number of events
    fn len(&self) -> usize {
        self.events().len()
    }

    /// Whether the batch carries no events
    fn is_empty(&self) -> bool {
        self.events().is_empty()
    }

    /// Return the batch to the pipeline uninjected
    fn cancel(self: Box<Self>);
}

/// Owned, type-erased batch as carried by the delivery queue
pub type BatchHandle = Box<dyn Batch>;

/// Default batch implementation.
///
/// A cancelled `EventBatch` is sent back over its retry channel (if any) so
/// the pipeline can offer it to another worker.
#[derive(Debug)]
pub struct EventBatch {
    id: u64,
    events: Vec<Event>,
    cancelled: u32,
    retry: Option<Sender<EventBatch>>,
}

impl EventBatch {
    /// Create a batch without a retry path (cancel drops it)
    pub fn new(id: u64, events: Vec<Event>) -> Self {
        Self {
            id,
            events,
            cancelled: 0,
            retry: None,
        }
    }

    /// Route cancelled batches back to the pipeline
    pub fn with_retry(mut self, retry: Sender<EventBatch>) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Batch id assigned by the producer
    pub fn id(&self) -> u64 {
        self.id
    }

    /// How many times this batch has been cancelled so far
    pub fn cancel_count(&self) -> u32 {
        self.cancelled
    }
}

impl Batch for EventBatch {
    fn events(&self) -> &[Event] {
        &self.events
    }

    fn cancel(mut self: Box<Self>) {
        self.cancelled += 1;
        if let Some(retry) = self.retry.clone() {
            // Fails only once the pipeline has dropped its retry receiver
            let _ = retry.try_send(*self);
        }
    }
}
