//! Scripted sinks and batches shared by the worker tests

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use contracts::{
    Batch, BatchHandle, Client, ContractError, Event, NetworkClient, PublishError,
};

/// Something that happened to a sink or a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Connect,
    Publish(u64),
    Cancel(u64),
    Close,
}

/// Ordered record of sink calls and batch endings
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<Step>>>);

impl Journal {
    pub fn push(&self, step: Step) {
        self.0.lock().unwrap().push(step);
    }

    pub fn steps(&self) -> Vec<Step> {
        self.0.lock().unwrap().clone()
    }

    pub fn connects(&self) -> usize {
        self.count(|s| matches!(s, Step::Connect))
    }

    pub fn closes(&self) -> usize {
        self.count(|s| matches!(s, Step::Close))
    }

    fn count(&self, pred: impl Fn(&Step) -> bool) -> usize {
        self.0.lock().unwrap().iter().filter(|s| pred(s)).count()
    }

    /// Poll until `pred` holds on the recorded steps
    pub async fn wait_for(&self, pred: impl Fn(&[Step]) -> bool) {
        for _ in 0..400 {
            if pred(&self.steps()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("journal never reached expected state: {:?}", self.steps());
    }
}

/// Batch that records its cancellation
#[derive(Debug)]
pub struct TestBatch {
    id: u64,
    events: Vec<Event>,
    journal: Journal,
}

impl Batch for TestBatch {
    fn events(&self) -> &[Event] {
        &self.events
    }

    fn cancel(self: Box<Self>) {
        self.journal.push(Step::Cancel(self.id));
    }
}

/// Batch `id` carrying `events` events (at least one)
pub fn batch(id: u64, events: usize, journal: &Journal) -> BatchHandle {
    let events = (0..events.max(1))
        .map(|i| Event::new(i as u64, "payload").with_field("batch", id.to_string()))
        .collect();
    Box::new(TestBatch {
        id,
        events,
        journal: journal.clone(),
    })
}

fn batch_id(batch: &BatchHandle) -> u64 {
    batch
        .events()
        .first()
        .and_then(|e| e.fields.get("batch"))
        .and_then(|id| id.parse().ok())
        .unwrap_or(u64::MAX)
}

/// Sink following a script of connect/publish outcomes.
///
/// Outcomes default to success once the script runs out.
pub struct ScriptedSink {
    name: String,
    journal: Journal,
    connects: VecDeque<bool>,
    publishes: VecDeque<bool>,
    hand_back: bool,
    close_error: bool,
}

impl ScriptedSink {
    pub fn new(name: &str, journal: &Journal) -> Self {
        Self {
            name: name.to_string(),
            journal: journal.clone(),
            connects: VecDeque::new(),
            publishes: VecDeque::new(),
            hand_back: true,
            close_error: false,
        }
    }

    pub fn connects(mut self, script: &[bool]) -> Self {
        self.connects = script.iter().copied().collect();
        self
    }

    pub fn publishes(mut self, script: &[bool]) -> Self {
        self.publishes = script.iter().copied().collect();
        self
    }

    /// Keep failed batches instead of handing them back
    pub fn retain_failed(mut self) -> Self {
        self.hand_back = false;
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.close_error = true;
        self
    }
}

#[async_trait]
impl Client for ScriptedSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&mut self, batch: BatchHandle) -> Result<(), PublishError> {
        self.journal.push(Step::Publish(batch_id(&batch)));
        if self.publishes.pop_front().unwrap_or(true) {
            return Ok(());
        }
        let cause = ContractError::sink_write(&self.name, "scripted publish failure");
        if self.hand_back {
            Err(PublishError::returned(batch, cause))
        } else {
            Err(PublishError::retained(cause))
        }
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        self.journal.push(Step::Close);
        if self.close_error {
            return Err(ContractError::sink_close(&self.name, "scripted close failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl NetworkClient for ScriptedSink {
    async fn connect(&mut self) -> Result<(), ContractError> {
        self.journal.push(Step::Connect);
        if self.connects.pop_front().unwrap_or(true) {
            Ok(())
        } else {
            Err(ContractError::sink_connection(&self.name, "scripted connect failure"))
        }
    }
}
