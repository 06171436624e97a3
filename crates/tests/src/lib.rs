//! # Integration Tests
//!
//! Cross-crate tests for the output stage.
//!
//! Covers:
//! - worker delivery properties against scripted sinks
//! - the reconnect scenario end to end
//! - config to running outputs with the bundled sinks

#[cfg(test)]
mod support {
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use contracts::{Batch, BatchHandle, Client, ContractError, Event, NetworkClient, PublishError};
    use tracing::field::{Field, Visit};
    use tracing::{Event as TraceEvent, Subscriber};
    use tracing_subscriber::layer::{Context, Layer};

    /// What a fake sink or batch went through
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Op {
        Connect(bool),
        Published(u64),
        PublishFailed(u64),
        Cancel(u64),
        Close,
    }

    #[derive(Debug, Clone, Default)]
    pub struct Ledger(Arc<Mutex<Vec<Op>>>);

    impl Ledger {
        pub fn record(&self, op: Op) {
            self.0.lock().unwrap().push(op);
        }

        pub fn ops(&self) -> Vec<Op> {
            self.0.lock().unwrap().clone()
        }

        pub fn connect_calls(&self) -> usize {
            self.ops()
                .iter()
                .filter(|op| matches!(op, Op::Connect(_)))
                .count()
        }

        /// How each batch ended: published or cancelled
        pub fn endings(&self) -> BTreeMap<u64, Vec<Op>> {
            let mut endings: BTreeMap<u64, Vec<Op>> = BTreeMap::new();
            for op in self.ops() {
                if let Op::Published(id) | Op::Cancel(id) = op {
                    endings.entry(id).or_default().push(op);
                }
            }
            endings
        }
    }

    #[derive(Debug)]
    pub struct TrackedBatch {
        id: u64,
        events: Vec<Event>,
        ledger: Ledger,
    }

    impl Batch for TrackedBatch {
        fn events(&self) -> &[Event] {
            &self.events
        }

        fn cancel(self: Box<Self>) {
            self.ledger.record(Op::Cancel(self.id));
        }
    }

    pub fn tracked(id: u64, events: usize, ledger: &Ledger) -> BatchHandle {
        let events = (0..events)
            .map(|seq| Event::new(seq as u64, "payload").with_field("batch", id.to_string()))
            .collect();
        Box::new(TrackedBatch {
            id,
            events,
            ledger: ledger.clone(),
        })
    }

    fn batch_id(batch: &BatchHandle) -> u64 {
        batch
            .events()
            .first()
            .and_then(|e| e.fields.get("batch"))
            .and_then(|id| id.parse().ok())
            .unwrap_or_default()
    }

    /// Sink whose connect and publish outcomes follow a script (then succeed)
    pub struct FakeSink {
        name: String,
        ledger: Ledger,
        connects: VecDeque<bool>,
        publishes: VecDeque<bool>,
    }

    impl FakeSink {
        pub fn new(name: &str, ledger: &Ledger) -> Self {
            Self {
                name: name.to_string(),
                ledger: ledger.clone(),
                connects: VecDeque::new(),
                publishes: VecDeque::new(),
            }
        }

        pub fn connects(mut self, outcomes: &[bool]) -> Self {
            self.connects = outcomes.iter().copied().collect();
            self
        }

        pub fn publishes(mut self, outcomes: &[bool]) -> Self {
            self.publishes = outcomes.iter().copied().collect();
            self
        }
    }

    #[async_trait]
    impl Client for FakeSink {
        fn name(&self) -> &str {
            &self.name
        }

        async fn publish(&mut self, batch: BatchHandle) -> Result<(), PublishError> {
            let id = batch_id(&batch);
            if self.publishes.pop_front().unwrap_or(true) {
                self.ledger.record(Op::Published(id));
                Ok(())
            } else {
                self.ledger.record(Op::PublishFailed(id));
                Err(PublishError::returned(
                    batch,
                    ContractError::sink_write(&self.name, "scripted failure"),
                ))
            }
        }

        async fn close(&mut self) -> Result<(), ContractError> {
            self.ledger.record(Op::Close);
            Ok(())
        }
    }

    #[async_trait]
    impl NetworkClient for FakeSink {
        async fn connect(&mut self) -> Result<(), ContractError> {
            let ok = self.connects.pop_front().unwrap_or(true);
            self.ledger.record(Op::Connect(ok));
            if ok {
                Ok(())
            } else {
                Err(ContractError::sink_connection(&self.name, "scripted refusal"))
            }
        }
    }

    /// Layer collecting the `attempts` field of every log event
    #[derive(Clone, Default)]
    pub struct AttemptsCapture(Arc<Mutex<Vec<u64>>>);

    impl AttemptsCapture {
        pub fn values(&self) -> Vec<u64> {
            self.0.lock().unwrap().clone()
        }
    }

    struct AttemptsVisitor(Option<u64>);

    impl Visit for AttemptsVisitor {
        fn record_u64(&mut self, field: &Field, value: u64) {
            if field.name() == "attempts" {
                self.0 = Some(value);
            }
        }

        fn record_i64(&mut self, field: &Field, value: i64) {
            if field.name() == "attempts" {
                self.0 = u64::try_from(value).ok();
            }
        }

        fn record_debug(&mut self, _field: &Field, _value: &dyn std::fmt::Debug) {}
    }

    impl<S: Subscriber> Layer<S> for AttemptsCapture {
        fn on_event(&self, event: &TraceEvent<'_>, _ctx: Context<'_, S>) {
            let mut visitor = AttemptsVisitor(None);
            event.record(&mut visitor);
            if let Some(attempts) = visitor.0 {
                self.0.lock().unwrap().push(attempts);
            }
        }
    }
}

#[cfg(test)]
mod worker_properties {
    use std::sync::Arc;
    use std::time::Duration;

    use contracts::OutputClient;
    use dispatcher::{make_client_worker, work_queue, OutputMetrics, Tracer, WorkerKind};
    use tracing_subscriber::layer::SubscriberExt;

    use crate::support::{tracked, AttemptsCapture, FakeSink, Ledger, Op};

    fn network_worker(
        sink: FakeSink,
        queue: dispatcher::WorkQueue,
    ) -> (Box<dyn dispatcher::OutputWorker>, Arc<OutputMetrics>) {
        let metrics = Arc::new(OutputMetrics::new());
        let worker = make_client_worker(
            metrics.clone(),
            queue,
            OutputClient::network(sink),
            Tracer::disabled(),
        );
        (worker, metrics)
    }

    #[tokio::test]
    async fn test_batches_pulled_while_connecting_are_cancelled_once() {
        let ledger = Ledger::default();
        let (tx, rx) = work_queue(8);
        let sink = FakeSink::new("net", &ledger).connects(&[false, false, false, false]);
        let (worker, metrics) = network_worker(sink, rx);

        for id in 1..=4 {
            tx.send(tracked(id, 1, &ledger)).await.unwrap();
        }
        drop(tx);
        worker.wait().await;

        let endings = ledger.endings();
        assert_eq!(endings.len(), 4);
        for (id, ops) in endings {
            assert_eq!(ops, vec![Op::Cancel(id)]);
        }
        assert_eq!(ledger.connect_calls(), 4);
        assert_eq!(metrics.batches_sent(), 0);
    }

    #[tokio::test]
    async fn test_every_pulled_batch_ends_exactly_once() {
        let ledger = Ledger::default();
        let (tx, rx) = work_queue(32);
        let sink = FakeSink::new("net", &ledger)
            .connects(&[false, true, false, true, true])
            .publishes(&[true, false, true, true, false, true, false]);
        let (worker, metrics) = network_worker(sink, rx);

        for id in 1..=20 {
            tx.send(tracked(id, 2, &ledger)).await.unwrap();
        }
        drop(tx);
        worker.wait().await;

        let endings = ledger.endings();
        assert_eq!(endings.len(), 20);
        for (id, ops) in &endings {
            assert_eq!(ops.len(), 1, "batch {id} ended {ops:?}");
        }

        let published = endings
            .values()
            .filter(|ops| matches!(ops[0], Op::Published(_)))
            .count() as u64;
        assert_eq!(metrics.batches_sent(), published);
        assert_eq!(metrics.events_sent(), published * 2);
    }

    #[tokio::test]
    async fn test_failed_publish_is_followed_by_connect() {
        let ledger = Ledger::default();
        let (tx, rx) = work_queue(16);
        let sink = FakeSink::new("net", &ledger).publishes(&[true, false, false, true]);
        let (worker, _) = network_worker(sink, rx);

        for id in 1..=10 {
            tx.send(tracked(id, 1, &ledger)).await.unwrap();
        }
        drop(tx);
        worker.wait().await;

        let sink_calls: Vec<Op> = ledger
            .ops()
            .into_iter()
            .filter(|op| !matches!(op, Op::Cancel(_)))
            .collect();
        assert!(sink_calls.iter().any(|op| matches!(op, Op::PublishFailed(_))));
        for pair in sink_calls.windows(2) {
            if let Op::PublishFailed(_) = pair[0] {
                assert!(
                    matches!(pair[1], Op::Connect(_)),
                    "publish failure followed by {:?}",
                    pair[1]
                );
            }
        }
    }

    #[tokio::test]
    async fn test_reconnect_counter_resets_after_connect() {
        let capture = AttemptsCapture::default();
        let subscriber = tracing_subscriber::registry().with(capture.clone());
        let _guard = tracing::subscriber::set_default(subscriber);

        let ledger = Ledger::default();
        let (tx, rx) = work_queue(16);
        let sink = FakeSink::new("net", &ledger)
            .connects(&[false, false, true, false, true])
            .publishes(&[false]);
        let (worker, _) = network_worker(sink, rx);

        // 3 pulls to connect, 1 failing publish, 2 pulls to reconnect
        for id in 1..=6 {
            tx.send(tracked(id, 1, &ledger)).await.unwrap();
        }
        drop(tx);
        worker.wait().await;

        assert_eq!(capture.values(), vec![0, 1, 2, 0, 1]);
    }

    #[tokio::test]
    async fn test_close_and_queue_close_terminate_worker() {
        let ledger = Ledger::default();
        let (tx, rx) = work_queue(8);
        let (worker, _) = network_worker(FakeSink::new("net", &ledger), rx);

        tx.send(tracked(1, 1, &ledger)).await.unwrap();
        tx.send(tracked(2, 1, &ledger)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        worker.close().await.unwrap();
        assert!(worker.is_closed());
        tx.send(tracked(3, 1, &ledger)).await.unwrap();
        tx.close();

        tokio::time::timeout(Duration::from_secs(1), worker.wait())
            .await
            .expect("worker did not stop");

        let endings = ledger.endings();
        assert_eq!(endings.len(), 3);
        assert!(endings.values().all(|ops| ops.len() == 1));
        assert_eq!(endings[&3], vec![Op::Cancel(3)]);
    }

    #[tokio::test]
    async fn test_worker_kind_follows_client_capability() {
        let ledger = Ledger::default();
        let (tx, rx) = work_queue(8);
        let metrics = Arc::new(OutputMetrics::new());

        let basic = make_client_worker(
            metrics.clone(),
            rx.clone(),
            OutputClient::basic(FakeSink::new("basic", &ledger)),
            Tracer::disabled(),
        );
        let network = make_client_worker(
            metrics.clone(),
            rx,
            OutputClient::network(FakeSink::new("net", &ledger).connects(&[false; 8])),
            Tracer::disabled(),
        );
        assert_eq!(basic.kind(), WorkerKind::Client);
        assert_eq!(network.kind(), WorkerKind::NetClient);

        network.close().await.unwrap();
        for id in 1..=4 {
            tx.send(tracked(id, 1, &ledger)).await.unwrap();
        }
        drop(tx);
        basic.wait().await;
        network.wait().await;

        // the closed network worker cancels at most one batch and never connects
        assert_eq!(ledger.connect_calls(), 0);
        assert!(metrics.batches_sent() >= 3);
    }
}

#[cfg(test)]
mod reconnect_scenario {
    use std::sync::Arc;

    use contracts::OutputClient;
    use dispatcher::{make_client_worker, work_queue, OutputMetrics, Tracer, WorkerKind};

    use crate::support::{tracked, FakeSink, Ledger, Op};

    #[tokio::test]
    async fn test_connect_fails_twice_then_publish_fails_once() {
        let ledger = Ledger::default();
        let (tx, rx) = work_queue(8);
        let sink = FakeSink::new("upstream", &ledger)
            .connects(&[false, false, true, true])
            .publishes(&[true, false]);
        let metrics = Arc::new(OutputMetrics::new());
        let worker = make_client_worker(
            metrics.clone(),
            rx,
            OutputClient::network(sink),
            Tracer::disabled(),
        );
        assert_eq!(worker.kind(), WorkerKind::NetClient);

        for id in 1..=6 {
            tx.send(tracked(id, 3, &ledger)).await.unwrap();
        }
        drop(tx);
        worker.wait().await;

        assert_eq!(
            ledger.ops(),
            vec![
                Op::Cancel(1),
                Op::Connect(false),
                Op::Cancel(2),
                Op::Connect(false),
                Op::Cancel(3),
                Op::Connect(true),
                Op::Published(4),
                Op::PublishFailed(5),
                Op::Cancel(5),
                Op::Cancel(6),
                Op::Connect(true),
            ]
        );
        assert_eq!(ledger.connect_calls(), 4);
        assert_eq!(metrics.batches_sent(), 1);
        assert_eq!(metrics.events_sent(), 3);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{Event, EventBatch};
    use dispatcher::{spawn_output, work_queue, FanoutObserver, OutputMetrics, Tracer};
    use observability::PrometheusObserver;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    fn batch(id: u64, events: usize) -> Box<EventBatch> {
        let events = (0..events)
            .map(|seq| Event::new(seq as u64, format!("event {id}/{seq}")))
            .collect();
        Box::new(EventBatch::new(id, events))
    }

    /// Config -> factory -> workers -> file on disk
    #[tokio::test]
    async fn test_config_to_file_output() {
        let dir = tempfile::tempdir().unwrap();
        let config = format!(
            r#"
[queue]
capacity = 8

[[outputs]]
name = "console"
sink_type = "log"

[[outputs]]
name = "archive"
sink_type = "file"
workers = 2
[outputs.params]
base_path = "{}"
"#,
            dir.path().display()
        );
        let blueprint = ConfigLoader::load_from_str(&config, ConfigFormat::Toml).unwrap();

        let (tx, rx) = work_queue(blueprint.queue.capacity);
        let mut workers = Vec::new();
        let mut per_output = Vec::new();
        for output in &blueprint.outputs {
            let metrics = Arc::new(OutputMetrics::new());
            let observer = Arc::new(
                FanoutObserver::new()
                    .with(metrics.clone())
                    .with(Arc::new(PrometheusObserver::new(output.name.clone()))),
            );
            workers.extend(spawn_output(output, &rx, observer, &Tracer::disabled()).unwrap());
            per_output.push(metrics);
        }
        assert_eq!(workers.len(), 3);

        for id in 1..=9 {
            tx.send(batch(id, 2)).await.unwrap();
        }
        drop(tx);
        for worker in &workers {
            worker.wait().await;
        }
        for worker in &workers {
            worker.close().await.unwrap();
        }

        let total: u64 = per_output.iter().map(|m| m.batches_sent()).sum();
        assert_eq!(total, 9);

        let lines: usize = ["archive-0", "archive-1"]
            .iter()
            .filter_map(|name| {
                std::fs::read_to_string(dir.path().join(format!("{name}.ndjson"))).ok()
            })
            .map(|content| content.lines().count())
            .sum();
        assert_eq!(lines as u64, per_output[1].events_sent());
    }

    /// Config -> network worker -> TCP listener receiving JSON lines
    #[tokio::test]
    async fn test_config_to_network_output() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let config = format!(
            r#"
[[outputs]]
name = "upstream"
sink_type = "network"
[outputs.params]
addr = "{addr}"
format = "json"
"#
        );
        let blueprint = ConfigLoader::load_from_str(&config, ConfigFormat::Toml).unwrap();

        let (tx, rx) = work_queue(8);
        let metrics = Arc::new(OutputMetrics::new());
        let workers =
            spawn_output(&blueprint.outputs[0], &rx, metrics.clone(), &Tracer::disabled()).unwrap();

        // first batch is spent on the connect attempt
        for id in 1..=3 {
            tx.send(batch(id, 2)).await.unwrap();
        }
        let (socket, _) = tokio::time::timeout(Duration::from_secs(2), listener.accept())
            .await
            .unwrap()
            .unwrap();

        let mut lines = BufReader::new(socket).lines();
        let mut received = Vec::new();
        for _ in 0..4 {
            let line = tokio::time::timeout(Duration::from_secs(2), lines.next_line())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            let event: Event = serde_json::from_str(&line).unwrap();
            received.push(String::from_utf8(event.payload.to_vec()).unwrap());
        }

        assert_eq!(received, vec!["event 2/0", "event 2/1", "event 3/0", "event 3/1"]);

        workers[0].close().await.unwrap();
        drop(tx);
        workers[0].wait().await;
        assert_eq!(metrics.batches_sent(), 2);
    }
}
