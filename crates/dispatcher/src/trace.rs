//! Publish transactions on top of `tracing` spans
//!
//! A [`Tracer`] opens one [`Transaction`] per publish attempt. The
//! transaction carries the worker label, records captured errors, and ends
//! (outcome + duration recorded) when dropped, whatever the result.

use std::sync::Arc;
use std::time::Instant;

use tracing::{field, Span};

/// Factory for publish transactions
#[derive(Debug, Clone)]
pub struct Tracer {
    service: Arc<str>,
    enabled: bool,
}

impl Tracer {
    /// Create an enabled tracer for the given service name
    pub fn new(service: impl Into<Arc<str>>) -> Self {
        Self {
            service: service.into(),
            enabled: true,
        }
    }

    /// Tracer whose transactions open no span
    pub fn disabled() -> Self {
        Self {
            service: Arc::from(""),
            enabled: false,
        }
    }

    /// Whether transactions open real spans
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Begin a transaction
    pub fn start_transaction(&self, name: &'static str, kind: &'static str) -> Transaction {
        let span = if self.enabled {
            tracing::info_span!(
                "transaction",
                transaction = name,
                kind = kind,
                service = %self.service,
                worker = field::Empty,
                outcome = field::Empty,
                error = field::Empty,
                duration_ms = field::Empty,
            )
        } else {
            Span::none()
        };

        Transaction {
            span,
            started: Instant::now(),
            failed: false,
        }
    }
}

impl Default for Tracer {
    fn default() -> Self {
        Self::new(env!("CARGO_PKG_NAME"))
    }
}

/// One traced publish attempt
#[derive(Debug)]
pub struct Transaction {
    span: Span,
    started: Instant,
    failed: bool,
}

impl Transaction {
    /// Tag the transaction with the worker kind
    pub fn set_worker_label(&self, worker: &str) {
        self.span.record("worker", worker);
    }

    /// Report an error outcome before the transaction ends
    pub fn capture_error(&mut self, err: &dyn std::error::Error) {
        self.failed = true;
        self.span.record("error", field::display(err));
        self.span
            .in_scope(|| tracing::debug!(error = %err, "transaction error captured"));
    }

    /// Span to run the traced work in
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Whether an error was captured
    pub fn is_failed(&self) -> bool {
        self.failed
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        let outcome = if self.failed { "failure" } else { "success" };
        self.span.record("outcome", outcome);
        self.span
            .record("duration_ms", self.started.elapsed().as_millis() as u64);
    }
}
