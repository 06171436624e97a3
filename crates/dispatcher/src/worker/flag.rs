//! Shutdown flag shared between a worker task and its `close` caller

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Set-once flag marking "shutdown requested".
///
/// Written by `close`, read non-blockingly by the worker's own task.
#[derive(Debug, Clone, Default)]
pub struct CloseFlag(Arc<AtomicBool>);

impl CloseFlag {
    /// Create an unset flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether shutdown was requested
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Request shutdown. Returns `true` only for the call that set the flag.
    pub fn mark(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }
}
