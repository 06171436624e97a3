//! Dispatcher error types

use thiserror::Error;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Sink creation error
    #[error("failed to create sink '{name}': {message}")]
    SinkCreation { name: String, message: String },

    /// Publish failed on a connected sink
    #[error("failed to publish events: {source}")]
    Publish {
        sink_name: String,
        #[source]
        source: contracts::ContractError,
    },
}

impl DispatcherError {
    /// Create a sink creation error
    pub fn sink_creation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkCreation {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Wrap a publish failure with context
    pub fn publish(sink_name: impl Into<String>, source: contracts::ContractError) -> Self {
        Self::Publish {
            sink_name: sink_name.into(),
            source,
        }
    }
}
