//! Sink capability contracts - output worker downstream interface
//!
//! A sink exposes either the basic [`Client`] capability or the
//! connection-oriented [`NetworkClient`] capability. The capability is
//! declared once, when the sink is wrapped into an [`OutputClient`].

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::{BatchHandle, ContractError};

/// Failed publish attempt.
///
/// When `batch` is `Some`, ownership of the batch is returned to the caller,
/// which must resolve it (the workers cancel it). When `None`, the sink kept
/// responsibility for the batch.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct PublishError {
    #[source]
    pub source: ContractError,
    pub batch: Option<BatchHandle>,
}

impl PublishError {
    /// Failure that hands the batch back to the caller
    pub fn returned(batch: BatchHandle, source: ContractError) -> Self {
        Self {
            source,
            batch: Some(batch),
        }
    }

    /// Failure where the sink retained the batch
    pub fn retained(source: ContractError) -> Self {
        Self {
            source,
            batch: None,
        }
    }

    /// Split into the cause and the (possibly) returned batch
    pub fn into_parts(self) -> (ContractError, Option<BatchHandle>) {
        (self.source, self.batch)
    }
}

/// Basic publish capability.
///
/// Assumed always reachable (console, local file).
#[async_trait]
pub trait Client: Send {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Publish one batch
    ///
    /// # Errors
    /// Returns the failure, optionally handing the batch back
    async fn publish(&mut self, batch: BatchHandle) -> Result<(), PublishError>;

    /// Close sink
    async fn close(&mut self) -> Result<(), ContractError>;
}

/// Connection-oriented publish capability.
///
/// `publish` is only valid after `connect` succeeded. Any failure may require
/// another `connect`.
#[async_trait]
pub trait NetworkClient: Client {
    /// Establish the connection
    async fn connect(&mut self) -> Result<(), ContractError>;
}

/// A sink tagged with the capability set it exposes
pub enum OutputClient {
    /// Publish-only sink
    Basic(Box<dyn Client>),
    /// Sink requiring connect before publish
    Network(Box<dyn NetworkClient>),
}

impl OutputClient {
    /// Wrap a publish-only sink
    pub fn basic(client: impl Client + 'static) -> Self {
        Self::Basic(Box::new(client))
    }

    /// Wrap a connection-oriented sink
    pub fn network(client: impl NetworkClient + 'static) -> Self {
        Self::Network(Box::new(client))
    }

    /// Sink name
    pub fn name(&self) -> &str {
        match self {
            Self::Basic(client) => client.name(),
            Self::Network(client) => client.name(),
        }
    }

    /// Whether the sink exposes the connection-oriented capability
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

impl fmt::Debug for OutputClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Basic(client) => f.debug_tuple("Basic").field(&client.name()).finish(),
            Self::Network(client) => f.debug_tuple("Network").field(&client.name()).finish(),
        }
    }
}
