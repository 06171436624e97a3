//! ShipperBlueprint - Config Loader output
//!
//! Describes the delivery queue and the outputs draining it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

/// Config version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete output stage configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ShipperBlueprint {
    /// Config version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Shared delivery queue
    #[serde(default)]
    #[validate(nested)]
    pub queue: QueueConfig,

    /// Outputs draining the queue
    #[validate(nested)]
    pub outputs: Vec<SinkConfig>,
}

/// Delivery queue settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct QueueConfig {
    /// Bounded capacity in batches
    #[serde(default = "default_queue_capacity")]
    #[validate(range(min = 1))]
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_queue_capacity(),
        }
    }
}

fn default_queue_capacity() -> usize {
    64
}

/// Sink output config
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SinkConfig {
    /// Sink name
    #[validate(length(min = 1))]
    pub name: String,

    /// Sink type
    pub sink_type: SinkType,

    /// Number of workers (one sink instance each) pulling from the queue
    #[serde(default = "default_workers")]
    #[validate(range(min = 1))]
    pub workers: usize,

    /// Type-specific params
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_workers() -> usize {
    1
}

/// Sink type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// Log output (basic)
    Log,
    /// Newline-delimited JSON file (basic)
    File,
    /// TCP output (connection-oriented)
    Network,
}

impl SinkType {
    /// Whether sinks of this type require connect before publish
    pub fn is_connection_oriented(&self) -> bool {
        matches!(self, Self::Network)
    }
}

impl ShipperBlueprint {
    /// Total number of workers across all outputs
    pub fn total_workers(&self) -> usize {
        self.outputs.iter().map(|o| o.workers).sum()
    }
}
