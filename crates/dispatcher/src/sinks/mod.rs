//! Sink implementations
//!
//! `LogSink` and `FileSink` are publish-only; `NetworkSink` must connect
//! before publishing.

mod file;
mod log;
mod network;

pub use self::file::{FileSink, FileSinkConfig};
pub use self::log::LogSink;
pub use self::network::{NetworkFormat, NetworkSink, NetworkSinkConfig};
