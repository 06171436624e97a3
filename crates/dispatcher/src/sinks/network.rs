//! NetworkSink - connection-oriented TCP streaming

use async_trait::async_trait;
use contracts::{BatchHandle, Client, ContractError, Event, NetworkClient, PublishError};
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

/// Serialization format for network transmission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkFormat {
    /// Newline-delimited JSON (human-readable, larger)
    #[default]
    Json,
    /// Bincode frames prefixed with a big-endian u32 length (binary, compact)
    Bincode,
}

/// Configuration for NetworkSink
#[derive(Debug, Clone)]
pub struct NetworkSinkConfig {
    /// Target address (`host:port`)
    pub addr: String,
    /// Serialization format
    pub format: NetworkFormat,
    /// Upper bound for a single connect attempt
    pub connect_timeout: Duration,
    /// Upper bound for writing and flushing one batch
    pub send_timeout: Duration,
}

impl NetworkSinkConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, String> {
        let addr = params
            .get("addr")
            .filter(|a| !a.is_empty())
            .ok_or_else(|| "missing 'addr' parameter".to_string())?
            .clone();

        let format = match params.get("format").map(String::as_str) {
            Some("bincode") => NetworkFormat::Bincode,
            Some("json") | None => NetworkFormat::Json,
            Some(other) => return Err(format!("unknown format '{}'", other)),
        };

        let connect_timeout = match params.get("connect_timeout_ms") {
            Some(ms) => ms
                .parse()
                .map(Duration::from_millis)
                .map_err(|e| format!("invalid connect_timeout_ms '{}': {}", ms, e))?,
            None => Duration::from_secs(5),
        };

        let send_timeout = match params.get("send_timeout_ms") {
            Some(ms) => match ms.parse::<u64>() {
                Ok(0) => return Err("send_timeout_ms must be greater than 0".to_string()),
                Ok(ms) => Duration::from_millis(ms),
                Err(e) => return Err(format!("invalid send_timeout_ms '{}': {}", ms, e)),
            },
            None => Duration::from_secs(30),
        };

        Ok(Self {
            addr,
            format,
            connect_timeout,
            send_timeout,
        })
    }
}

/// Sink that streams events over a TCP connection
pub struct NetworkSink {
    name: String,
    config: NetworkSinkConfig,
    stream: Option<BufWriter<TcpStream>>,
}

impl NetworkSink {
    /// Create a new, not yet connected, NetworkSink
    pub fn new(name: impl Into<String>, config: NetworkSinkConfig) -> Self {
        Self {
            name: name.into(),
            config,
            stream: None,
        }
    }

    /// Create from params (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, ContractError> {
        let name = name.into();
        let config = NetworkSinkConfig::from_params(params)
            .map_err(|e| ContractError::config_validation(format!("outputs[{name}].params"), e))?;
        Ok(Self::new(name, config))
    }

    /// Whether a connection is currently held
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn encode(&self, events: &[Event]) -> Result<Vec<u8>, String> {
        let mut buf = Vec::new();
        for event in events {
            match self.config.format {
                NetworkFormat::Json => {
                    serde_json::to_writer(&mut buf, event)
                        .map_err(|e| format!("json error: {}", e))?;
                    buf.push(b'\n');
                }
                NetworkFormat::Bincode => {
                    let frame =
                        bincode::serialize(event).map_err(|e| format!("bincode error: {}", e))?;
                    let len = u32::try_from(frame.len())
                        .map_err(|_| format!("frame too large: {} bytes", frame.len()))?;
                    buf.extend_from_slice(&len.to_be_bytes());
                    buf.extend_from_slice(&frame);
                }
            }
        }
        Ok(buf)
    }

    /// Write and flush `data`, giving up after `limit`
    async fn transmit(
        stream: &mut BufWriter<TcpStream>,
        data: &[u8],
        limit: Duration,
    ) -> std::io::Result<()> {
        let send = async {
            stream.write_all(data).await?;
            stream.flush().await
        };
        timeout(limit, send).await.map_err(|_| {
            std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("send timed out after {:?}", limit),
            )
        })?
    }
}

#[async_trait]
impl Client for NetworkSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "network_sink_publish", skip_all)]
    async fn publish(&mut self, batch: BatchHandle) -> Result<(), PublishError> {
        let data = match self.encode(batch.events()) {
            Ok(data) => data,
            Err(e) => {
                return Err(PublishError::returned(
                    batch,
                    ContractError::sink_write(&self.name, e),
                ))
            }
        };

        let Some(stream) = self.stream.as_mut() else {
            return Err(PublishError::returned(
                batch,
                ContractError::sink_not_connected(&self.name),
            ));
        };

        match Self::transmit(stream, &data, self.config.send_timeout).await {
            Ok(()) => {
                debug!(sink = %self.name, events = batch.len(), bytes = data.len(), "Sent");
                Ok(())
            }
            Err(e) => {
                // partial writes leave the stream unusable until the next connect
                self.stream = None;
                warn!(sink = %self.name, error = %e, "TCP send failed, dropping connection");
                Err(PublishError::returned(
                    batch,
                    ContractError::sink_write(&self.name, e.to_string()),
                ))
            }
        }
    }

    #[instrument(name = "network_sink_close", skip_all)]
    async fn close(&mut self) -> Result<(), ContractError> {
        if let Some(mut stream) = self.stream.take() {
            timeout(self.config.send_timeout, stream.shutdown())
                .await
                .map_err(|_| ContractError::sink_close(&self.name, "shutdown timed out"))?
                .map_err(|e| ContractError::sink_close(&self.name, e.to_string()))?;
        }
        debug!(sink = %self.name, "NetworkSink closed");
        Ok(())
    }
}

#[async_trait]
impl NetworkClient for NetworkSink {
    #[instrument(name = "network_sink_connect", skip_all)]
    async fn connect(&mut self) -> Result<(), ContractError> {
        // drop any previous connection before dialing again
        self.stream = None;

        let stream = timeout(
            self.config.connect_timeout,
            TcpStream::connect(&self.config.addr),
        )
        .await
        .map_err(|_| {
            ContractError::sink_connection(
                &self.name,
                format!(
                    "connect to {} timed out after {:?}",
                    self.config.addr, self.config.connect_timeout
                ),
            )
        })?
        .map_err(|e| {
            ContractError::sink_connection(
                &self.name,
                format!("connect to {} failed: {}", self.config.addr, e),
            )
        })?;

        stream.set_nodelay(true)?;
        debug!(sink = %self.name, target = %self.config.addr, "NetworkSink connected");

        self.stream = Some(BufWriter::new(stream));
        Ok(())
    }
}
