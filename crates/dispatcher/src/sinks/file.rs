//! FileSink - appends events to a newline-delimited JSON file

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat};
use contracts::{BatchHandle, Client, ContractError, Event, PublishError};
use serde::Serialize;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::{debug, error, instrument};

/// Configuration for FileSink
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    /// Base output directory
    pub base_path: PathBuf,
}

impl FileSinkConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let base_path = params
            .get("base_path")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./output"));

        Self { base_path }
    }
}

/// One line of output
#[derive(Serialize)]
struct FileRecord<'a> {
    #[serde(rename = "@timestamp")]
    timestamp: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    fields: &'a BTreeMap<String, String>,
    message: Cow<'a, str>,
}

impl<'a> FileRecord<'a> {
    fn from_event(event: &'a Event) -> Self {
        let timestamp = DateTime::from_timestamp_nanos(event.timestamp_ns as i64)
            .to_rfc3339_opts(SecondsFormat::Millis, true);

        Self {
            timestamp,
            fields: &event.fields,
            message: String::from_utf8_lossy(&event.payload),
        }
    }
}

/// Sink that appends events to `<base_path>/<name>.ndjson`
pub struct FileSink {
    name: String,
    writer: Option<BufWriter<File>>,
}

impl FileSink {
    /// Create a new FileSink, opening the output file in append mode
    pub fn new(name: impl Into<String>, config: FileSinkConfig) -> std::io::Result<Self> {
        let name = name.into();
        fs::create_dir_all(&config.base_path)?;

        let path = config.base_path.join(format!("{name}.ndjson"));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        debug!(sink = %name, path = %path.display(), "FileSink opened");

        Ok(Self {
            name,
            writer: Some(BufWriter::new(file)),
        })
    }

    /// Create from params map (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> std::io::Result<Self> {
        let config = FileSinkConfig::from_params(params);
        Self::new(name, config)
    }

    fn write_events(writer: &mut BufWriter<File>, events: &[Event]) -> std::io::Result<()> {
        for event in events {
            serde_json::to_writer(&mut *writer, &FileRecord::from_event(event))
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            writer.write_all(b"\n")?;
        }
        writer.flush()
    }
}

#[async_trait]
impl Client for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "file_sink_publish", skip_all)]
    async fn publish(&mut self, batch: BatchHandle) -> Result<(), PublishError> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(PublishError::returned(
                batch,
                ContractError::sink_not_connected(&self.name),
            ));
        };

        match Self::write_events(writer, batch.events()) {
            Ok(()) => Ok(()),
            Err(e) => {
                error!(sink = %self.name, error = %e, "Write failed");
                Err(PublishError::returned(
                    batch,
                    ContractError::sink_write(&self.name, e.to_string()),
                ))
            }
        }
    }

    #[instrument(name = "file_sink_close", skip_all)]
    async fn close(&mut self) -> Result<(), ContractError> {
        if let Some(mut writer) = self.writer.take() {
            writer
                .flush()
                .map_err(|e| ContractError::sink_close(&self.name, e.to_string()))?;
        }
        debug!(sink = %self.name, "FileSink closed");
        Ok(())
    }
}
