//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Events Shipper - deliver event batches to log, file and network outputs
#[derive(Parser, Debug)]
#[command(
    name = "events-shipper",
    author,
    version,
    about = "Event batch delivery to pluggable outputs",
    long_about = "Drains a shared delivery queue into the configured outputs.\n\n\
                  Each output runs one or more workers. Network outputs reconnect \n\
                  on failure and hand pending batches back for redelivery."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "EVENTS_SHIPPER_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "EVENTS_SHIPPER_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the outputs against a synthetic event producer
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "config.toml",
        env = "EVENTS_SHIPPER_CONFIG"
    )]
    pub config: PathBuf,

    /// Number of batches to produce (0 = until interrupted)
    #[arg(long, default_value = "100", env = "EVENTS_SHIPPER_BATCHES")]
    pub batches: u64,

    /// Events per produced batch
    #[arg(long, default_value = "32", env = "EVENTS_SHIPPER_BATCH_SIZE")]
    pub batch_size: usize,

    /// Delay between produced batches in milliseconds
    #[arg(long, default_value = "10", env = "EVENTS_SHIPPER_INTERVAL_MS")]
    pub interval_ms: u64,

    /// Drop a batch once it has been handed back this many times (0 = never)
    #[arg(long, default_value = "0", env = "EVENTS_SHIPPER_MAX_REDELIVERIES")]
    pub max_redeliveries: u32,

    /// Seconds to wait for workers after shutdown starts
    #[arg(long, default_value = "5", env = "EVENTS_SHIPPER_SHUTDOWN_TIMEOUT")]
    pub shutdown_timeout: u64,

    /// Validate configuration and exit without running
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "9000", env = "EVENTS_SHIPPER_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
