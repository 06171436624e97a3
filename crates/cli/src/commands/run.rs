//! `run` command implementation.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{error, info};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    info!(
        capacity = blueprint.queue.capacity,
        outputs = blueprint.outputs.len(),
        workers = blueprint.total_workers(),
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    let pipeline_config = PipelineConfig {
        blueprint,
        batches: (args.batches > 0).then_some(args.batches),
        batch_size: args.batch_size,
        interval: Duration::from_millis(args.interval_ms),
        max_redeliveries: (args.max_redeliveries > 0).then_some(args.max_redeliveries),
        shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
        metrics_port: (args.metrics_port > 0).then_some(args.metrics_port),
    };

    info!("Starting pipeline...");
    let stats = Pipeline::new(pipeline_config)
        .run(shutdown_signal())
        .await
        .context("Pipeline execution failed")?;

    info!(
        batches_sent = stats.batches_sent(),
        events_sent = stats.events_sent(),
        duration_secs = stats.duration.as_secs_f64(),
        "Pipeline finished"
    );
    stats.print_summary();

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &contracts::ShipperBlueprint) {
    println!("\n=== Configuration Summary ===\n");
    println!("Queue capacity: {}", blueprint.queue.capacity);
    println!("\nOutputs ({}):", blueprint.outputs.len());
    for output in &blueprint.outputs {
        let kind = if output.sink_type.is_connection_oriented() {
            "reconnecting"
        } else {
            "basic"
        };
        println!(
            "  - {} ({:?}, {}) x{}",
            output.name, output.sink_type, kind, output.workers
        );
        let mut params: Vec<_> = output.params.iter().collect();
        params.sort();
        for (key, value) in params {
            println!("      {key} = {value}");
        }
    }
    println!();
}
