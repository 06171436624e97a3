//! `validate` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    queue_capacity: usize,
    output_count: usize,
    worker_count: usize,
    network_outputs: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);

            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: (!warnings.is_empty()).then_some(warnings),
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    queue_capacity: blueprint.queue.capacity,
                    output_count: blueprint.outputs.len(),
                    worker_count: blueprint.total_workers(),
                    network_outputs: blueprint
                        .outputs
                        .iter()
                        .filter(|o| o.sink_type.is_connection_oriented())
                        .count(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &contracts::ShipperBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    if blueprint.queue.capacity < blueprint.total_workers() {
        warnings.push(format!(
            "queue capacity {} is below the total worker count {} - workers will idle",
            blueprint.queue.capacity,
            blueprint.total_workers()
        ));
    }

    if blueprint
        .outputs
        .iter()
        .all(|o| o.sink_type.is_connection_oriented())
    {
        warnings.push(
            "all outputs are network outputs - batches circulate until one connects".to_string(),
        );
    }

    for output in &blueprint.outputs {
        if !output.sink_type.is_connection_oriented() && output.params.contains_key("addr") {
            warnings.push(format!(
                "output '{}' sets 'addr' but is not a network output",
                output.name
            ));
        }
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Queue capacity: {}", summary.queue_capacity);
            println!("  Outputs: {}", summary.output_count);
            println!("  Workers: {}", summary.worker_count);
            println!("  Network outputs: {}", summary.network_outputs);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\nWarnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args_for(content: &str) -> (tempfile::NamedTempFile, ValidateArgs) {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        let args = ValidateArgs {
            config: file.path().to_path_buf(),
            json: true,
        };
        (file, args)
    }

    #[test]
    fn test_valid_config_summary() {
        let (_file, args) = args_for(
            r#"
[queue]
capacity = 1

[[outputs]]
name = "upstream"
sink_type = "network"
workers = 2
[outputs.params]
addr = "127.0.0.1:5044"
"#,
        );

        let result = validate_config(&args);
        assert!(result.valid);
        let summary = result.summary.unwrap();
        assert_eq!(summary.worker_count, 2);
        assert_eq!(summary.network_outputs, 1);
        assert_eq!(result.warnings.unwrap().len(), 2);
    }

    #[test]
    fn test_invalid_config_reports_error() {
        let (_file, args) = args_for(
            r#"
[[outputs]]
name = "upstream"
sink_type = "network"
"#,
        );

        let result = validate_config(&args);
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("addr"));
        assert!(run_validate(&args).is_err());
    }
}
