//! Config validation
//!
//! Rules:
//! - field constraints declared on the blueprint types (`validator` derive)
//! - at least one output
//! - output names unique
//! - network outputs carry a usable `addr`
//! - file outputs do not point at an empty `base_path`

use std::collections::HashSet;

use contracts::{ContractError, ShipperBlueprint, SinkConfig, SinkType};
use ::validator::{Validate, ValidationErrors, ValidationErrorsKind};

/// Validate a ShipperBlueprint
///
/// Returns the first error encountered.
pub fn validate(blueprint: &ShipperBlueprint) -> Result<(), ContractError> {
    if let Err(errors) = blueprint.validate() {
        let (field, message) = first_violation(&errors, "")
            .unwrap_or_else(|| ("blueprint".to_string(), errors.to_string()));
        return Err(ContractError::config_validation(field, message));
    }

    if blueprint.outputs.is_empty() {
        return Err(ContractError::config_validation(
            "outputs",
            "at least one output is required",
        ));
    }

    validate_output_names(blueprint)?;
    for (idx, output) in blueprint.outputs.iter().enumerate() {
        validate_output_params(idx, output)?;
    }
    Ok(())
}

/// Flatten derive errors into the first `path.to.field` and its message
fn first_violation(errors: &ValidationErrors, prefix: &str) -> Option<(String, String)> {
    let mut fields: Vec<_> = errors.errors().iter().collect();
    fields.sort_by(|a, b| a.0.cmp(b.0));

    for (field, kind) in fields {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };
        let found = match kind {
            ValidationErrorsKind::Field(list) => list
                .first()
                .map(|err| (path.clone(), err.to_string())),
            ValidationErrorsKind::Struct(inner) => first_violation(inner, &path),
            ValidationErrorsKind::List(items) => items
                .iter()
                .find_map(|(idx, inner)| first_violation(inner, &format!("{path}[{idx}]"))),
        };
        if found.is_some() {
            return found;
        }
    }
    None
}

fn validate_output_names(blueprint: &ShipperBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for output in &blueprint.outputs {
        if !seen.insert(output.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("outputs[name={}]", output.name),
                "duplicate output name",
            ));
        }
    }
    Ok(())
}

fn validate_output_params(idx: usize, output: &SinkConfig) -> Result<(), ContractError> {
    match output.sink_type {
        SinkType::Log => Ok(()),
        SinkType::File => match output.params.get("base_path") {
            Some(path) if path.trim().is_empty() => Err(ContractError::config_validation(
                format!("outputs[{idx}].params.base_path"),
                "base_path cannot be empty",
            )),
            _ => Ok(()),
        },
        SinkType::Network => {
            let addr = output
                .params
                .get("addr")
                .map(|a| a.trim())
                .filter(|a| !a.is_empty())
                .ok_or_else(|| {
                    ContractError::config_validation(
                        format!("outputs[{idx}].params.addr"),
                        "network output requires 'addr'",
                    )
                })?;

            // port must be present, host may be a name
            if !matches!(addr.rsplit_once(':'), Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok())
            {
                return Err(ContractError::config_validation(
                    format!("outputs[{idx}].params.addr"),
                    format!("'{addr}' is not a host:port address"),
                ));
            }

            if let Some(other) = output
                .params
                .get("format")
                .filter(|f| !matches!(f.as_str(), "json" | "bincode"))
            {
                return Err(ContractError::config_validation(
                    format!("outputs[{idx}].params.format"),
                    format!("unknown format '{other}', expected json or bincode"),
                ));
            }

            for key in ["connect_timeout_ms", "send_timeout_ms"] {
                if let Some(ms) = output.params.get(key) {
                    if !matches!(ms.parse::<u64>(), Ok(ms) if ms > 0) {
                        return Err(ContractError::config_validation(
                            format!("outputs[{idx}].params.{key}"),
                            format!("'{ms}' is not a positive number of milliseconds"),
                        ));
                    }
                }
            }
            Ok(())
        }
    }
}
