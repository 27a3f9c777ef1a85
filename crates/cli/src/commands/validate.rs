//! `validate` command implementation.

use anyhow::{Context, Result};
use blacklist::Blacklist;
use contracts::ScanBlueprint;
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
    concurrency: usize,
    default_scheme: String,
    blacklist_enabled: bool,
    blacklist_rules: usize,
    sink_count: usize,
    server: String,
    max_concurrent: usize,
    max_queue: usize,
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
        return invalid(config_path, format!("File not found: {}", args.config.display()));
    }

    let blueprint = match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => blueprint,
        Err(e) => return invalid(config_path, e.to_string()),
    };

    // Rules are compiled here so bad patterns surface before a scan
    let blacklist = match Blacklist::from_config(&blueprint.blacklist) {
        Ok(blacklist) => blacklist,
        Err(e) => return invalid(config_path, e.to_string()),
    };

    let warnings = collect_warnings(&blueprint);
    ValidationResult {
        valid: true,
        config_path,
        error: None,
        warnings: if warnings.is_empty() {
            None
        } else {
            Some(warnings)
        },
        summary: Some(ConfigSummary {
            version: format!("{:?}", blueprint.version),
            concurrency: blueprint.scan.concurrency,
            default_scheme: blueprint.scan.default_scheme.as_str().to_string(),
            blacklist_enabled: blacklist.is_enabled(),
            blacklist_rules: blacklist.rule_count(),
            sink_count: blueprint.sinks.len(),
            server: format!("{}:{}", blueprint.server.host, blueprint.server.port),
            max_concurrent: blueprint.server.admission.max_concurrent,
            max_queue: blueprint.server.admission.max_queue,
        }),
    }
}

fn invalid(config_path: String, error: String) -> ValidationResult {
    ValidationResult {
        valid: false,
        config_path,
        error: Some(error),
        warnings: None,
        summary: None,
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &ScanBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    if blueprint.sinks.is_empty() {
        warnings.push("No sinks configured - scan results go to the console only".to_string());
    }

    if !blueprint.blacklist.enabled {
        warnings.push("Blacklist disabled - internal addresses are reachable".to_string());
    } else if !blueprint.blacklist.use_defaults {
        warnings.push("Built-in blacklist rules disabled".to_string());
    }

    if blueprint.server.api_key.is_none() {
        warnings.push("server.api_key not set - HTTP API is unauthenticated".to_string());
    }

    if blueprint.probe.ignore_cert_errors {
        warnings.push("probe.ignore_cert_errors is on".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!(
                "  Workers: {} (default scheme {})",
                summary.concurrency, summary.default_scheme
            );
            if summary.blacklist_enabled {
                println!("  Blacklist: {} rules", summary.blacklist_rules);
            } else {
                println!("  Blacklist: disabled");
            }
            println!("  Sinks: {}", summary.sink_count);
            println!(
                "  Server: {} (max {} active, {} queued)",
                summary.server, summary.max_concurrent, summary.max_queue
            );
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    fn args_for(path: PathBuf) -> ValidateArgs {
        ValidateArgs {
            config: path,
            json: true,
        }
    }

    #[test]
    fn test_valid_config_summary() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[blacklist]
use_defaults = false
patterns = ["10.0.0.0/8", "*.internal"]

[server]
api_key = "secret"
"#
        )
        .unwrap();

        let result = validate_config(&args_for(file.path().to_path_buf()));
        assert!(result.valid, "error: {:?}", result.error);
        let summary = result.summary.unwrap();
        assert_eq!(summary.blacklist_rules, 2);
        assert!(result
            .warnings
            .unwrap()
            .iter()
            .any(|w| w.contains("Built-in blacklist")));
    }

    #[test]
    fn test_bad_pattern_is_invalid() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[blacklist]
patterns = ["bad[pattern"]
"#
        )
        .unwrap();

        let result = validate_config(&args_for(file.path().to_path_buf()));
        assert!(!result.valid);
        assert!(result.error.is_some());
    }

    #[test]
    fn test_missing_file() {
        let result = validate_config(&args_for(PathBuf::from("/nonexistent/snir.toml")));
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("File not found"));
    }
}
