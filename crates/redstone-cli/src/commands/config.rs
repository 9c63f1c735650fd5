//! Config command - View and validate configuration
//!
//! Provides the `redstone config` CLI command which:
//! 1. Shows the effective configuration (YAML or JSON)
//! 2. Validates it and reports every invalid field
//! 3. Prints the configuration file path

use anyhow::{Context, Result};
use clap::Subcommand;

use redstone_core::config::Config;

use crate::context::AppContext;
use crate::output::{get_formatter, OutputFormat};

const REDACTED: &str = "[REDACTED]";

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show,
    /// Check the configuration for invalid values
    Validate,
    /// Print the configuration file path
    Path,
}

impl ConfigCommand {
    pub async fn execute(&self, ctx: &AppContext, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);

        match self {
            ConfigCommand::Show => {
                let config = redacted(&ctx.config);
                if format.is_json() {
                    let value =
                        serde_json::to_value(&config).context("Failed to serialize config")?;
                    formatter.print_json(&value);
                } else {
                    let yaml = serde_yaml::to_string(&config).context("Failed to serialize config")?;
                    println!("# {}", ctx.config_path.display());
                    print!("{yaml}");
                }
            }
            ConfigCommand::Validate => {
                let errors = ctx.config.validate();
                if format.is_json() {
                    let items: Vec<_> = errors
                        .iter()
                        .map(|e| serde_json::json!({"field": e.field, "message": e.message}))
                        .collect();
                    formatter.print_json(&serde_json::json!({
                        "valid": errors.is_empty(),
                        "errors": items,
                    }));
                } else if errors.is_empty() {
                    formatter.success("Configuration is valid");
                } else {
                    for error in &errors {
                        formatter.error(&format!("{}: {}", error.field, error.message));
                    }
                }
                anyhow::ensure!(
                    errors.is_empty(),
                    "Configuration has {} invalid field(s)",
                    errors.len()
                );
            }
            ConfigCommand::Path => {
                if format.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "path": ctx.config_path.display().to_string(),
                        "exists": ctx.config_path.exists(),
                    }));
                } else {
                    println!("{}", ctx.config_path.display());
                }
            }
        }
        Ok(())
    }
}

/// Copy of the config safe to print
fn redacted(config: &Config) -> Config {
    let mut config = config.clone();
    if config.auth.token.is_some() {
        config.auth.token = Some(REDACTED.to_string());
    }
    config
}
