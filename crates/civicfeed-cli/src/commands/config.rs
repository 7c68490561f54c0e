//! Configuration commands.

use crate::config::CliConfig;
use crate::error::{CliError, CliResult};

/// Prints the effective configuration with secrets redacted.
pub fn dump(config: &CliConfig) -> CliResult<()> {
    let toml_str = toml::to_string_pretty(&config.redacted())
        .map_err(|e| CliError::config(format!("failed to serialize config: {}", e)))?;
    println!("# config.toml ({})", CliConfig::default_path().display());
    println!("{}", toml_str);
    Ok(())
}

/// Validates the configuration.
pub fn validate(config: &CliConfig) -> CliResult<()> {
    config.validate()?;
    if config.feeds.is_empty() {
        println!("Warning: no feeds configured; ingestion will only run the expiry sweep.");
    }
    if config.pipeline.trigger_secret.is_none() {
        println!("Warning: no trigger secret; GET /api/ingest will reject every call.");
    }
    println!("Configuration is valid ({} feeds).", config.feeds.len());
    Ok(())
}

/// Shows the configuration file path.
pub fn path() -> CliResult<()> {
    println!("config: {}", CliConfig::default_path().display());
    Ok(())
}
