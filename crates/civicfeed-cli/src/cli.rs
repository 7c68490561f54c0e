//! Command-line interface definition.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// civicfeed - civic event ingestion and moderation
#[derive(Debug, Parser)]
#[command(name = "civicfeed")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "CIVICFEED_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub debug: bool,

    // --- Overrides for config.toml ---
    /// Feed sources as a JSON array of {key, name, url}
    #[arg(long, env = "CIVICFEED_FEED_SOURCES", global = true, hide_env_values = true)]
    pub feed_sources: Option<String>,

    /// Shared secret for the ingestion trigger
    #[arg(long, env = "CIVICFEED_TRIGGER_SECRET", global = true, hide_env_values = true)]
    pub trigger_secret: Option<String>,

    /// Bearer token identifying administrators
    #[arg(long, env = "CIVICFEED_ADMIN_TOKEN", global = true, hide_env_values = true)]
    pub admin_token: Option<String>,

    /// Secret the auth gateway sends with user identity headers
    #[arg(long, env = "CIVICFEED_GATEWAY_SECRET", global = true, hide_env_values = true)]
    pub gateway_secret: Option<String>,

    /// JSON snapshot file for the event store
    #[arg(long, env = "CIVICFEED_STORE_PATH", global = true)]
    pub store_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP API and, optionally, scheduled ingestion
    Serve {
        /// Address to listen on
        #[arg(long, env = "CIVICFEED_BIND")]
        bind: Option<SocketAddr>,

        /// Run ingestion every N seconds
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Run one ingestion pass and print the report
    Ingest,

    /// Normalize a local iCalendar file and print the admitted entries
    Normalize {
        /// Path to the .ics file
        file: PathBuf,

        /// Also list entries the normalizer skipped
        #[arg(long)]
        show_skipped: bool,

        /// Admit entries regardless of their start time
        #[arg(long)]
        no_window: bool,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration, secrets redacted
    Dump,

    /// Validate configuration
    Validate,

    /// Show configuration file path
    Path,
}
