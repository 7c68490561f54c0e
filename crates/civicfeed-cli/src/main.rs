//! civicfeed CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use civicfeed_core::{TracingConfig, init_tracing};
use tracing::Level;

use civicfeed_cli::cli::{Cli, Command, ConfigAction};
use civicfeed_cli::commands;
use civicfeed_cli::config::CliConfig;
use civicfeed_cli::error::CliResult;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let tracing_config = match (&cli.command, cli.debug) {
        (_, true) => TracingConfig::cli_debug(),
        (Command::Serve { .. }, false) => TracingConfig::service(),
        _ => TracingConfig::default().with_level(Level::WARN),
    };
    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("warning: {}", e);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    if let Command::Config {
        action: ConfigAction::Path,
    } = cli.command
    {
        return commands::config::path();
    }

    let config = CliConfig::resolve(&cli)?;

    match cli.command {
        Command::Serve { bind, interval } => commands::serve::run(&config, bind, interval).await,
        Command::Ingest => commands::ingest::run(&config).await,
        Command::Normalize {
            file,
            show_skipped,
            no_window,
        } => commands::normalize::run(&config, &file, show_skipped, no_window),
        Command::Config { action } => match action {
            ConfigAction::Dump => commands::config::dump(&config),
            ConfigAction::Validate => commands::config::validate(&config),
            ConfigAction::Path => commands::config::path(),
        },
    }
}
