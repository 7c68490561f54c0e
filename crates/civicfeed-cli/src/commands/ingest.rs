//! One-shot ingestion.

use std::sync::Arc;

use civicfeed_feeds::HttpFeedFetcher;
use civicfeed_server::Ingestor;
use tracing::info;

use super::open_store;
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};

/// Runs the pipeline once against the configured store and prints the report.
///
/// Fails when every configured source failed or the store could not be
/// saved.
pub async fn run(config: &CliConfig) -> CliResult<()> {
    config.validate()?;
    let pipeline = config.pipeline_config();
    let fetcher = HttpFeedFetcher::new(pipeline.fetcher_config())?;
    let store = open_store(config.server.store_path.as_deref()).await?;

    info!(sources = pipeline.sources.len(), "Running ingestion");
    let report = Ingestor::new(pipeline, Arc::new(fetcher), store).run().await;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if let Some(message) = report.persist_error {
        return Err(CliError::Persist(message));
    }
    if report.all_failed() {
        return Err(CliError::AllSourcesFailed(report.sources.len()));
    }
    Ok(())
}
