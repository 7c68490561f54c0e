//! Serve command: runs the HTTP API in the foreground.
//!
//! Wires the store, the fetcher, the ingestion pipeline, the moderation
//! service and, when an interval is configured, the scheduler.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use civicfeed_feeds::HttpFeedFetcher;
use civicfeed_server::{
    AppState, EventStore, Ingestor, ModerationService, Scheduler, SchedulerConfig, router,
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use super::open_store;
use crate::config::CliConfig;
use crate::error::CliResult;

/// Serves until SIGINT or SIGTERM.
pub async fn run(config: &CliConfig, bind: Option<SocketAddr>, interval: Option<u64>) -> CliResult<()> {
    config.validate()?;
    let pipeline = config.pipeline_config();
    let moderation_config = config.moderation_config();

    if pipeline.sources.is_empty() {
        warn!("No feed sources configured");
    }
    if pipeline.trigger_secret.is_none() {
        warn!("No trigger secret configured, the ingestion endpoint is disabled");
    }
    if moderation_config.admin_token.is_none() {
        warn!("No admin token configured, status changes are unavailable");
    }
    if moderation_config.gateway_secret.is_none() {
        warn!("No gateway secret configured, user identity headers are rejected");
    }

    let store = open_store(config.server.store_path.as_deref()).await?;
    let fetcher = HttpFeedFetcher::new(pipeline.fetcher_config())?;
    let source_count = pipeline.sources.len();
    let ingestor = Ingestor::new(pipeline, Arc::new(fetcher), store.clone());
    let moderation = Arc::new(ModerationService::new(store.clone(), moderation_config));

    let scheduler = interval.or(config.server.ingest_interval_secs).map(|secs| {
        let scheduler = Scheduler::new(SchedulerConfig::new(Duration::from_secs(secs)));
        let handle = scheduler.handle();
        let task = tokio::spawn(scheduler.run(ingestor.clone()));
        info!(interval_secs = secs, "Scheduled ingestion enabled");
        (handle, task)
    });

    let app = router(AppState::new(ingestor, moderation));
    let addr = bind.unwrap_or(config.server.bind);
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, sources = source_count, "civicfeed listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some((handle, task)) = scheduler {
        if handle.stop().await.is_err() {
            warn!("Scheduler already stopped");
        }
        if let Err(e) = task.await {
            error!(error = %e, "Scheduler task failed");
        }
    }

    store.flush().await?;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
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
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
