//! The ingestion pipeline.
//!
//! One run fetches every configured feed in turn, normalizes and filters its
//! entries, upserts the survivors and finally sweeps stale imports. A failing
//! feed is recorded in the report and never stops the feeds after it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use civicfeed_feeds::{FeedFetcher, FeedSource, SafetyPolicy, normalize_feed};
use civicfeed_protocol::{IngestionReport, SourceResult};
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::config::PipelineConfig;
use crate::reconcile::{expire_stale, upsert_feed};
use crate::store::EventStore;

/// Error code recorded when a store write aborts a feed.
pub const STORE_ERROR_CODE: &str = "store_error";

/// Runs one ingestion pass over every configured source.
///
/// `now` is the run start: it anchors the admission window, is stamped as
/// `last_seen_at` on every write and is the reference for the expiry sweep.
pub async fn run_ingestion(
    config: &PipelineConfig,
    fetcher: &dyn FeedFetcher,
    store: &dyn EventStore,
    now: DateTime<Utc>,
) -> IngestionReport {
    let span = info_span!("ingestion", started_at = %now, sources = config.sources.len());

    async move {
        let policy = config.safety_policy();
        let mut report = IngestionReport::new(now, config.grace_period.num_days());

        for source in &config.sources {
            let result = ingest_source(source, &policy, fetcher, store, now)
                .instrument(info_span!("feed", key = %source.key))
                .await;
            report.upserted += result.upserted;
            report.sources.push(result);
        }

        match expire_stale(store, now, config.grace_period).await {
            Ok(expired) => report.expired = expired,
            Err(e) => {
                error!(error = %e, "Expiry sweep failed");
                report.expiry_error = Some(e.to_string());
            }
        }

        if let Err(e) = store.flush().await {
            error!(error = %e, "Failed to persist store after ingestion");
            report.persist_error = Some(e.to_string());
        }

        let failed = report.failed_sources().count();
        if report.all_failed() {
            warn!(failed, "Every source failed");
        }
        info!(
            upserted = report.upserted,
            expired = report.expired,
            failed,
            "Ingestion finished"
        );
        report
    }
    .instrument(span)
    .await
}

async fn ingest_source(
    source: &FeedSource,
    policy: &SafetyPolicy,
    fetcher: &dyn FeedFetcher,
    store: &dyn EventStore,
    now: DateTime<Utc>,
) -> SourceResult {
    let mut result = SourceResult::new(&source.key, &source.name);

    let body = match fetcher.fetch(&source.url).await {
        Ok(body) => body,
        Err(e) => {
            let e = e.with_source_key(&source.key);
            warn!(code = e.code().as_str(), error = %e, "Fetch failed");
            result.fail(e.code().as_str(), e.message());
            return result;
        }
    };

    let normalization = match normalize_feed(&body) {
        Ok(n) => n,
        Err(e) => {
            warn!(code = e.code().as_str(), error = %e, "Feed did not parse");
            result.fail(e.code().as_str(), e.message());
            return result;
        }
    };

    result.fetched = normalization.parsed;
    result.skipped = normalization.skipped.len();
    for skipped in &normalization.skipped {
        debug!(
            position = skipped.position,
            uid = skipped.uid.as_deref().unwrap_or(""),
            reason = skipped.reason.as_str(),
            "Skipped entry"
        );
    }

    let outcome = policy.apply(normalization.entries, now);
    result.filtered = outcome.filtered();
    result.kept = outcome.admitted.len();
    if result.filtered > 0 {
        debug!(
            out_of_window = outcome.out_of_window,
            screened = outcome.screened,
            over_cap = outcome.over_cap,
            "Filtered entries"
        );
    }

    match upsert_feed(store, source, &outcome.admitted, now).await {
        Ok(summary) => result.upserted = summary.written(),
        Err(e) => {
            warn!(written = e.written, error = %e.source, "Store write aborted feed");
            result.upserted = e.written;
            result.fail(STORE_ERROR_CODE, e.source.to_string());
        }
    }

    info!(
        fetched = result.fetched,
        kept = result.kept,
        upserted = result.upserted,
        "Feed ingested"
    );
    result
}

/// Bundles what a run needs so the scheduler and the trigger can share it.
#[derive(Clone)]
pub struct Ingestor {
    config: Arc<PipelineConfig>,
    fetcher: Arc<dyn FeedFetcher>,
    store: Arc<dyn EventStore>,
}

impl Ingestor {
    pub fn new(
        config: PipelineConfig,
        fetcher: Arc<dyn FeedFetcher>,
        store: Arc<dyn EventStore>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            fetcher,
            store,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs the pipeline now.
    pub async fn run(&self) -> IngestionReport {
        run_ingestion(&self.config, self.fetcher.as_ref(), self.store.as_ref(), Utc::now()).await
    }
}
