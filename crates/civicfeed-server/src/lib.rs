//! civicfeed service: event store, reconciler, ingestion pipeline, moderation
//! and the HTTP API.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use civicfeed_feeds::{FetcherConfig, HttpFeedFetcher};
//! use civicfeed_server::{Ingestor, MemoryStore, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::default();
//!     let fetcher = HttpFeedFetcher::new(FetcherConfig::default())?;
//!     let ingestor = Ingestor::new(config, Arc::new(fetcher), Arc::new(MemoryStore::new()));
//!
//!     let report = ingestor.run().await;
//!     println!("{} records written", report.upserted);
//!     Ok(())
//! }
//! ```

mod config;
mod error;
pub mod http;
mod moderation;
mod pipeline;
mod reconcile;
mod scheduler;
mod store;

pub use config::{
    DEFAULT_COMMENT_COOLDOWN, DEFAULT_COMMENT_DENYLIST, DEFAULT_GRACE_PERIOD_DAYS,
    ModerationConfig, PipelineConfig,
};
pub use error::{ServerError, ServerResult};
pub use http::{AppState, RequestActor, router};
pub use moderation::{ModerationService, POLICY_VIOLATION_MESSAGE};
pub use pipeline::{Ingestor, STORE_ERROR_CODE, run_ingestion};
pub use reconcile::{ReconcileError, UpsertSummary, expire_stale, upsert_feed};
pub use scheduler::{
    Scheduler, SchedulerCommand, SchedulerConfig, SchedulerHandle, SchedulerState,
    SharedSchedulerState,
};
pub use store::{EventStore, MemoryStore, Snapshot, StoreError, StoreResult, UpsertOutcome};
