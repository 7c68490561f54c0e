//! Subcommand implementations.

pub mod config;
pub mod ingest;
pub mod normalize;
pub mod serve;

use std::path::Path;
use std::sync::Arc;

use civicfeed_server::MemoryStore;

use crate::error::CliResult;

/// Opens the event store, persisted when a snapshot path is configured.
pub(crate) async fn open_store(path: Option<&Path>) -> CliResult<Arc<MemoryStore>> {
    let store = match path {
        Some(path) => MemoryStore::open(path).await?,
        None => MemoryStore::new(),
    };
    Ok(Arc::new(store))
}
