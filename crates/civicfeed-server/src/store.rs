//! The shared event store.
//!
//! [`EventStore`] is the set of operations the pipeline and the moderation
//! service need from the backing record store. Every operation is a single
//! atomic write or read; the import upsert is keyed by
//! `(source_key, external_id)` and resolved inside the store, never as a
//! read-then-write in the caller.
//!
//! [`MemoryStore`] keeps everything in memory behind one lock and can persist
//! itself as a JSON snapshot.

use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use civicfeed_core::{
    Comment, CommentStatus, EventRecord, EventStatus, NormalizedEntry, Report,
};
use civicfeed_feeds::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by an [`EventStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: Uuid },

    /// A write lost a race or would break a uniqueness rule.
    #[error("conflict: {message}")]
    Conflict { message: String },

    #[error("store backend error: {0}")]
    Backend(String),

    #[error("snapshot IO error: {0}")]
    Io(#[from] io::Error),

    #[error("snapshot JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(kind: &'static str, id: Uuid) -> Self {
        Self::NotFound { kind, id }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}

/// What an import upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted(Uuid),
    Updated(Uuid),
}

impl UpsertOutcome {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Inserted(id) | Self::Updated(id) => *id,
        }
    }
}

/// Operations on the shared event store.
pub trait EventStore: Send + Sync {
    /// Inserts or fully replaces the import keyed by `(source_key, entry.external_id)`.
    fn upsert_import<'a>(
        &'a self,
        source_key: &'a str,
        source_name: &'a str,
        entry: &'a NormalizedEntry,
        seen_at: DateTime<Utc>,
    ) -> BoxFuture<'a, StoreResult<UpsertOutcome>>;

    /// Marks imports last seen before `seen_before` as inactive.
    ///
    /// Hidden and already inactive records are left alone. Returns the number
    /// of records changed.
    fn expire_imports(&self, seen_before: DateTime<Utc>) -> BoxFuture<'_, StoreResult<usize>>;

    /// Inserts an organizer-submitted event.
    fn insert_event(&self, event: EventRecord) -> BoxFuture<'_, StoreResult<EventRecord>>;

    fn get_event(&self, id: Uuid) -> BoxFuture<'_, StoreResult<Option<EventRecord>>>;

    /// All events, soonest first; undated events last.
    fn list_events(&self) -> BoxFuture<'_, StoreResult<Vec<EventRecord>>>;

    /// Sets an event's status if it is currently `from`.
    ///
    /// Fails with [`StoreError::Conflict`] if the status changed meanwhile.
    fn transition_event(
        &self,
        id: Uuid,
        from: EventStatus,
        to: EventStatus,
    ) -> BoxFuture<'_, StoreResult<EventRecord>>;

    /// Stores a report and bumps the event's report counters.
    fn insert_report(&self, report: Report) -> BoxFuture<'_, StoreResult<EventRecord>>;

    fn list_reports(&self, event_id: Uuid) -> BoxFuture<'_, StoreResult<Vec<Report>>>;

    fn insert_comment(&self, comment: Comment) -> BoxFuture<'_, StoreResult<Comment>>;

    fn get_comment(&self, id: Uuid) -> BoxFuture<'_, StoreResult<Option<Comment>>>;

    /// Comments of an event, oldest first.
    fn list_comments(&self, event_id: Uuid) -> BoxFuture<'_, StoreResult<Vec<Comment>>>;

    fn set_comment_status(
        &self,
        id: Uuid,
        status: CommentStatus,
    ) -> BoxFuture<'_, StoreResult<Comment>>;

    /// Removes a comment permanently, returning it.
    fn delete_comment(&self, id: Uuid) -> BoxFuture<'_, StoreResult<Comment>>;

    /// Persists pending state, if the store has anywhere to persist it.
    fn flush(&self) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// On-disk form of a [`MemoryStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub events: Vec<EventRecord>,
    pub reports: Vec<Report>,
    pub comments: Vec<Comment>,
}

#[derive(Debug, Default)]
struct StoreData {
    events: HashMap<Uuid, EventRecord>,
    /// Unique index over `(source_key, external_id)`.
    imports: HashMap<(String, String), Uuid>,
    reports: Vec<Report>,
    comments: HashMap<Uuid, Comment>,
}

impl StoreData {
    fn from_snapshot(snapshot: Snapshot) -> StoreResult<Self> {
        let mut data = Self::default();
        for event in snapshot.events {
            if let Some((key, external_id)) = event.reconciliation_key() {
                let index_key = (key.to_string(), external_id.to_string());
                if data.imports.insert(index_key, event.id).is_some() {
                    return Err(StoreError::conflict(format!(
                        "snapshot holds two imports for ({}, {})",
                        key, external_id
                    )));
                }
            }
            data.events.insert(event.id, event);
        }
        data.reports = snapshot.reports;
        data.comments = snapshot.comments.into_iter().map(|c| (c.id, c)).collect();
        Ok(data)
    }

    fn to_snapshot(&self) -> Snapshot {
        let mut events: Vec<_> = self.events.values().cloned().collect();
        events.sort_by_key(|e| (e.created_at, e.id));
        let mut comments: Vec<_> = self.comments.values().cloned().collect();
        comments.sort_by_key(|c| (c.created_at, c.id));
        Snapshot {
            events,
            reports: self.reports.clone(),
            comments,
        }
    }

    fn event_mut(&mut self, id: Uuid) -> StoreResult<&mut EventRecord> {
        self.events
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("event", id))
    }

    fn comment_mut(&mut self, id: Uuid) -> StoreResult<&mut Comment> {
        self.comments
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("comment", id))
    }
}

/// In-memory [`EventStore`] with optional JSON snapshot persistence.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<StoreData>,
    snapshot_path: Option<PathBuf>,
    /// Held from taking a snapshot until it is on disk, so writes land in
    /// state order.
    save_lock: Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a store backed by a snapshot file.
    ///
    /// A missing file yields an empty store; [`EventStore::flush`] creates it.
    pub async fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let data = match tokio::fs::read(&path).await {
            Ok(bytes) => StoreData::from_snapshot(serde_json::from_slice(&bytes)?)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No snapshot yet, starting empty");
                StoreData::default()
            }
            Err(e) => return Err(e.into()),
        };

        info!(path = %path.display(), events = data.events.len(), "Opened event store");
        Ok(Self {
            data: RwLock::new(data),
            snapshot_path: Some(path),
            save_lock: Mutex::new(()),
        })
    }

    /// Builds a store from an existing snapshot, without persistence.
    pub fn from_snapshot(snapshot: Snapshot) -> StoreResult<Self> {
        Ok(Self {
            data: RwLock::new(StoreData::from_snapshot(snapshot)?),
            snapshot_path: None,
            save_lock: Mutex::new(()),
        })
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.data.read().await.to_snapshot()
    }

    /// Writes the current state to `path`, replacing it atomically.
    pub async fn save_to(&self, path: &Path) -> StoreResult<()> {
        let _guard = self.save_lock.lock().await;
        let json = serde_json::to_vec_pretty(&self.snapshot().await)?;

        let target = path.to_path_buf();
        tokio::task::spawn_blocking(move || write_replacing(&target, &json))
            .await
            .map_err(|e| StoreError::backend(format!("snapshot writer failed: {}", e)))??;
        debug!(path = %path.display(), "Saved store snapshot");
        Ok(())
    }
}

/// Writes `contents` to a fresh temp file next to `path`, then renames it
/// over `path`.
fn write_replacing(path: &Path, contents: &[u8]) -> StoreResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn sort_events(events: &mut [EventRecord]) {
    events.sort_by(|a, b| {
        (a.event_time.is_none(), a.event_time, a.created_at).cmp(&(
            b.event_time.is_none(),
            b.event_time,
            b.created_at,
        ))
    });
}

impl EventStore for MemoryStore {
    fn upsert_import<'a>(
        &'a self,
        source_key: &'a str,
        source_name: &'a str,
        entry: &'a NormalizedEntry,
        seen_at: DateTime<Utc>,
    ) -> BoxFuture<'a, StoreResult<UpsertOutcome>> {
        Box::pin(async move {
            let mut data = self.data.write().await;
            let index_key = (source_key.to_string(), entry.external_id.clone());

            if let Some(&id) = data.imports.get(&index_key) {
                data.event_mut(id)?.apply_import(source_name, entry, seen_at);
                return Ok(UpsertOutcome::Updated(id));
            }

            let record = EventRecord::from_import(source_key, source_name, entry, seen_at);
            let id = record.id;
            data.imports.insert(index_key, id);
            data.events.insert(id, record);
            Ok(UpsertOutcome::Inserted(id))
        })
    }

    fn expire_imports(&self, seen_before: DateTime<Utc>) -> BoxFuture<'_, StoreResult<usize>> {
        Box::pin(async move {
            let mut data = self.data.write().await;
            let mut expired = 0;
            for event in data.events.values_mut() {
                if event.last_seen_at.is_some_and(|seen| seen < seen_before) && event.expire() {
                    expired += 1;
                }
            }
            Ok(expired)
        })
    }

    fn insert_event(&self, event: EventRecord) -> BoxFuture<'_, StoreResult<EventRecord>> {
        Box::pin(async move {
            if event.is_import() || event.external_id.is_some() {
                return Err(StoreError::conflict(
                    "imported events are only written through upsert",
                ));
            }
            let mut data = self.data.write().await;
            if data.events.contains_key(&event.id) {
                return Err(StoreError::conflict(format!("event {} already exists", event.id)));
            }
            data.events.insert(event.id, event.clone());
            Ok(event)
        })
    }

    fn get_event(&self, id: Uuid) -> BoxFuture<'_, StoreResult<Option<EventRecord>>> {
        Box::pin(async move { Ok(self.data.read().await.events.get(&id).cloned()) })
    }

    fn list_events(&self) -> BoxFuture<'_, StoreResult<Vec<EventRecord>>> {
        Box::pin(async move {
            let mut events: Vec<_> = self.data.read().await.events.values().cloned().collect();
            sort_events(&mut events);
            Ok(events)
        })
    }

    fn transition_event(
        &self,
        id: Uuid,
        from: EventStatus,
        to: EventStatus,
    ) -> BoxFuture<'_, StoreResult<EventRecord>> {
        Box::pin(async move {
            let mut data = self.data.write().await;
            let event = data.event_mut(id)?;
            if event.status != from {
                return Err(StoreError::conflict(format!(
                    "event {} is {}, expected {}",
                    id, event.status, from
                )));
            }
            event.status = to;
            Ok(event.clone())
        })
    }

    fn insert_report(&self, report: Report) -> BoxFuture<'_, StoreResult<EventRecord>> {
        Box::pin(async move {
            let mut data = self.data.write().await;
            let event = data.event_mut(report.event_id)?;
            event.report_count = event.report_count.saturating_add(1);
            event.last_reported_at = Some(report.created_at);
            let updated = event.clone();
            data.reports.push(report);
            Ok(updated)
        })
    }

    fn list_reports(&self, event_id: Uuid) -> BoxFuture<'_, StoreResult<Vec<Report>>> {
        Box::pin(async move {
            Ok(self
                .data
                .read()
                .await
                .reports
                .iter()
                .filter(|r| r.event_id == event_id)
                .cloned()
                .collect())
        })
    }

    fn insert_comment(&self, comment: Comment) -> BoxFuture<'_, StoreResult<Comment>> {
        Box::pin(async move {
            let mut data = self.data.write().await;
            if !data.events.contains_key(&comment.event_id) {
                return Err(StoreError::not_found("event", comment.event_id));
            }
            data.comments.insert(comment.id, comment.clone());
            Ok(comment)
        })
    }

    fn get_comment(&self, id: Uuid) -> BoxFuture<'_, StoreResult<Option<Comment>>> {
        Box::pin(async move { Ok(self.data.read().await.comments.get(&id).cloned()) })
    }

    fn list_comments(&self, event_id: Uuid) -> BoxFuture<'_, StoreResult<Vec<Comment>>> {
        Box::pin(async move {
            let mut comments: Vec<_> = self
                .data
                .read()
                .await
                .comments
                .values()
                .filter(|c| c.event_id == event_id)
                .cloned()
                .collect();
            comments.sort_by_key(|c| (c.created_at, c.id));
            Ok(comments)
        })
    }

    fn set_comment_status(
        &self,
        id: Uuid,
        status: CommentStatus,
    ) -> BoxFuture<'_, StoreResult<Comment>> {
        Box::pin(async move {
            let mut data = self.data.write().await;
            let comment = data.comment_mut(id)?;
            comment.status = status;
            Ok(comment.clone())
        })
    }

    fn delete_comment(&self, id: Uuid) -> BoxFuture<'_, StoreResult<Comment>> {
        Box::pin(async move {
            self.data
                .write()
                .await
                .comments
                .remove(&id)
                .ok_or_else(|| StoreError::not_found("comment", id))
        })
    }

    fn flush(&self) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            match &self.snapshot_path {
                Some(path) => self.save_to(path).await,
                None => Ok(()),
            }
        })
    }
}
