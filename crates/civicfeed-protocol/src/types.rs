//! Ingestion report and moderation request bodies.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use civicfeed_core::{
    Actor, CommentStatus, EventRecord, EventStatus, ReportReason, SourceType, is_event_steward,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a source failed during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceError {
    /// Stable error category, e.g. `timeout` or `invalid_content`.
    pub code: String,
    pub message: String,
}

/// Outcome of one configured source within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceResult {
    pub key: String,
    pub name: String,
    /// Entries found in the fetched document.
    pub fetched: usize,
    /// Entries dropped by the normalizer (missing or duplicate UID).
    pub skipped: usize,
    /// Entries dropped by the safety filter.
    pub filtered: usize,
    /// Entries that passed normalization and filtering.
    pub kept: usize,
    /// Entries written to the store.
    pub upserted: usize,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<SourceError>,
}

impl SourceResult {
    /// Creates a successful result with zero counts.
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            fetched: 0,
            skipped: 0,
            filtered: 0,
            kept: 0,
            upserted: 0,
            success: true,
            error: None,
        }
    }

    /// Marks the source failed. Counts gathered so far are kept.
    pub fn fail(&mut self, code: impl Into<String>, message: impl Into<String>) {
        self.success = false;
        self.error = Some(SourceError {
            code: code.into(),
            message: message.into(),
        });
    }
}

/// Response of one ingestion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionReport {
    /// Run start; stamped as `last_seen_at` on every upserted record.
    pub started_at: DateTime<Utc>,
    pub sources: Vec<SourceResult>,
    /// Records written across all sources.
    pub upserted: usize,
    /// Import records the expiry sweep marked inactive.
    pub expired: usize,
    pub grace_period_days: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_error: Option<String>,
    /// Set when the store could not persist the run's writes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persist_error: Option<String>,
}

impl IngestionReport {
    pub fn new(started_at: DateTime<Utc>, grace_period_days: i64) -> Self {
        Self {
            started_at,
            sources: Vec::new(),
            upserted: 0,
            expired: 0,
            grace_period_days,
            expiry_error: None,
            persist_error: None,
        }
    }

    /// Sources that failed in this run.
    pub fn failed_sources(&self) -> impl Iterator<Item = &SourceResult> {
        self.sources.iter().filter(|s| !s.success)
    }

    /// True when at least one source was configured and none succeeded.
    pub fn all_failed(&self) -> bool {
        !self.sources.is_empty() && self.sources.iter().all(|s| !s.success)
    }
}

/// An event without its organizer id and report counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicEvent {
    pub id: Uuid,
    pub source_type: SourceType,
    pub source_key: Option<String>,
    pub source_name: Option<String>,
    pub source_url: Option<String>,
    pub external_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub event_time: Option<DateTime<Utc>>,
    pub organizer_username: Option<String>,
    pub event_types: BTreeSet<String>,
    pub is_accessible: Option<bool>,
    pub accessibility_features: BTreeSet<String>,
    pub image_path: Option<String>,
    pub status: EventStatus,
    pub created_at: DateTime<Utc>,
}

impl From<EventRecord> for PublicEvent {
    fn from(event: EventRecord) -> Self {
        Self {
            id: event.id,
            source_type: event.source_type,
            source_key: event.source_key,
            source_name: event.source_name,
            source_url: event.source_url,
            external_id: event.external_id,
            title: event.title,
            description: event.description,
            city: event.city,
            state: event.state,
            event_time: event.event_time,
            organizer_username: event.organizer_username,
            event_types: event.event_types,
            is_accessible: event.is_accessible,
            accessibility_features: event.accessibility_features,
            image_path: event.image_path,
            status: event.status,
            created_at: event.created_at,
        }
    }
}

/// An event as returned by the API.
///
/// The organizer and administrators get the full record, everyone else the
/// public fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventView {
    Full(EventRecord),
    Public(PublicEvent),
}

impl EventView {
    pub fn for_actor(event: EventRecord, actor: &Actor) -> Self {
        if is_event_steward(&event, actor) {
            Self::Full(event)
        } else {
            Self::Public(event.into())
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Self::Full(event) => event.id,
            Self::Public(event) => event.id,
        }
    }
}

/// `POST /api/events/{id}/reports`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateReportRequest {
    pub reason: ReportReason,
    #[serde(default)]
    pub details: Option<String>,
}

/// Response to a report submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportReceipt {
    pub report_id: Uuid,
    pub event_id: Uuid,
    pub report_count: u32,
    /// Event status after the report, which may have moved to review.
    pub status: EventStatus,
}

/// `POST /api/events/{id}/status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventStatusRequest {
    pub status: EventStatus,
}

/// `POST /api/events/{id}/comments`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCommentRequest {
    pub author_name: String,
    pub body: String,
}

/// `POST /api/comments/{id}/status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentStatusRequest {
    pub status: CommentStatus,
}
