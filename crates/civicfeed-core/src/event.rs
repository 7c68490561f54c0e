//! Event record types.
//!
//! This module provides the shared event store row and the records that feed
//! into it:
//! - [`EventRecord`]: a stored event, either organizer-submitted or imported
//! - [`NormalizedEntry`]: a canonical calendar entry produced by the normalizer
//! - [`OrganizerSubmission`]: the fields a human organizer supplies
//! - [`EventStatus`] and [`SourceType`]: moderation and provenance enums

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Where an event record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Submitted directly by a human organizer.
    Organizer,
    /// Pulled from an external calendar feed.
    Import,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Organizer => "organizer",
            Self::Import => "import",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The visibility-governing status of an event record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Publicly visible.
    #[default]
    Active,
    /// Awaiting an administrator decision after reports.
    UnderReview,
    /// Rejected by an administrator.
    Hidden,
    /// Imported record whose feed stopped confirming it.
    Inactive,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::UnderReview => "under_review",
            Self::Hidden => "hidden",
            Self::Inactive => "inactive",
        }
    }

    /// Returns true if the event is visible to every visitor.
    pub fn is_public(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Returns true if an administrator may move an event from `self` to `to`.
    ///
    /// `Inactive` is neither a source nor a target here: it is owned by the
    /// import expiry sweep.
    pub fn can_moderate_to(&self, to: EventStatus) -> bool {
        use EventStatus::*;
        matches!(
            (*self, to),
            (Active, UnderReview) | (UnderReview, Active) | (UnderReview, Hidden) | (Hidden, Active)
        )
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown status string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown status: {0}")]
pub struct ParseStatusError(pub String);

impl FromStr for EventStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "under_review" => Ok(Self::UnderReview),
            "hidden" => Ok(Self::Hidden),
            "inactive" => Ok(Self::Inactive),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// A canonical calendar entry, ready for reconciliation.
///
/// Text fields are already sanitized; `external_id` is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedEntry {
    /// Stable identifier within the feed (the iCalendar UID).
    pub external_id: String,
    pub title: String,
    pub description: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    /// Absolute start instant, if the entry has one.
    pub starts_at: Option<DateTime<Utc>>,
    /// Provenance link from the entry's URL property.
    pub url: Option<String>,
}

impl NormalizedEntry {
    /// Creates an entry with the given identifier and title.
    pub fn new(external_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            title: title.into(),
            description: None,
            city: None,
            state: None,
            starts_at: None,
            url: None,
        }
    }

    /// Builder method to set the start instant.
    pub fn with_start(mut self, starts_at: DateTime<Utc>) -> Self {
        self.starts_at = Some(starts_at);
        self
    }

    /// Builder method to set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Builder method to set city and state.
    pub fn with_place(mut self, city: impl Into<String>, state: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self.state = Some(state.into());
        self
    }

    /// Builder method to set the provenance URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

/// Fields a human organizer supplies when creating an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrganizerSubmission {
    pub title: String,
    pub description: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub event_time: Option<DateTime<Utc>>,
    pub event_types: BTreeSet<String>,
    pub is_accessible: Option<bool>,
    pub accessibility_features: BTreeSet<String>,
    pub image_path: Option<String>,
}

/// A row of the shared event store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: Uuid,

    // === Provenance ===
    pub source_type: SourceType,
    /// Feed key for imports.
    pub source_key: Option<String>,
    /// Feed display name for imports.
    pub source_name: Option<String>,
    /// Link back to the upstream entry for imports.
    pub source_url: Option<String>,
    /// Identifier unique within `source_key`; never set for organizer events.
    pub external_id: Option<String>,

    // === Descriptive ===
    pub title: String,
    pub description: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub event_time: Option<DateTime<Utc>>,

    // === Attribution ===
    pub organizer_username: Option<String>,
    pub user_id: Option<Uuid>,

    // === Tags ===
    pub event_types: BTreeSet<String>,
    pub is_accessible: Option<bool>,
    pub accessibility_features: BTreeSet<String>,
    pub image_path: Option<String>,

    // === Moderation ===
    pub status: EventStatus,
    pub report_count: u32,
    pub last_reported_at: Option<DateTime<Utc>>,

    // === Lifecycle ===
    pub created_at: DateTime<Utc>,
    /// Start of the most recent ingestion run that observed this import.
    pub last_seen_at: Option<DateTime<Utc>>,
    /// Status the expiry sweep replaced, restored if the feed lists the
    /// entry again.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expired_from: Option<EventStatus>,
}

impl EventRecord {
    /// Creates an organizer-submitted record.
    pub fn from_submission(
        submission: OrganizerSubmission,
        user_id: Uuid,
        username: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_type: SourceType::Organizer,
            source_key: None,
            source_name: None,
            source_url: None,
            external_id: None,
            title: submission.title,
            description: submission.description,
            city: submission.city,
            state: submission.state,
            event_time: submission.event_time,
            organizer_username: username,
            user_id: Some(user_id),
            event_types: submission.event_types,
            is_accessible: submission.is_accessible,
            accessibility_features: submission.accessibility_features,
            image_path: submission.image_path,
            status: EventStatus::Active,
            report_count: 0,
            last_reported_at: None,
            created_at: now,
            last_seen_at: None,
            expired_from: None,
        }
    }

    /// Creates a new import record from a normalized entry.
    pub fn from_import(
        source_key: &str,
        source_name: &str,
        entry: &NormalizedEntry,
        seen_at: DateTime<Utc>,
    ) -> Self {
        let mut record = Self {
            id: Uuid::new_v4(),
            source_type: SourceType::Import,
            source_key: Some(source_key.to_string()),
            source_name: None,
            source_url: None,
            external_id: Some(entry.external_id.clone()),
            title: String::new(),
            description: None,
            city: None,
            state: None,
            event_time: None,
            organizer_username: None,
            user_id: None,
            event_types: BTreeSet::new(),
            is_accessible: None,
            accessibility_features: BTreeSet::new(),
            image_path: None,
            status: EventStatus::Active,
            report_count: 0,
            last_reported_at: None,
            created_at: seen_at,
            last_seen_at: None,
            expired_from: None,
        };
        record.apply_import(source_name, entry, seen_at);
        record
    }

    /// Overwrites every import-owned field from `entry`.
    ///
    /// Identity, creation time and moderation counters are kept. A record the
    /// expiry sweep marked `Inactive` gets back the status it had before, so
    /// a rejected import stays hidden. Other statuses are left to moderation.
    pub fn apply_import(&mut self, source_name: &str, entry: &NormalizedEntry, seen_at: DateTime<Utc>) {
        self.source_name = Some(source_name.to_string());
        self.source_url = entry.url.clone();
        self.title = entry.title.clone();
        self.description = entry.description.clone();
        self.city = entry.city.clone();
        self.state = entry.state.clone();
        self.event_time = entry.starts_at;
        self.organizer_username = None;
        self.user_id = None;
        self.event_types.clear();
        self.is_accessible = None;
        self.accessibility_features.clear();
        self.image_path = None;
        if self.status == EventStatus::Inactive {
            self.status = self.expired_from.take().unwrap_or_default();
        }
        self.last_seen_at = Some(seen_at);
    }

    /// Marks a stale import inactive, remembering its moderation status.
    ///
    /// Returns false if the record is not an import or is already inactive.
    pub fn expire(&mut self) -> bool {
        if !self.is_import() || self.status == EventStatus::Inactive {
            return false;
        }
        self.expired_from = Some(self.status);
        self.status = EventStatus::Inactive;
        true
    }

    /// Returns true if this record came from a feed.
    pub fn is_import(&self) -> bool {
        self.source_type == SourceType::Import
    }

    /// Returns the reconciliation key for imports.
    pub fn reconciliation_key(&self) -> Option<(&str, &str)> {
        match (&self.source_key, &self.external_id) {
            (Some(key), Some(id)) if self.is_import() => Some((key.as_str(), id.as_str())),
            _ => None,
        }
    }

    /// Returns true if `user_id` is this event's organizer.
    pub fn is_organized_by(&self, user_id: Uuid) -> bool {
        self.user_id == Some(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, d, 12, 0, 0).unwrap()
    }

    fn sample_entry() -> NormalizedEntry {
        NormalizedEntry::new("uid-1", "Town Hall")
            .with_description("Budget hearing")
            .with_place("Springfield", "IL")
            .with_start(at(20))
            .with_url("https://example.org/e/1")
    }

    mod status {
        use super::*;

        #[test]
        fn parses_and_displays() {
            for status in [
                EventStatus::Active,
                EventStatus::UnderReview,
                EventStatus::Hidden,
                EventStatus::Inactive,
            ] {
                assert_eq!(status.as_str().parse::<EventStatus>().unwrap(), status);
            }
            assert!("archived".parse::<EventStatus>().is_err());
        }

        #[test]
        fn moderation_transitions() {
            use EventStatus::*;
            assert!(Active.can_moderate_to(UnderReview));
            assert!(UnderReview.can_moderate_to(Active));
            assert!(UnderReview.can_moderate_to(Hidden));
            assert!(Hidden.can_moderate_to(Active));

            assert!(!Active.can_moderate_to(Hidden));
            assert!(!Hidden.can_moderate_to(UnderReview));
            assert!(!Inactive.can_moderate_to(Active));
            assert!(!Active.can_moderate_to(Inactive));
        }

        #[test]
        fn serializes_snake_case() {
            let json = serde_json::to_string(&EventStatus::UnderReview).unwrap();
            assert_eq!(json, "\"under_review\"");
        }
    }

    mod import {
        use super::*;

        #[test]
        fn from_import_sets_provenance() {
            let record = EventRecord::from_import("cityfeed", "City Feed", &sample_entry(), at(1));

            assert_eq!(record.source_type, SourceType::Import);
            assert_eq!(record.reconciliation_key(), Some(("cityfeed", "uid-1")));
            assert_eq!(record.source_name.as_deref(), Some("City Feed"));
            assert_eq!(record.source_url.as_deref(), Some("https://example.org/e/1"));
            assert_eq!(record.status, EventStatus::Active);
            assert_eq!(record.last_seen_at, Some(at(1)));
            assert!(record.user_id.is_none());
        }

        #[test]
        fn apply_import_clears_unowned_fields() {
            let mut record = EventRecord::from_import("cityfeed", "City Feed", &sample_entry(), at(1));
            record.image_path = Some("img.png".into());
            record.event_types.insert("rally".into());
            record.accessibility_features.insert("ramp".into());
            record.is_accessible = Some(true);

            record.apply_import("City Feed", &sample_entry(), at(2));

            assert!(record.image_path.is_none());
            assert!(record.event_types.is_empty());
            assert!(record.accessibility_features.is_empty());
            assert!(record.is_accessible.is_none());
        }

        #[test]
        fn apply_import_keeps_moderation_state() {
            let mut record = EventRecord::from_import("cityfeed", "City Feed", &sample_entry(), at(1));
            record.status = EventStatus::Hidden;
            record.report_count = 4;
            let id = record.id;

            record.apply_import("City Feed", &sample_entry(), at(2));

            assert_eq!(record.id, id);
            assert_eq!(record.status, EventStatus::Hidden);
            assert_eq!(record.report_count, 4);
            assert_eq!(record.created_at, at(1));
        }

        #[test]
        fn apply_import_revives_inactive() {
            let mut record = EventRecord::from_import("cityfeed", "City Feed", &sample_entry(), at(1));
            assert!(record.expire());
            assert_eq!(record.status, EventStatus::Inactive);

            record.apply_import("City Feed", &sample_entry(), at(2));

            assert_eq!(record.status, EventStatus::Active);
            assert!(record.expired_from.is_none());
        }

        #[test]
        fn expiry_keeps_rejection() {
            for status in [EventStatus::Hidden, EventStatus::UnderReview] {
                let mut record =
                    EventRecord::from_import("cityfeed", "City Feed", &sample_entry(), at(1));
                record.status = status;

                assert!(record.expire());
                assert_eq!(record.status, EventStatus::Inactive);
                assert!(!record.expire());

                record.apply_import("City Feed", &sample_entry(), at(2));
                assert_eq!(record.status, status);
            }
        }

        #[test]
        fn organizer_events_never_expire() {
            let mut record = EventRecord::from_submission(
                OrganizerSubmission::default(),
                Uuid::new_v4(),
                None,
                at(1),
            );
            assert!(!record.expire());
            assert_eq!(record.status, EventStatus::Active);
        }
    }

    #[test]
    fn organizer_record_has_no_reconciliation_key() {
        let user = Uuid::new_v4();
        let submission = OrganizerSubmission {
            title: "Park cleanup".into(),
            ..Default::default()
        };
        let record = EventRecord::from_submission(submission, user, Some("sam".into()), at(1));

        assert_eq!(record.source_type, SourceType::Organizer);
        assert!(record.reconciliation_key().is_none());
        assert!(record.is_organized_by(user));
        assert!(!record.is_organized_by(Uuid::new_v4()));
    }
}
