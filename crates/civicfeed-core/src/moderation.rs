//! Moderation records and access rules.
//!
//! Reports and comments hang off an event record. Who may see an event and
//! who may moderate its comments is decided here so every read path applies
//! the same rule.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::{EventRecord, ParseStatusError};

/// Why a visitor reported an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportReason {
    Spam,
    Inappropriate,
    Misleading,
    Duplicate,
    SafetyConcern,
    Other,
}

impl ReportReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spam => "spam",
            Self::Inappropriate => "inappropriate",
            Self::Misleading => "misleading",
            Self::Duplicate => "duplicate",
            Self::SafetyConcern => "safety_concern",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ReportReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A visitor's report against an event. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub event_id: Uuid,
    pub reason: ReportReason,
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Report {
    pub fn new(
        event_id: Uuid,
        reason: ReportReason,
        details: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id,
            reason,
            details: details.filter(|d| !d.trim().is_empty()),
            created_at,
        }
    }
}

/// Visibility of a single comment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentStatus {
    #[default]
    Visible,
    Hidden,
}

impl CommentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Visible => "visible",
            Self::Hidden => "hidden",
        }
    }
}

impl FromStr for CommentStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "visible" => Ok(Self::Visible),
            "hidden" => Ok(Self::Hidden),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// A visitor comment on an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub event_id: Uuid,
    pub author_name: String,
    pub body: String,
    pub status: CommentStatus,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn new(
        event_id: Uuid,
        author_name: impl Into<String>,
        body: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id,
            author_name: author_name.into(),
            body: body.into(),
            status: CommentStatus::Visible,
            created_at,
        }
    }
}

/// The party performing a read or a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Actor {
    /// Unauthenticated visitor, optionally identified by client address.
    Anonymous { client: Option<String> },
    /// Authenticated user.
    User {
        id: Uuid,
        username: Option<String>,
    },
    /// Verified administrator.
    Admin,
}

impl Actor {
    pub fn anonymous() -> Self {
        Self::Anonymous { client: None }
    }

    pub fn user(id: Uuid) -> Self {
        Self::User { id, username: None }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }

    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Self::User { id, .. } => Some(*id),
            _ => None,
        }
    }

    /// Key used for per-actor throttling, if the actor is identifiable.
    pub fn throttle_key(&self) -> Option<String> {
        match self {
            Self::User { id, .. } => Some(format!("user:{}", id)),
            Self::Anonymous {
                client: Some(client),
            } => Some(format!("client:{}", client)),
            Self::Anonymous { client: None } => None,
            Self::Admin => Some("admin".to_string()),
        }
    }
}

/// Returns true if `actor` may see `event`.
///
/// Non-active events are only visible to their organizer and administrators.
pub fn can_view(event: &EventRecord, actor: &Actor) -> bool {
    if event.status.is_public() || actor.is_admin() {
        return true;
    }
    actor.user_id().is_some_and(|id| event.is_organized_by(id))
}

/// Returns true if `actor` is `event`'s organizer or an administrator.
///
/// Only they see the organizer id and the report counters.
pub fn is_event_steward(event: &EventRecord, actor: &Actor) -> bool {
    actor.is_admin() || actor.user_id().is_some_and(|id| event.is_organized_by(id))
}

/// Returns true if `actor` may hide, show or delete comments on `event`.
pub fn can_moderate_comments(event: &EventRecord, actor: &Actor) -> bool {
    is_event_steward(event, actor)
}
