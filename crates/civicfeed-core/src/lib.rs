//! Core types: event records, moderation, text sanitization, admission windows

pub mod event;
pub mod moderation;
pub mod text;
pub mod time;
pub mod tracing;

pub use event::{
    EventRecord, EventStatus, NormalizedEntry, OrganizerSubmission, ParseStatusError, SourceType,
};
pub use moderation::{
    Actor, Comment, CommentStatus, Report, ReportReason, can_moderate_comments, can_view,
    is_event_steward,
};
pub use text::{
    DEFAULT_TITLE, MAX_DESCRIPTION_CHARS, collapse_whitespace, find_denied_term,
    sanitize_description, sanitize_title, strip_markup, truncate_chars,
};
pub use time::AdmissionWindow;
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
