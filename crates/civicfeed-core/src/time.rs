//! Admission windows for imported entries.
//!
//! Feeds publish far more than is useful: years-old archives and placeholder
//! entries for events months away. An [`AdmissionWindow`] bounds which start
//! times the ingestion pipeline keeps, relative to the moment a run starts.

use chrono::{DateTime, Duration, Utc};

/// How far back an entry's start may lie and still be admitted.
pub const DEFAULT_LOOKBEHIND_DAYS: i64 = 7;

/// How far ahead an entry's start may lie and still be admitted.
pub const DEFAULT_LOOKAHEAD_DAYS: i64 = 180;

/// A start-time range `[now - lookbehind, now + lookahead]`, both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionWindow {
    pub lookbehind: Duration,
    pub lookahead: Duration,
}

impl Default for AdmissionWindow {
    fn default() -> Self {
        Self::from_days(DEFAULT_LOOKBEHIND_DAYS, DEFAULT_LOOKAHEAD_DAYS)
    }
}

impl AdmissionWindow {
    /// Creates a window from whole days on either side of now.
    pub fn from_days(lookbehind_days: i64, lookahead_days: i64) -> Self {
        Self {
            lookbehind: Duration::days(lookbehind_days.max(0)),
            lookahead: Duration::days(lookahead_days.max(0)),
        }
    }

    /// Earliest admitted start.
    pub fn start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.lookbehind
    }

    /// Latest admitted start.
    pub fn end(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.lookahead
    }

    /// Checks whether an entry starting at `starts_at` is admitted.
    ///
    /// Entries without a start time are always admitted; there is nothing to
    /// compare against.
    pub fn admits(&self, starts_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match starts_at {
            Some(start) => start >= self.start(now) && start <= self.end(now),
            None => true,
        }
    }
}
