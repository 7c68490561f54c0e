//! Raw entry to [`NormalizedEntry`] conversion.
//!
//! Each raw entry either becomes a normalized entry or is skipped with a
//! [`SkipReason`]. The full list of outcomes is kept so callers can report
//! why an entry was dropped; [`Normalization`] collapses it to the admitted
//! entries at the boundary.

use std::collections::HashSet;
use std::sync::LazyLock;

use civicfeed_core::{NormalizedEntry, collapse_whitespace, sanitize_description, sanitize_title, strip_markup};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::FeedResult;
use crate::ics::parse_calendar;
use crate::raw_entry::RawEntry;

/// Strict "City, ST" location.
static CITY_STATE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([^,]+?)\s*,\s*([A-Za-z]{2})\s*$").expect("Invalid location regex")
});

/// Why a raw entry was not normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No UID, or a blank one. The entry cannot be reconciled.
    MissingUid,
    /// Same UID as an earlier entry in the same document.
    DuplicateUid,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingUid => "missing_uid",
            Self::DuplicateUid => "duplicate_uid",
        }
    }
}

/// A raw entry the normalizer dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedEntry {
    /// Zero-based position in the document.
    pub position: usize,
    pub uid: Option<String>,
    pub summary: Option<String>,
    pub reason: SkipReason,
}

/// The result of normalizing one raw entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    Kept(NormalizedEntry),
    Skipped(SkippedEntry),
}

/// Normalized entries of one document plus what was skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Normalization {
    /// Number of VEVENTs in the document.
    pub parsed: usize,
    pub entries: Vec<NormalizedEntry>,
    pub skipped: Vec<SkippedEntry>,
}

impl Normalization {
    /// Splits per-entry outcomes into kept and skipped, preserving order.
    pub fn from_outcomes(outcomes: Vec<EntryOutcome>) -> Self {
        let mut result = Self {
            parsed: outcomes.len(),
            ..Self::default()
        };
        for outcome in outcomes {
            match outcome {
                EntryOutcome::Kept(entry) => result.entries.push(entry),
                EntryOutcome::Skipped(skipped) => result.skipped.push(skipped),
            }
        }
        result
    }
}

/// Parses and normalizes a whole iCalendar document.
///
/// # Errors
///
/// Fails only if the document itself does not parse. Individual malformed
/// entries are skipped.
pub fn normalize_feed(ics: &str) -> FeedResult<Normalization> {
    let raw = parse_calendar(ics)?;
    Ok(Normalization::from_outcomes(classify_entries(&raw)))
}

/// Normalizes each raw entry, in order.
///
/// Only the first entry for a given UID is kept.
pub fn classify_entries(raw: &[RawEntry]) -> Vec<EntryOutcome> {
    let mut seen = HashSet::new();
    raw.iter()
        .enumerate()
        .map(|(position, entry)| {
            let outcome = match normalize_entry(entry) {
                Ok(normalized) if !seen.insert(normalized.external_id.clone()) => {
                    Err(SkipReason::DuplicateUid)
                }
                other => other,
            };
            outcome.map_or_else(
                |reason| {
                    debug!(position, uid = ?entry.uid, reason = reason.as_str(), "Skipping entry");
                    EntryOutcome::Skipped(SkippedEntry {
                        position,
                        uid: entry.uid.clone(),
                        summary: entry.summary.clone(),
                        reason,
                    })
                },
                EntryOutcome::Kept,
            )
        })
        .collect()
}

/// Normalizes a single raw entry.
pub fn normalize_entry(raw: &RawEntry) -> Result<NormalizedEntry, SkipReason> {
    let external_id = raw
        .uid
        .as_deref()
        .map(str::trim)
        .filter(|uid| !uid.is_empty())
        .ok_or(SkipReason::MissingUid)?;

    let (city, state) = raw
        .location
        .as_deref()
        .map(parse_location)
        .unwrap_or((None, None));

    Ok(NormalizedEntry {
        external_id: external_id.to_string(),
        title: sanitize_title(raw.summary.as_deref()),
        description: raw.description.as_deref().and_then(sanitize_description),
        city,
        state,
        starts_at: raw.start.map(|s| s.to_utc()),
        url: raw
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(str::to_string),
    })
}

/// Splits "City, ST" into its parts.
///
/// Anything that is not exactly a city, a comma and a two-letter state yields
/// `(None, None)`.
pub fn parse_location(location: &str) -> (Option<String>, Option<String>) {
    let cleaned = collapse_whitespace(&strip_markup(location));
    let Some(caps) = CITY_STATE_REGEX.captures(&cleaned) else {
        return (None, None);
    };
    let city = caps[1].trim();
    if city.is_empty() {
        return (None, None);
    }
    (Some(city.to_string()), Some(caps[2].to_ascii_uppercase()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw_entry::RawEntryTime;
    use chrono::{TimeZone, Utc};
    use civicfeed_core::{DEFAULT_TITLE, MAX_DESCRIPTION_CHARS};

    mod location {
        use super::*;

        #[test]
        fn strict_city_state() {
            assert_eq!(
                parse_location("Springfield, il"),
                (Some("Springfield".into()), Some("IL".into()))
            );
            assert_eq!(
                parse_location("  San   Luis Obispo ,CA "),
                (Some("San Luis Obispo".into()), Some("CA".into()))
            );
        }

        #[test]
        fn anything_else_is_null() {
            for location in [
                "Springfield",
                "Springfield, Illinois",
                "123 Main St, Springfield, IL",
                "Springfield, IL 62701",
                "Washington, D.C.",
                ", IL",
                "",
            ] {
                assert_eq!(parse_location(location), (None, None), "{location}");
            }
        }
    }

    mod entry {
        use super::*;

        #[test]
        fn missing_uid_is_skipped() {
            let raw = RawEntry {
                summary: Some("Anonymous".into()),
                ..Default::default()
            };
            assert_eq!(normalize_entry(&raw), Err(SkipReason::MissingUid));
            assert_eq!(
                normalize_entry(&RawEntry::new("   ")),
                Err(SkipReason::MissingUid)
            );
        }

        #[test]
        fn title_defaults() {
            let entry = normalize_entry(&RawEntry::new("a").with_summary("<b> </b>")).unwrap();
            assert_eq!(entry.title, DEFAULT_TITLE);
        }

        #[test]
        fn fields_are_sanitized() {
            let start = Utc.with_ymd_and_hms(2025, 4, 2, 17, 30, 0).unwrap();
            let raw = RawEntry::new(" uid-1 ")
                .with_summary("Rally  for <i>Transit</i>")
                .with_description("<p>Bring   signs</p>\n\n<p>and friends</p>")
                .with_location("Austin, tx")
                .with_start(RawEntryTime::DateTime(start))
                .with_url("  https://example.org/rally ");

            let entry = normalize_entry(&raw).unwrap();

            assert_eq!(entry.external_id, "uid-1");
            assert_eq!(entry.title, "Rally for Transit");
            assert_eq!(entry.description.as_deref(), Some("Bring signs and friends"));
            assert_eq!(entry.city.as_deref(), Some("Austin"));
            assert_eq!(entry.state.as_deref(), Some("TX"));
            assert_eq!(entry.starts_at, Some(start));
            assert_eq!(entry.url.as_deref(), Some("https://example.org/rally"));
        }

        #[test]
        fn blank_url_and_description_are_none() {
            let raw = RawEntry::new("a").with_url("  ").with_description("<br>");
            let entry = normalize_entry(&raw).unwrap();
            assert!(entry.url.is_none());
            assert!(entry.description.is_none());
        }

        #[test]
        fn markup_round_trip() {
            let noisy = "<div>Join   us\t\t<b>now</b></div>\n\n\n".repeat(300);
            let entry = normalize_entry(&RawEntry::new("a").with_description(noisy)).unwrap();
            let description = entry.description.unwrap();

            assert!(!description.contains('<'));
            assert!(!description.contains('>'));
            assert!(!description.contains("  "));
            assert!(description.chars().count() <= MAX_DESCRIPTION_CHARS);
        }
    }

    #[test]
    fn duplicates_keep_first() {
        let raw = vec![
            RawEntry::new("a").with_summary("first"),
            RawEntry::default(),
            RawEntry::new("b"),
            RawEntry::new("a").with_summary("second"),
        ];

        let result = Normalization::from_outcomes(classify_entries(&raw));

        assert_eq!(result.parsed, 4);
        let ids: Vec<_> = result.entries.iter().map(|e| e.external_id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
        assert_eq!(result.entries[0].title, "first");

        let reasons: Vec<_> = result.skipped.iter().map(|s| (s.position, s.reason)).collect();
        assert_eq!(
            reasons,
            [(1, SkipReason::MissingUid), (3, SkipReason::DuplicateUid)]
        );
    }

    #[test]
    fn normalize_feed_end_to_end() {
        let ics = "BEGIN:VCALENDAR\r\n\
                   VERSION:2.0\r\n\
                   BEGIN:VEVENT\r\n\
                   SUMMARY:No uid here\r\n\
                   END:VEVENT\r\n\
                   BEGIN:VEVENT\r\n\
                   UID:keep-me\r\n\
                   SUMMARY:Neighborhood cleanup\r\n\
                   LOCATION:Tulsa\\, OK\r\n\
                   END:VEVENT\r\n\
                   END:VCALENDAR\r\n";

        let result = normalize_feed(ics).unwrap();

        assert_eq!(result.parsed, 2);
        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.entries[0].external_id, "keep-me");
        assert_eq!(result.entries[0].state.as_deref(), Some("OK"));
        assert_eq!(result.skipped[0].reason, SkipReason::MissingUid);
    }
}
