//! iCalendar parsing.
//!
//! Turns an iCalendar (RFC 5545) document into [`RawEntry`] values. Only
//! VEVENT components are read. Missing or unparseable properties become
//! `None` on the entry; deciding what to drop is the normalizer's job.

use chrono::{TimeZone, Utc};
use icalendar::{
    Calendar, CalendarComponent, CalendarDateTime, Component, DatePerhapsTime, Event, EventLike,
};
use tracing::{debug, trace};

use crate::error::{FeedError, FeedResult};
use crate::raw_entry::{RawEntry, RawEntryTime};

/// Parses an iCalendar document into raw entries, in document order.
///
/// # Errors
///
/// Fails with an invalid-content error if the document as a whole does not
/// parse.
pub fn parse_calendar(ics: &str) -> FeedResult<Vec<RawEntry>> {
    let calendar = ics
        .parse::<Calendar>()
        .map_err(|e| FeedError::invalid_content(format!("failed to parse iCalendar: {}", e)))?;

    let entries: Vec<RawEntry> = calendar
        .iter()
        .filter_map(|component| match component {
            CalendarComponent::Event(event) => Some(parse_event(event)),
            _ => None,
        })
        .collect();

    debug!(count = entries.len(), "Parsed calendar entries");
    Ok(entries)
}

fn parse_event(event: &Event) -> RawEntry {
    let entry = RawEntry {
        uid: event.get_uid().map(unescape_text),
        summary: event.get_summary().map(unescape_text),
        description: event.get_description().map(unescape_text),
        location: event.get_location().map(unescape_text),
        start: event.get_start().and_then(convert_start),
        url: event.property_value("URL").map(|u| u.trim().to_string()),
    };

    trace!(uid = ?entry.uid, start = ?entry.start, "Parsed VEVENT");
    entry
}

/// Converts a DTSTART value to an absolute time.
///
/// Zoned times are resolved through the IANA database; unknown zone names
/// and floating times are read as UTC.
fn convert_start(dt: DatePerhapsTime) -> Option<RawEntryTime> {
    let utc = match dt {
        DatePerhapsTime::Date(date) => return Some(RawEntryTime::Date(date)),
        DatePerhapsTime::DateTime(CalendarDateTime::Utc(dt)) => dt,
        DatePerhapsTime::DateTime(CalendarDateTime::Floating(naive)) => {
            Utc.from_utc_datetime(&naive)
        }
        DatePerhapsTime::DateTime(CalendarDateTime::WithTimezone { date_time, tzid }) => {
            match tzid.parse::<chrono_tz::Tz>() {
                Ok(tz) => tz
                    .from_local_datetime(&date_time)
                    .earliest()?
                    .with_timezone(&Utc),
                Err(_) => {
                    debug!(tzid = %tzid, "Unknown TZID, reading start as UTC");
                    Utc.from_utc_datetime(&date_time)
                }
            }
        }
    };
    Some(RawEntryTime::DateTime(utc))
}

/// Undoes RFC 5545 TEXT escaping (`\n`, `\,`, `\;`, `\\`).
fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n' | 'N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
