//! Calendar feed ingestion front half: fetch, parse, normalize, filter.
//!
//! ```ignore
//! let body = fetcher.fetch(&source.url).await?;
//! let normalization = normalize_feed(&body)?;
//! let outcome = SafetyPolicy::default().apply(normalization.entries, now);
//! ```

pub mod error;
pub mod fetcher;
pub mod filter;
pub mod ics;
pub mod normalize;
pub mod raw_entry;
pub mod source;

pub use error::{FeedError, FeedErrorCode, FeedResult};
pub use fetcher::{
    BoxFuture, CALENDAR_MARKER, FeedFetcher, FetcherConfig, HttpFeedFetcher, StaticFetcher,
    validate_body, validate_url,
};
pub use filter::{DEFAULT_MAX_ENTRIES, FilterOutcome, SCREENED_TERMS, SafetyPolicy};
pub use ics::parse_calendar;
pub use normalize::{
    EntryOutcome, Normalization, SkipReason, SkippedEntry, classify_entries, normalize_entry,
    normalize_feed, parse_location,
};
pub use raw_entry::{RawEntry, RawEntryTime};
pub use source::FeedSource;
