//! Safety filter: bounds what one feed may push into the store per run.

use chrono::{DateTime, Utc};
use civicfeed_core::{AdmissionWindow, NormalizedEntry, find_denied_term};
use tracing::debug;

/// Default per-feed cap.
pub const DEFAULT_MAX_ENTRIES: usize = 200;

/// Terms that keep an imported entry out of public listings.
pub const SCREENED_TERMS: &[&str] = &[
    "riot",
    "rioting",
    "loot",
    "looting",
    "armed",
    "weapon",
    "weapons",
    "guns",
    "molotov",
    "kill",
    "assassinate",
    "attack",
    "violent",
    "violence",
];

/// Admission policy for one feed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafetyPolicy {
    /// Maximum entries admitted per feed, first in feed order.
    pub max_entries: usize,
    /// Start-time window. `None` disables temporal filtering.
    pub window: Option<AdmissionWindow>,
    /// Drop entries whose title or description mentions a screened term.
    pub content_screen: bool,
}

impl Default for SafetyPolicy {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            window: Some(AdmissionWindow::default()),
            content_screen: true,
        }
    }
}

/// Entries admitted from one feed, with drop counts by cause.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOutcome {
    pub admitted: Vec<NormalizedEntry>,
    pub out_of_window: usize,
    pub screened: usize,
    pub over_cap: usize,
}

impl FilterOutcome {
    /// Total entries dropped.
    pub fn filtered(&self) -> usize {
        self.out_of_window + self.screened + self.over_cap
    }
}

impl SafetyPolicy {
    /// Disables the temporal window.
    pub fn without_window(mut self) -> Self {
        self.window = None;
        self
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Applies the policy to one feed's entries, preserving feed order.
    ///
    /// The window and the content screen run first; the cap then keeps the
    /// first `max_entries` survivors.
    pub fn apply(&self, entries: Vec<NormalizedEntry>, now: DateTime<Utc>) -> FilterOutcome {
        let mut outcome = FilterOutcome::default();

        for entry in entries {
            if let Some(window) = &self.window
                && !window.admits(entry.starts_at, now)
            {
                debug!(uid = %entry.external_id, starts_at = ?entry.starts_at, "Entry outside admission window");
                outcome.out_of_window += 1;
                continue;
            }

            if self.content_screen
                && let Some(term) = screened_term(&entry)
            {
                debug!(uid = %entry.external_id, term, "Entry failed content screen");
                outcome.screened += 1;
                continue;
            }

            if outcome.admitted.len() >= self.max_entries {
                outcome.over_cap += 1;
                continue;
            }

            outcome.admitted.push(entry);
        }

        outcome
    }
}

fn screened_term(entry: &NormalizedEntry) -> Option<&'static str> {
    find_denied_term(&entry.title, SCREENED_TERMS).or_else(|| {
        entry
            .description
            .as_deref()
            .and_then(|d| find_denied_term(d, SCREENED_TERMS))
    })
}
