//! Offline normalization of a local calendar file.

use std::path::Path;

use chrono::{DateTime, Utc};
use civicfeed_core::NormalizedEntry;
use civicfeed_feeds::{FeedResult, SafetyPolicy, SkippedEntry, normalize_feed};
use serde::Serialize;

use crate::config::CliConfig;
use crate::error::CliResult;

/// What `civicfeed normalize` prints.
#[derive(Debug, Serialize)]
pub struct NormalizeOutput {
    pub parsed: usize,
    pub admitted: Vec<NormalizedEntry>,
    pub filtered: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<Vec<SkippedEntry>>,
}

/// Runs the normalizer and the safety filter over `ics`.
pub fn normalize_document(
    ics: &str,
    policy: &SafetyPolicy,
    now: DateTime<Utc>,
    show_skipped: bool,
) -> FeedResult<NormalizeOutput> {
    let normalization = normalize_feed(ics)?;
    let outcome = policy.apply(normalization.entries, now);

    Ok(NormalizeOutput {
        parsed: normalization.parsed,
        filtered: outcome.filtered(),
        admitted: outcome.admitted,
        skipped: show_skipped.then_some(normalization.skipped),
    })
}

pub fn run(config: &CliConfig, file: &Path, show_skipped: bool, no_window: bool) -> CliResult<()> {
    let ics = std::fs::read_to_string(file)?;
    let mut policy = config.pipeline_config().safety_policy();
    if no_window {
        policy = policy.without_window();
    }

    let output = normalize_document(&ics, &policy, Utc::now(), show_skipped)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
