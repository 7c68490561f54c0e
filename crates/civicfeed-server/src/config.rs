//! Pipeline and moderation configuration.
//!
//! Both are plain values built by the caller and passed in, so tests can use
//! fixtures without touching the environment.

use std::time::Duration;

use civicfeed_core::AdmissionWindow;
use civicfeed_feeds::{DEFAULT_MAX_ENTRIES, FeedSource, FetcherConfig, SafetyPolicy};
use subtle::ConstantTimeEq;

/// Days an import may go unseen before the sweep marks it inactive.
pub const DEFAULT_GRACE_PERIOD_DAYS: i64 = 45;

/// Minimum spacing between two comments by one actor on one event.
pub const DEFAULT_COMMENT_COOLDOWN: Duration = Duration::from_secs(20);

/// Substrings that reject a comment.
pub const DEFAULT_COMMENT_DENYLIST: &[&str] = &[
    "kill yourself",
    "nazi",
    "viagra",
    "casino",
    "crypto giveaway",
    "onlyfans",
    "free money",
];

/// Settings for one ingestion run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub sources: Vec<FeedSource>,
    /// Shared secret for the trigger endpoint. `None` disables the endpoint.
    pub trigger_secret: Option<String>,
    pub max_entries_per_feed: usize,
    /// `None` disables temporal filtering.
    pub admission_window: Option<AdmissionWindow>,
    pub content_screen: bool,
    pub grace_period: chrono::Duration,
    pub fetch_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            trigger_secret: None,
            max_entries_per_feed: DEFAULT_MAX_ENTRIES,
            admission_window: Some(AdmissionWindow::default()),
            content_screen: true,
            grace_period: chrono::Duration::days(DEFAULT_GRACE_PERIOD_DAYS),
            fetch_timeout: Duration::from_secs(20),
        }
    }
}

impl PipelineConfig {
    pub fn new(sources: Vec<FeedSource>) -> Self {
        Self {
            sources,
            ..Default::default()
        }
    }

    pub fn with_trigger_secret(mut self, secret: impl Into<String>) -> Self {
        self.trigger_secret = Some(secret.into());
        self
    }

    pub fn with_admission_window(mut self, window: Option<AdmissionWindow>) -> Self {
        self.admission_window = window;
        self
    }

    pub fn with_grace_period(mut self, grace_period: chrono::Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// The safety filter derived from this config.
    pub fn safety_policy(&self) -> SafetyPolicy {
        SafetyPolicy {
            max_entries: self.max_entries_per_feed,
            window: self.admission_window,
            content_screen: self.content_screen,
        }
    }

    pub fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig::default().with_timeout(self.fetch_timeout)
    }
}

/// Settings for the moderation service.
#[derive(Debug, Clone)]
pub struct ModerationConfig {
    pub comment_cooldown: Duration,
    /// Case-insensitive substrings rejected in comment bodies and author names.
    pub denylist: Vec<String>,
    /// Report count at which an active event moves to review. `None` never
    /// moves it automatically.
    pub review_threshold: Option<u32>,
    /// Bearer token identifying administrators.
    pub admin_token: Option<String>,
    /// Secret the auth gateway sends alongside user identity headers. `None`
    /// rejects every user identity header.
    pub gateway_secret: Option<String>,
    /// Maximum comment body length, in characters.
    pub max_comment_chars: usize,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            comment_cooldown: DEFAULT_COMMENT_COOLDOWN,
            denylist: DEFAULT_COMMENT_DENYLIST.iter().map(|s| s.to_string()).collect(),
            review_threshold: None,
            admin_token: None,
            gateway_secret: None,
            max_comment_chars: 2000,
        }
    }
}

impl ModerationConfig {
    pub fn with_admin_token(mut self, token: impl Into<String>) -> Self {
        self.admin_token = Some(token.into());
        self
    }

    pub fn with_gateway_secret(mut self, secret: impl Into<String>) -> Self {
        self.gateway_secret = Some(secret.into());
        self
    }

    pub fn with_review_threshold(mut self, threshold: Option<u32>) -> Self {
        self.review_threshold = threshold;
        self
    }

    pub fn with_comment_cooldown(mut self, cooldown: Duration) -> Self {
        self.comment_cooldown = cooldown;
        self
    }
}

/// Compares a configured secret with a supplied one in constant time.
///
/// An empty configured secret never matches.
pub(crate) fn secret_matches(expected: &str, supplied: &str) -> bool {
    !expected.is_empty() && bool::from(expected.as_bytes().ct_eq(supplied.as_bytes()))
}
