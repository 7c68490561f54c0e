//! CLI configuration.
//!
//! All settings live in a single `config.toml` file at
//! `~/.config/civicfeed/config.toml` by default. Secrets and the source list
//! can also come from the environment; see [`crate::cli::Cli`].

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use civicfeed_core::AdmissionWindow;
use civicfeed_core::time::{DEFAULT_LOOKAHEAD_DAYS, DEFAULT_LOOKBEHIND_DAYS};
use civicfeed_feeds::{DEFAULT_MAX_ENTRIES, FeedSource};
use civicfeed_server::{
    DEFAULT_COMMENT_DENYLIST, DEFAULT_GRACE_PERIOD_DAYS, ModerationConfig, PipelineConfig,
};
use serde::{Deserialize, Serialize};

use crate::cli::Cli;
use crate::error::{CliError, CliResult};

const REDACTED: &str = "<redacted>";

/// Configuration for the civicfeed CLI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub server: ServerSettings,
    pub pipeline: PipelineSettings,
    pub moderation: ModerationSettings,
    /// Configured feeds, as `[[feeds]]` tables.
    pub feeds: Vec<FeedSource>,
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: SocketAddr,
    /// JSON snapshot of the event store. In-memory only when unset.
    pub store_path: Option<PathBuf>,
    /// Seconds between scheduled ingestion runs. No scheduler when unset.
    pub ingest_interval_secs: Option<u64>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            store_path: None,
            ingest_interval_secs: None,
        }
    }
}

/// Ingestion settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub trigger_secret: Option<String>,
    pub max_entries_per_feed: usize,
    pub temporal_filter: bool,
    pub lookbehind_days: i64,
    pub lookahead_days: i64,
    pub content_screen: bool,
    pub grace_period_days: i64,
    pub fetch_timeout_secs: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            trigger_secret: None,
            max_entries_per_feed: DEFAULT_MAX_ENTRIES,
            temporal_filter: true,
            lookbehind_days: DEFAULT_LOOKBEHIND_DAYS,
            lookahead_days: DEFAULT_LOOKAHEAD_DAYS,
            content_screen: true,
            grace_period_days: DEFAULT_GRACE_PERIOD_DAYS,
            fetch_timeout_secs: 20,
        }
    }
}

/// Moderation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModerationSettings {
    pub admin_token: Option<String>,
    /// Without it, requests carrying user identity headers are rejected.
    pub gateway_secret: Option<String>,
    pub comment_cooldown_secs: u64,
    /// Reports that send an active event to review. Never when unset.
    pub review_threshold: Option<u32>,
    pub denylist: Vec<String>,
}

impl Default for ModerationSettings {
    fn default() -> Self {
        Self {
            admin_token: None,
            gateway_secret: None,
            comment_cooldown_secs: 20,
            review_threshold: None,
            denylist: DEFAULT_COMMENT_DENYLIST.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl CliConfig {
    /// Loads configuration from the default path, or defaults if it is absent.
    pub fn load() -> CliResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> CliResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CliError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content)
            .map_err(|e| CliError::config(format!("failed to parse {}: {}", path.display(), e)))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("civicfeed")
            .join("config.toml")
    }

    /// Loads the file named by `--config`, or the default one.
    pub fn resolve(cli: &Cli) -> CliResult<Self> {
        let config = match &cli.config {
            Some(path) => Self::load_from(path)?,
            None => Self::load()?,
        };
        config.with_overrides(cli)
    }

    /// Applies command-line and environment overrides.
    ///
    /// `--feed-sources` replaces the `[[feeds]]` list entirely.
    pub fn with_overrides(mut self, cli: &Cli) -> CliResult<Self> {
        if let Some(json) = &cli.feed_sources {
            self.feeds = FeedSource::parse_list(json)?;
        }
        if let Some(secret) = &cli.trigger_secret {
            self.pipeline.trigger_secret = Some(secret.clone());
        }
        if let Some(token) = &cli.admin_token {
            self.moderation.admin_token = Some(token.clone());
        }
        if let Some(secret) = &cli.gateway_secret {
            self.moderation.gateway_secret = Some(secret.clone());
        }
        if let Some(path) = &cli.store_path {
            self.server.store_path = Some(path.clone());
        }
        Ok(self)
    }

    /// Checks values that would make a run meaningless.
    pub fn validate(&self) -> CliResult<()> {
        if self.pipeline.max_entries_per_feed == 0 {
            return Err(CliError::config("max_entries_per_feed must be positive"));
        }
        if self.pipeline.grace_period_days <= 0 {
            return Err(CliError::config("grace_period_days must be positive"));
        }
        if self.pipeline.fetch_timeout_secs == 0 {
            return Err(CliError::config("fetch_timeout_secs must be positive"));
        }
        if self.server.ingest_interval_secs == Some(0) {
            return Err(CliError::config("ingest_interval_secs must be positive"));
        }
        if self.moderation.review_threshold == Some(0) {
            return Err(CliError::config("review_threshold must be positive"));
        }

        let mut keys = std::collections::HashSet::new();
        for feed in &self.feeds {
            if feed.key.trim().is_empty() || feed.url.trim().is_empty() {
                return Err(CliError::config("every feed needs a key and a url"));
            }
            if !keys.insert(feed.key.as_str()) {
                return Err(CliError::config(format!("duplicate feed key: {}", feed.key)));
            }
            civicfeed_feeds::validate_url(&feed.url)
                .map_err(|e| CliError::config(format!("feed {}: {}", feed.key, e.message())))?;
        }
        Ok(())
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        let settings = &self.pipeline;
        let window = settings.temporal_filter.then(|| {
            AdmissionWindow::from_days(settings.lookbehind_days, settings.lookahead_days)
        });

        PipelineConfig {
            sources: self.feeds.clone(),
            trigger_secret: settings.trigger_secret.clone().filter(|s| !s.is_empty()),
            max_entries_per_feed: settings.max_entries_per_feed,
            admission_window: window,
            content_screen: settings.content_screen,
            grace_period: chrono::Duration::days(settings.grace_period_days),
            fetch_timeout: Duration::from_secs(settings.fetch_timeout_secs),
        }
    }

    pub fn moderation_config(&self) -> ModerationConfig {
        let settings = &self.moderation;
        ModerationConfig {
            comment_cooldown: Duration::from_secs(settings.comment_cooldown_secs),
            denylist: settings.denylist.clone(),
            review_threshold: settings.review_threshold,
            admin_token: settings.admin_token.clone().filter(|s| !s.is_empty()),
            gateway_secret: settings.gateway_secret.clone().filter(|s| !s.is_empty()),
            ..Default::default()
        }
    }

    /// A copy safe to print: secrets replaced, feed URLs kept.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        let redact = |s: &mut Option<String>| {
            if s.is_some() {
                *s = Some(REDACTED.to_string());
            }
        };
        redact(&mut copy.pipeline.trigger_secret);
        redact(&mut copy.moderation.admin_token);
        redact(&mut copy.moderation.gateway_secret);
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli(args: &[&str]) -> Cli {
        let mut full = vec!["civicfeed"];
        full.extend_from_slice(args);
        full.push("ingest");
        Cli::try_parse_from(full).unwrap()
    }

    mod file {
        use super::*;

        #[test]
        fn loads_toml_with_feeds() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("config.toml");
            std::fs::write(
                &path,
                r#"
[server]
bind = "0.0.0.0:9090"
store_path = "/var/lib/civicfeed/store.json"

[pipeline]
temporal_filter = false
grace_period_days = 30

[moderation]
review_threshold = 5

[[feeds]]
key = "city"
name = "City Hall"
url = "https://city.example/events.ics"
"#,
            )
            .unwrap();

            let config = CliConfig::load_from(&path).unwrap();

            assert_eq!(config.server.bind.port(), 9090);
            assert_eq!(config.feeds.len(), 1);
            assert_eq!(config.moderation.comment_cooldown_secs, 20);

            let pipeline = config.pipeline_config();
            assert!(pipeline.admission_window.is_none());
            assert_eq!(pipeline.grace_period, chrono::Duration::days(30));
            assert_eq!(pipeline.max_entries_per_feed, 200);
            assert_eq!(config.moderation_config().review_threshold, Some(5));
            config.validate().unwrap();
        }

        #[test]
        fn parse_error_names_the_file() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("broken.toml");
            std::fs::write(&path, "[server\nbind = 1").unwrap();

            let err = CliConfig::load_from(&path).unwrap_err();
            assert!(err.to_string().contains("broken.toml"));
        }
    }

    mod overrides {
        use super::*;

        #[test]
        fn environment_sources_replace_file_feeds() {
            let mut config = CliConfig::default();
            config.feeds.push(FeedSource::new("old", "Old", "https://old.example/a.ics"));

            let cli = cli(&[
                "--feed-sources",
                r#"[{"key":"new","name":"New","url":"https://new.example/a.ics"},{"key":"x"}]"#,
                "--admin-token",
                "tok",
                "--gateway-secret",
                "gw",
            ]);
            let config = config.with_overrides(&cli).unwrap();

            assert_eq!(config.feeds.len(), 1);
            assert_eq!(config.feeds[0].key, "new");
            assert!(config.moderation_config().admin_token.is_some());
            assert_eq!(config.moderation_config().gateway_secret.as_deref(), Some("gw"));
        }

        #[test]
        fn malformed_sources_are_fatal() {
            let cli = cli(&["--feed-sources", r#"{"key":"a"}"#]);
            assert!(CliConfig::default().with_overrides(&cli).is_err());
        }
    }

    #[test]
    fn redaction_hides_secrets() {
        let mut config = CliConfig::default();
        config.pipeline.trigger_secret = Some("hunter2".into());
        config.moderation.admin_token = Some("root".into());
        config.moderation.gateway_secret = Some("gatekeeper".into());

        let dumped = toml::to_string(&config.redacted()).unwrap();

        assert!(!dumped.contains("hunter2"));
        assert!(!dumped.contains("root"));
        assert!(!dumped.contains("gatekeeper"));
        assert!(dumped.contains(REDACTED));
    }

    #[test]
    fn validation_rejects_duplicate_keys() {
        let mut config = CliConfig::default();
        config.feeds = vec![
            FeedSource::new("a", "A", "https://a.example/1.ics"),
            FeedSource::new("a", "A2", "https://a.example/2.ics"),
        ];
        assert!(config.validate().is_err());

        config.feeds.pop();
        config.feeds[0].url = "ftp://a.example/1.ics".into();
        assert!(config.validate().is_err());
    }
}
