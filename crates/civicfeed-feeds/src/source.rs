//! Configured feed sources.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{FeedError, FeedResult};

/// One external calendar feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeedSource {
    /// Stable identifier, half of the reconciliation key.
    pub key: String,
    /// Display name stored on imported records.
    pub name: String,
    pub url: String,
}

impl FeedSource {
    pub fn new(key: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            url: url.into(),
        }
    }

    /// Parses a JSON array of `{key, name, url}` objects.
    ///
    /// A document that is not a JSON array is a configuration error. Items
    /// missing any of the three fields, or carrying an empty one, are dropped.
    pub fn parse_list(json: &str) -> FeedResult<Vec<FeedSource>> {
        let value: Value = serde_json::from_str(json).map_err(|e| {
            FeedError::configuration(format!("feed sources are not valid JSON: {}", e))
                .with_source(e)
        })?;

        let Value::Array(items) = value else {
            return Err(FeedError::configuration(
                "feed sources must be a JSON array",
            ));
        };

        Ok(items
            .iter()
            .enumerate()
            .filter_map(|(index, item)| {
                let source = Self::from_value(item);
                if source.is_none() {
                    debug!(index, "Dropping incomplete feed source");
                }
                source
            })
            .collect())
    }

    fn from_value(item: &Value) -> Option<Self> {
        let field = |name: &str| {
            item.get(name)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Some(Self {
            key: field("key")?,
            name: field("name")?,
            url: field("url")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FeedErrorCode;

    #[test]
    fn parses_complete_sources() {
        let sources = FeedSource::parse_list(
            r#"[{"key":"city","name":"City Hall","url":"https://city.example/cal.ics"}]"#,
        )
        .unwrap();
        assert_eq!(
            sources,
            vec![FeedSource::new("city", "City Hall", "https://city.example/cal.ics")]
        );
    }

    #[test]
    fn drops_incomplete_items() {
        let sources = FeedSource::parse_list(
            r#"[
                {"key":"a","name":"A","url":"https://a.example/a.ics"},
                {"key":"b","name":"B"},
                {"key":"","name":"C","url":"https://c.example/c.ics"},
                {"key":"d","name":"D","url":42},
                "not an object"
            ]"#,
        )
        .unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].key, "a");
    }

    #[test]
    fn non_array_is_configuration_error() {
        let err = FeedSource::parse_list(r#"{"key":"a"}"#).unwrap_err();
        assert_eq!(err.code(), FeedErrorCode::ConfigurationError);

        let err = FeedSource::parse_list("[not json").unwrap_err();
        assert_eq!(err.code(), FeedErrorCode::ConfigurationError);
    }

    #[test]
    fn empty_array_is_fine() {
        assert!(FeedSource::parse_list("[]").unwrap().is_empty());
    }
}
