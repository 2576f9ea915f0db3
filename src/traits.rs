//! The keyword source trait and its registry.
//!
//! Every term provider implements [`KeywordSource`]. The registry is built
//! once at startup and handed to the CLI, the HTTP server and the service
//! layer; dispatch is a lookup by [`SourceKind`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                   SourceRegistry                     │
//! │ ┌──────┐ ┌─────────┐ ┌──────────┐ ┌─────┐ ┌────────┐ │
//! │ │Local │ │CSV file │ │ Database │ │ RSS │ │   AI   │ │
//! │ │      │ │CSV URL  │ │  table   │ │     │ │        │ │
//! │ └──────┘ └─────────┘ └──────────┘ └─────┘ └────────┘ │
//! └──────────────┬───────────────────────────────────────┘
//!                ▼
//!   save() at edit time, refresh_terms() before generation
//! ```
//!
//! # Usage
//!
//! ```rust
//! use keyword_harness::models::SourceKind;
//! use keyword_harness::traits::SourceRegistry;
//!
//! let registry = SourceRegistry::with_builtins();
//! assert!(registry.get(SourceKind::RssFeed).is_some());
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::SourceError;
use crate::models::{Keyword, SourceKind, TermSet};

// ═══════════════════════════════════════════════════════════════════════
// Descriptors
// ═══════════════════════════════════════════════════════════════════════

/// Input widget type of a source option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionKind {
    Text,
    Textarea,
    Url,
    Number,
    Toggle,
    Select,
    Attachment,
    File,
}

/// One configuration option a source accepts.
#[derive(Debug, Clone, Serialize)]
pub struct OptionDescriptor {
    pub key: String,
    pub kind: OptionKind,
    pub label: String,
    pub description: String,
    /// Allowed values for [`OptionKind::Select`]; empty otherwise.
    pub values: Vec<String>,
}

impl OptionDescriptor {
    pub fn new(key: &str, kind: OptionKind, label: &str, description: &str) -> Self {
        Self {
            key: key.to_string(),
            kind,
            label: label.to_string(),
            description: description.to_string(),
            values: Vec::new(),
        }
    }

    pub fn with_values(mut self, values: Vec<String>) -> Self {
        self.values = values;
        self
    }
}

/// Registry entry describing a source and its options, in display order.
#[derive(Debug, Clone, Serialize)]
pub struct SourceDescriptor {
    pub name: String,
    pub label: String,
    pub options: Vec<OptionDescriptor>,
}

// ═══════════════════════════════════════════════════════════════════════
// SourceContext
// ═══════════════════════════════════════════════════════════════════════

/// Shared resources available to every source call.
#[derive(Clone)]
pub struct SourceContext {
    pub config: Arc<Config>,
    pub pool: SqlitePool,
    pub http: reqwest::Client,
}

impl SourceContext {
    pub fn new(config: Arc<Config>, pool: SqlitePool) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http.timeout_secs))
            .user_agent(config.http.user_agent.clone())
            .build()?;
        Ok(Self { config, pool, http })
    }

    /// GETs `url` and returns the body bytes, mapping failures to fetch errors.
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, SourceError> {
        tracing::debug!(url, "fetching");
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| SourceError::from_request(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::fetch(
                "http_status",
                format!("{} returned HTTP {}", url, status),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SourceError::from_request(url, e))?;
        Ok(bytes.to_vec())
    }
}

/// Deserializes a keyword's options into a source-specific struct.
pub fn parse_options<T: for<'de> Deserialize<'de>>(
    keyword: &Keyword,
    source_label: &str,
) -> Result<T, SourceError> {
    serde_json::from_value(Value::Object(keyword.options.clone())).map_err(|e| {
        SourceError::validation(
            "options_invalid",
            format!("{} settings for keyword '{}' are invalid: {}", source_label, keyword.keyword, e),
        )
    })
}

/// Accepts an integer option given either as a JSON number or a numeric string.
pub fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom("expected an integer")),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("expected an integer, got '{}'", s))),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected an integer, got {}",
            other
        ))),
    }
}

/// Accepts a toggle given as a bool, `0`/`1`, or `"true"`/`"on"`/`"yes"`.
pub fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Bool(b)) => b,
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0) != 0,
        Some(Value::String(s)) => matches!(s.trim().to_lowercase().as_str(), "1" | "true" | "on" | "yes"),
        _ => false,
    })
}

/// Parses `raw` as an absolute http(s) URL.
pub fn validate_http_url(raw: &str, what: &str) -> Result<url::Url, SourceError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(SourceError::validation(
            "url_missing",
            format!("Please enter the {} URL.", what),
        ));
    }
    match url::Url::parse(trimmed) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => Ok(url),
        _ => Err(SourceError::validation(
            "url_invalid",
            format!("The {} URL '{}' is not a valid http(s) URL.", what, trimmed),
        )),
    }
}

/// Options whose values are always free text, never coerced.
const TEXT_OPTIONS: &[&str] = &["data", "delimiter", "columns", "topic", "file_content"];

/// Converts a loosely-typed option map (e.g. `key=value` pairs from the CLI)
/// into JSON, coercing `true`/`false` and integers outside `TEXT_OPTIONS`.
pub fn options_from_pairs(pairs: &[(String, String)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (key, raw) in pairs {
        let value = if TEXT_OPTIONS.contains(&key.as_str()) {
            Value::String(raw.clone())
        } else {
            match raw.as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                other => match other.parse::<i64>() {
                    Ok(n) => Value::from(n),
                    Err(_) => Value::String(other.to_string()),
                },
            }
        };
        map.insert(key.clone(), value);
    }
    map
}

// ═══════════════════════════════════════════════════════════════════════
// KeywordSource Trait
// ═══════════════════════════════════════════════════════════════════════

/// A provider of keyword terms.
///
/// # Lifecycle
///
/// 1. [`register`](KeywordSource::register) contributes a descriptor used
///    to render the source picker and option form.
/// 2. [`save`](KeywordSource::save) validates the keyword's options, fetches
///    the terms and returns the keyword with `delimiter`, `columns` and
///    `data` filled in. A validation error blocks persistence.
/// 3. [`refresh_terms`](KeywordSource::refresh_terms) re-fetches live data
///    right before generation. Sources with static data keep the default,
///    which returns the existing terms.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use keyword_harness::error::SourceError;
/// use keyword_harness::models::{Keyword, SourceKind, TermSet};
/// use keyword_harness::traits::{KeywordSource, SourceContext, SourceDescriptor};
///
/// pub struct FixedSource;
///
/// #[async_trait]
/// impl KeywordSource for FixedSource {
///     fn kind(&self) -> SourceKind { SourceKind::Local }
///     fn label(&self) -> &str { "Fixed" }
///
///     async fn register(&self, _ctx: &SourceContext, mut sources: Vec<SourceDescriptor>) -> Vec<SourceDescriptor> {
///         sources.push(SourceDescriptor { name: "fixed".into(), label: "Fixed".into(), options: vec![] });
///         sources
///     }
///
///     async fn save(&self, _ctx: &SourceContext, keyword: Keyword) -> Result<Keyword, SourceError> {
///         Ok(keyword.with_terms(TermSet { data: "alpha\nbeta".into(), ..Default::default() }))
///     }
/// }
/// ```
#[async_trait]
pub trait KeywordSource: Send + Sync {
    /// Which variant of [`SourceKind`] this implementation serves.
    fn kind(&self) -> SourceKind;

    /// Stable machine identifier.
    fn name(&self) -> &str {
        self.kind().as_str()
    }

    /// Human label for pickers and listings.
    fn label(&self) -> &str;

    /// Appends this source's descriptor to `sources`.
    async fn register(&self, ctx: &SourceContext, sources: Vec<SourceDescriptor>) -> Vec<SourceDescriptor>;

    /// Validates options, fetches terms and returns the populated keyword.
    async fn save(&self, ctx: &SourceContext, keyword: Keyword) -> Result<Keyword, SourceError>;

    /// Re-fetches terms from the keyword's stored options.
    async fn refresh_terms(
        &self,
        _ctx: &SourceContext,
        existing: TermSet,
        _keyword: &Keyword,
    ) -> Result<TermSet, SourceError> {
        Ok(existing)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

/// Registry of keyword sources.
///
/// # Example
///
/// ```rust
/// use keyword_harness::traits::SourceRegistry;
///
/// let registry = SourceRegistry::with_builtins();
/// assert_eq!(registry.len(), 7);
/// ```
pub struct SourceRegistry {
    sources: Vec<Box<dyn KeywordSource>>,
}

impl SourceRegistry {
    /// Create an empty source registry.
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    /// Create a registry with every built-in source.
    pub fn with_builtins() -> Self {
        use crate::source_ai::AiSource;
        use crate::source_csv::{CsvFileSource, CsvUrlSource};
        use crate::source_database::DatabaseTableSource;
        use crate::source_local::LocalSource;
        use crate::source_rss::RssFeedSource;
        use crate::source_spreadsheet::SpreadsheetSource;

        let mut registry = Self::new();
        registry.register(Box::new(LocalSource));
        registry.register(Box::new(CsvFileSource));
        registry.register(Box::new(CsvUrlSource));
        registry.register(Box::new(DatabaseTableSource));
        registry.register(Box::new(RssFeedSource));
        registry.register(Box::new(SpreadsheetSource));
        registry.register(Box::new(AiSource));
        registry
    }

    /// Register a source. A later registration for the same kind replaces
    /// the earlier one.
    pub fn register(&mut self, source: Box<dyn KeywordSource>) {
        self.sources.retain(|s| s.kind() != source.kind());
        self.sources.push(source);
    }

    /// Find the source serving `kind`.
    pub fn get(&self, kind: SourceKind) -> Option<&dyn KeywordSource> {
        self.sources
            .iter()
            .find(|s| s.kind() == kind)
            .map(|s| s.as_ref())
    }

    /// Like [`get`](Self::get) but reports a missing source as an error.
    pub fn require(&self, kind: SourceKind) -> Result<&dyn KeywordSource, SourceError> {
        self.get(kind).ok_or_else(|| {
            SourceError::validation(
                "source_unavailable",
                format!("No source is registered for '{}'.", kind),
            )
        })
    }

    /// Folds every source's [`register`](KeywordSource::register) over an
    /// empty descriptor list.
    pub async fn descriptors(&self, ctx: &SourceContext) -> Vec<SourceDescriptor> {
        let mut descriptors = Vec::new();
        for source in &self.sources {
            descriptors = source.register(ctx, descriptors).await;
        }
        descriptors
    }

    pub fn sources(&self) -> &[Box<dyn KeywordSource>] {
        &self.sources
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_cover_every_kind() {
        let registry = SourceRegistry::with_builtins();
        for kind in SourceKind::ALL {
            let source = registry.get(kind).expect("source registered");
            assert_eq!(source.name(), kind.as_str());
        }
    }

    #[test]
    fn test_options_from_pairs_coerces_scalars() {
        let map = options_from_pairs(&[
            ("attachment_id".into(), "7".into()),
            ("columns_first_row".into(), "true".into()),
            ("data".into(), "12345".into()),
            ("url".into(), "https://example.com/feed".into()),
        ]);
        assert_eq!(map["attachment_id"], Value::from(7));
        assert_eq!(map["columns_first_row"], Value::Bool(true));
        assert_eq!(map["data"], Value::String("12345".into()));
        assert_eq!(map["url"], Value::String("https://example.com/feed".into()));
    }

    #[test]
    fn test_options_from_pairs_keeps_text_options_verbatim() {
        let map = options_from_pairs(&[
            ("data".into(), "true".into()),
            ("topic".into(), "false".into()),
            ("columns".into(), "42".into()),
        ]);
        assert_eq!(map["data"], Value::String("true".into()));
        assert_eq!(map["topic"], Value::String("false".into()));
        assert_eq!(map["columns"], Value::String("42".into()));
    }

    #[test]
    fn test_validate_http_url() {
        assert!(validate_http_url("https://example.com/feed.xml", "RSS feed").is_ok());
        assert_eq!(validate_http_url("", "RSS feed").unwrap_err().code, "url_missing");
        assert_eq!(validate_http_url("not a url", "RSS feed").unwrap_err().code, "url_invalid");
        assert_eq!(validate_http_url("ftp://example.com/x", "RSS feed").unwrap_err().code, "url_invalid");
    }

    #[derive(Debug, Deserialize)]
    struct Lenient {
        #[serde(default, deserialize_with = "lenient_i64")]
        id: Option<i64>,
        #[serde(default, deserialize_with = "lenient_bool")]
        flag: bool,
    }

    #[test]
    fn test_lenient_option_parsing() {
        let v: Lenient = serde_json::from_value(serde_json::json!({"id": "12", "flag": "on"})).unwrap();
        assert_eq!(v.id, Some(12));
        assert!(v.flag);
        let v: Lenient = serde_json::from_value(serde_json::json!({"id": 3, "flag": 0})).unwrap();
        assert_eq!(v.id, Some(3));
        assert!(!v.flag);
        let v: Lenient = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(v.id, None);
        assert!(serde_json::from_value::<Lenient>(serde_json::json!({"id": "abc"})).is_err());
    }
}
