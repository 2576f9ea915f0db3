//! TOML configuration parsing and validation.
//!
//! ```toml
//! [db]
//! path = "./data/kw.sqlite"
//!
//! [media]
//! root = "./data/media"
//!
//! [ai]
//! endpoint = "https://prompt.example.com/v1/prompt"
//! license_key = "..."
//!
//! [thesaurus]
//! provider = "datamuse"
//! url = "https://api.datamuse.com/words"
//!
//! [server]
//! bind = "127.0.0.1:7341"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub media: MediaConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub thesaurus: ThesaurusConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MediaConfig {
    /// Directory holding uploaded attachments.
    pub root: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_http_timeout() -> u64 {
    30
}
fn default_user_agent() -> String {
    format!("keyword-harness/{}", env!("CARGO_PKG_VERSION"))
}

/// Hosted prompt endpoint used by the AI keyword source.
#[derive(Debug, Deserialize, Clone)]
pub struct AiConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub license_key: Option<String>,
    #[serde(default = "default_ai_model")]
    pub model: String,
    #[serde(default = "default_ai_language")]
    pub language: String,
    #[serde(default = "default_ai_limit")]
    pub limit: u32,
    #[serde(default = "default_ai_timeout")]
    pub timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            license_key: None,
            model: default_ai_model(),
            language: default_ai_language(),
            limit: default_ai_limit(),
            timeout_secs: default_ai_timeout(),
        }
    }
}

fn default_ai_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_ai_language() -> String {
    "en".to_string()
}
fn default_ai_limit() -> u32 {
    50
}
fn default_ai_timeout() -> u64 {
    10
}

impl AiConfig {
    /// License key from config, falling back to `KW_LICENSE_KEY`.
    pub fn resolve_license_key(&self) -> Option<String> {
        self.license_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var("KW_LICENSE_KEY").ok())
            .filter(|k| !k.trim().is_empty())
    }
}

/// Synonym lookup used when a local keyword is saved without terms.
#[derive(Debug, Deserialize, Clone)]
pub struct ThesaurusConfig {
    #[serde(default = "default_thesaurus_provider")]
    pub provider: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_thesaurus_max")]
    pub max_results: u32,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: i64,
}

impl Default for ThesaurusConfig {
    fn default() -> Self {
        Self {
            provider: default_thesaurus_provider(),
            url: None,
            max_results: default_thesaurus_max(),
            cache_ttl_secs: default_cache_ttl(),
        }
    }
}

fn default_thesaurus_provider() -> String {
    "disabled".to_string()
}
fn default_thesaurus_max() -> u32 {
    50
}
fn default_cache_ttl() -> i64 {
    7 * 24 * 60 * 60
}

impl ThesaurusConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.http.timeout_secs == 0 {
        anyhow::bail!("http.timeout_secs must be > 0");
    }

    if config.ai.limit < 1 {
        anyhow::bail!("ai.limit must be >= 1");
    }
    if config.ai.timeout_secs == 0 {
        anyhow::bail!("ai.timeout_secs must be > 0");
    }

    match config.thesaurus.provider.as_str() {
        "disabled" => {}
        "datamuse" => {
            if config.thesaurus.url.is_none() {
                anyhow::bail!("thesaurus.url must be specified when provider is 'datamuse'");
            }
        }
        other => anyhow::bail!(
            "Unknown thesaurus provider: '{}'. Must be disabled or datamuse.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &str) -> Config {
        let content = format!(
            "[db]\npath = \"/tmp/kw.sqlite\"\n\n[media]\nroot = \"/tmp/media\"\n{}",
            extra
        );
        toml::from_str(&content).unwrap()
    }

    #[test]
    fn test_defaults() {
        let cfg = parse("");
        assert_eq!(cfg.http.timeout_secs, 30);
        assert_eq!(cfg.ai.timeout_secs, 10);
        assert_eq!(cfg.ai.limit, 50);
        assert!(!cfg.thesaurus.is_enabled());
        assert_eq!(cfg.server.bind, "127.0.0.1:7341");
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn test_datamuse_requires_url() {
        let cfg = parse("[thesaurus]\nprovider = \"datamuse\"\n");
        assert!(validate(&cfg).is_err());
        let cfg = parse("[thesaurus]\nprovider = \"datamuse\"\nurl = \"https://api.datamuse.com/words\"\n");
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn test_unknown_thesaurus_provider() {
        let cfg = parse("[thesaurus]\nprovider = \"wordnet\"\n");
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn test_zero_ai_limit_rejected() {
        let cfg = parse("[ai]\nlimit = 0\n");
        assert!(validate(&cfg).is_err());
    }
}
