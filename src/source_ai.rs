//! AI keyword source: one-shot term generation from a hosted prompt endpoint.
//!
//! The endpoint is called once at save time with the keyword's topic. The
//! generated terms are then stored as a plain local keyword: the source is
//! switched to `local` and the options are replaced with local options, so
//! later edits and refreshes never call the endpoint again.
//!
//! # Request
//!
//! ```text
//! POST {ai.endpoint}
//! {"license_key": "..", "prompt": "<topic>", "content_type": "keywords",
//!  "limit": 50, "language": "en", "model": "gpt-4o-mini"}
//! ```
//!
//! # Response
//!
//! ```text
//! {"success": true,  "data": "term one\nterm two"}
//! {"success": false, "data": "reason"}
//! ```
//!
//! HTTP 403 means the license is not allowed to use the endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

use crate::error::SourceError;
use crate::models::{Keyword, SourceKind, TermSet};
use crate::terms::{normalize_columns, normalize_lines};
use crate::traits::{
    lenient_i64, parse_options, KeywordSource, OptionDescriptor, OptionKind, SourceContext,
    SourceDescriptor,
};

#[derive(Debug, Default, Deserialize)]
struct AiOptions {
    #[serde(default)]
    topic: String,
    #[serde(default)]
    columns: String,
    #[serde(default, deserialize_with = "lenient_i64")]
    limit: Option<i64>,
}

#[derive(Debug, Serialize)]
struct PromptRequest<'a> {
    license_key: &'a str,
    prompt: &'a str,
    content_type: &'static str,
    limit: u32,
    language: &'a str,
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct PromptResponse {
    success: bool,
    #[serde(default)]
    data: Value,
}

/// Splits a completion into terms.
///
/// When columns were requested the model is asked to answer with a header
/// line, which becomes the keyword's columns.
pub fn split_completion(text: &str, columns_requested: bool) -> TermSet {
    let mut lines = normalize_lines(text);
    if columns_requested && !lines.is_empty() {
        let header = lines.remove(0);
        return TermSet {
            delimiter: ",".to_string(),
            columns: normalize_columns(&header),
            data: lines.join("\n"),
        };
    }
    TermSet {
        delimiter: String::new(),
        columns: String::new(),
        data: lines.join("\n"),
    }
}

fn prompt_text(topic: &str, columns: &str) -> String {
    if columns.is_empty() {
        topic.to_string()
    } else {
        format!(
            "{}\n\nAnswer as comma-separated values. The first line must be the header: {}",
            topic, columns
        )
    }
}

pub struct AiSource;

impl AiSource {
    async fn generate(&self, ctx: &SourceContext, keyword: &Keyword) -> Result<TermSet, SourceError> {
        let opts: AiOptions = parse_options(keyword, self.label())?;
        let topic = opts.topic.trim();
        if topic.is_empty() {
            return Err(SourceError::validation(
                "topic_missing",
                format!("Please enter a topic to generate terms for keyword '{}'.", keyword.keyword),
            ));
        }

        let cfg = &ctx.config.ai;
        let endpoint = cfg.endpoint.as_deref().filter(|e| !e.trim().is_empty()).ok_or_else(|| {
            SourceError::validation(
                "ai_not_configured",
                "No AI endpoint is configured. Set [ai].endpoint in the config file.",
            )
        })?;
        let license_key = cfg.resolve_license_key().ok_or_else(|| {
            SourceError::validation(
                "license_missing",
                "No license key is configured. Set [ai].license_key or KW_LICENSE_KEY.",
            )
        })?;

        let limit = match opts.limit {
            Some(n) if n >= 1 => u32::try_from(n).unwrap_or(u32::MAX),
            _ => cfg.limit,
        };
        let columns = normalize_columns(&opts.columns);
        let prompt = prompt_text(topic, &columns);

        let body = PromptRequest {
            license_key: &license_key,
            prompt: &prompt,
            content_type: "keywords",
            limit,
            language: &cfg.language,
            model: &cfg.model,
        };

        tracing::debug!(keyword = %keyword.keyword, endpoint, limit, "requesting AI terms");
        let response = ctx
            .http
            .post(endpoint)
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .json(&body)
            .send()
            .await
            .map_err(|e| SourceError::from_request(endpoint, e))?;

        let status = response.status();
        if status == reqwest::StatusCode::FORBIDDEN {
            return Err(SourceError::blocked(
                "ai_blocked",
                "The AI endpoint refused the request (HTTP 403). Check that the license key is valid and active.",
            ));
        }
        if !status.is_success() {
            return Err(SourceError::fetch(
                "http_status",
                format!("{} returned HTTP {}", endpoint, status),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SourceError::from_request(endpoint, e))?;
        let parsed: PromptResponse = serde_json::from_slice(&bytes).map_err(|e| {
            SourceError::fetch("ai_response", format!("Unexpected AI response: {}", e))
        })?;

        let text = match parsed.data {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => other.to_string(),
        };
        if !parsed.success {
            return Err(SourceError::fetch("ai_error", text));
        }

        let terms = split_completion(&text, !columns.is_empty());
        if terms.is_empty() {
            return Err(SourceError::fetch(
                "ai_empty",
                format!("The AI endpoint returned no terms for '{}'.", topic),
            ));
        }
        Ok(terms)
    }
}

#[async_trait]
impl KeywordSource for AiSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Ai
    }

    fn label(&self) -> &str {
        "AI"
    }

    async fn register(&self, _ctx: &SourceContext, mut sources: Vec<SourceDescriptor>) -> Vec<SourceDescriptor> {
        sources.push(SourceDescriptor {
            name: self.name().to_string(),
            label: self.label().to_string(),
            options: vec![
                OptionDescriptor::new(
                    "topic",
                    OptionKind::Textarea,
                    "Topic",
                    "What the terms should be about. Terms are generated once and stored as a local keyword.",
                ),
                OptionDescriptor::new(
                    "columns",
                    OptionKind::Text,
                    "Columns",
                    "Optional comma-separated column names to generate for each term.",
                ),
                OptionDescriptor::new(
                    "limit",
                    OptionKind::Number,
                    "Number of terms",
                    "Maximum number of terms to generate.",
                ),
            ],
        });
        sources
    }

    async fn save(&self, ctx: &SourceContext, keyword: Keyword) -> Result<Keyword, SourceError> {
        let terms = self.generate(ctx, &keyword).await?;

        let mut options = Map::new();
        options.insert("data".into(), Value::String(terms.data.clone()));
        options.insert("delimiter".into(), Value::String(terms.delimiter.clone()));
        options.insert("columns".into(), Value::String(terms.columns.clone()));

        let mut saved = keyword.with_terms(terms);
        saved.source = SourceKind::Local;
        saved.options = options;
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_completion_with_columns() {
        let terms = split_completion("col1,col2\nval1,val2\nval3,val4", true);
        assert_eq!(terms.columns, "col1,col2");
        assert_eq!(terms.delimiter, ",");
        assert_eq!(terms.data, "val1,val2\nval3,val4");
        assert!(terms.validate_shape().is_ok());
    }

    #[test]
    fn test_split_completion_plain() {
        let terms = split_completion("  plumber\r\n\r\nelectrician \n", false);
        assert_eq!(terms.columns, "");
        assert_eq!(terms.delimiter, "");
        assert_eq!(terms.data, "plumber\nelectrician");
    }

    #[test]
    fn test_prompt_mentions_columns() {
        assert_eq!(prompt_text("dog breeds", ""), "dog breeds");
        assert!(prompt_text("dog breeds", "breed,size").ends_with("header: breed,size"));
    }
}
