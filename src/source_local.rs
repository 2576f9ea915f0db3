//! Local keyword source: terms typed in directly or uploaded as a text file.
//!
//! # Options
//!
//! | Key | Description |
//! |-----|-------------|
//! | `data` | Terms, one per line |
//! | `delimiter` | Column separator within a term (optional) |
//! | `columns` | Comma-separated column names (optional) |
//! | `file_content` | Uploaded plain-text file whose lines are appended to `data` (optional) |
//! | `attachment_id` | Plain-text file from the media library, appended the same way (optional) |
//!
//! Paths on the host are never read. The CLI uploads a local file by
//! sending its contents as `file_content`; a `file` option is rejected.
//!
//! With no terms and no file, the keyword name is looked up in the
//! configured thesaurus and its synonyms become the terms.
//!
//! Local data is static, so there is no refresh step.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::SourceError;
use crate::media;
use crate::models::{Keyword, SourceKind, TermSet};
use crate::terms::{normalize_columns, normalize_lines, split_term};
use crate::thesaurus;
use crate::traits::{
    lenient_i64, parse_options, KeywordSource, OptionDescriptor, OptionKind, SourceContext, SourceDescriptor,
};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LocalOptions {
    data: String,
    delimiter: String,
    columns: String,
    file_content: String,
    #[serde(deserialize_with = "lenient_i64")]
    attachment_id: Option<i64>,
    file: Option<Value>,
}

pub struct LocalSource;

#[async_trait]
impl KeywordSource for LocalSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Local
    }

    fn label(&self) -> &str {
        "Local"
    }

    async fn register(&self, _ctx: &SourceContext, mut sources: Vec<SourceDescriptor>) -> Vec<SourceDescriptor> {
        sources.push(SourceDescriptor {
            name: self.name().to_string(),
            label: self.label().to_string(),
            options: vec![
                OptionDescriptor::new(
                    "data",
                    OptionKind::Textarea,
                    "Terms",
                    "One term per line. Leave blank to fetch synonyms of the keyword name.",
                ),
                OptionDescriptor::new(
                    "delimiter",
                    OptionKind::Text,
                    "Delimiter",
                    "Separator between columns within each term, e.g. a comma.",
                ),
                OptionDescriptor::new(
                    "columns",
                    OptionKind::Text,
                    "Columns",
                    "Comma-separated column names, one per delimited value.",
                ),
                OptionDescriptor::new(
                    "file_content",
                    OptionKind::File,
                    "Import file",
                    "Plain-text file whose lines are appended to the terms.",
                ),
                OptionDescriptor::new(
                    "attachment_id",
                    OptionKind::Attachment,
                    "Media library file",
                    "Plain-text file from the media library whose lines are appended to the terms.",
                ),
            ],
        });
        sources
    }

    async fn save(&self, ctx: &SourceContext, keyword: Keyword) -> Result<Keyword, SourceError> {
        let opts: LocalOptions = parse_options(&keyword, self.label())?;

        if opts.file.is_some() {
            return Err(SourceError::validation(
                "file_path_unsupported",
                format!(
                    "Keyword '{}': terms files cannot be given as a path. Send the file contents as \
                     `file_content`, or add it with `kw media add <file>` and pass `attachment_id`.",
                    keyword.keyword
                ),
            ));
        }

        let mut lines = normalize_lines(&opts.data);
        lines.extend(normalize_lines(&opts.file_content));
        if let Some(id) = opts.attachment_id {
            let path = media::resolve_for_keyword(ctx, &keyword, id, "terms").await?;
            let content = std::fs::read_to_string(&path).map_err(|e| {
                SourceError::validation(
                    "file_unreadable",
                    format!("Could not read terms file {}: {}", path.display(), e),
                )
            })?;
            lines.extend(normalize_lines(&content));
        }

        if lines.is_empty() {
            match thesaurus::lookup_synonyms(ctx, &keyword.keyword).await {
                Ok(words) => lines = words,
                Err(e) => tracing::warn!(keyword = %keyword.keyword, error = %e, "thesaurus lookup failed"),
            }
        }

        if lines.is_empty() {
            return Err(SourceError::validation(
                "no_terms",
                format!(
                    "Keyword '{}' has no terms. Enter at least one term or upload a terms file.",
                    keyword.keyword
                ),
            ));
        }

        let columns = normalize_columns(&opts.columns);
        validate_local_terms(&lines, &opts.delimiter, &columns)?;

        let terms = TermSet {
            delimiter: opts.delimiter.clone(),
            columns: columns.clone(),
            data: lines.join("\n"),
        };

        let mut options = Map::new();
        options.insert("data".into(), Value::String(terms.data.clone()));
        options.insert("delimiter".into(), Value::String(terms.delimiter.clone()));
        options.insert("columns".into(), Value::String(columns));

        let mut saved = keyword.with_terms(terms);
        saved.options = options;
        Ok(saved)
    }
}

/// Checks the first term against the declared delimiter and columns.
pub fn validate_local_terms(lines: &[String], delimiter: &str, columns: &str) -> Result<(), SourceError> {
    let column_count = columns.split(',').filter(|c| !c.trim().is_empty()).count();

    if delimiter.is_empty() {
        if column_count > 0 {
            return Err(SourceError::validation(
                "delimiter_missing",
                "Columns were specified, so a delimiter is required to separate them in each term.",
            ));
        }
        return Ok(());
    }

    if column_count == 0 {
        return Err(SourceError::validation(
            "columns_missing",
            format!(
                "A delimiter ('{}') was specified, so column names are required.",
                delimiter
            ),
        ));
    }

    let Some(first) = lines.first() else {
        return Ok(());
    };

    if !first.contains(delimiter) {
        return Err(SourceError::validation(
            "delimiter_not_found",
            format!(
                "The delimiter '{}' could not be found in the first term '{}'.",
                delimiter, first
            ),
        ));
    }

    let field_count = split_term(first, delimiter).len();
    if field_count != column_count {
        return Err(SourceError::validation(
            "column_count_mismatch",
            format!(
                "The number of columns ({}) does not match the number of delimited values ({}) in the first term '{}'.",
                column_count, field_count, first
            ),
        ));
    }

    Ok(())
}
