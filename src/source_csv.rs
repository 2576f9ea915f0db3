//! CSV keyword sources: a file in the media library, or a remote URL.
//!
//! Both variants hand the bytes to [`read_csv`]; they differ only in where
//! the bytes come from. Neither caches anything: `refresh_terms` re-resolves
//! the attachment (or re-fetches the URL) every time.
//!
//! # Options
//!
//! | Key | File | URL | Description |
//! |-----|------|-----|-------------|
//! | `attachment_id` | ✓ | | Media library attachment id |
//! | `url` | | ✓ | CSV URL; Google Sheets edit links are converted to CSV exports |
//! | `columns_first_row` | ✓ | ✓ | Treat the first row as column names |
//! | `delimiter` | ✓ | ✓ | Single-character field separator (default `,`) |

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::csv_reader::read_csv;
use crate::error::SourceError;
use crate::media;
use crate::models::{Keyword, SourceKind, TermSet};
use crate::traits::{
    lenient_bool, lenient_i64, parse_options, validate_http_url, KeywordSource, OptionDescriptor,
    OptionKind, SourceContext, SourceDescriptor,
};

#[derive(Debug, Deserialize)]
struct CsvFileOptions {
    #[serde(default, deserialize_with = "lenient_i64")]
    attachment_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_bool")]
    columns_first_row: bool,
    #[serde(default)]
    delimiter: String,
}

#[derive(Debug, Deserialize)]
struct CsvUrlOptions {
    #[serde(default)]
    url: String,
    #[serde(default, deserialize_with = "lenient_bool")]
    columns_first_row: bool,
    #[serde(default)]
    delimiter: String,
}

fn shared_options() -> Vec<OptionDescriptor> {
    vec![
        OptionDescriptor::new(
            "columns_first_row",
            OptionKind::Toggle,
            "First row is columns",
            "Use the values in the first row as column names.",
        ),
        OptionDescriptor::new(
            "delimiter",
            OptionKind::Text,
            "Delimiter",
            "Character separating fields in the CSV. Defaults to a comma.",
        ),
    ]
}

// ═══════════════════════════════════════════════════════════════════════
// CSV file
// ═══════════════════════════════════════════════════════════════════════

pub struct CsvFileSource;

impl CsvFileSource {
    async fn fetch(&self, ctx: &SourceContext, keyword: &Keyword) -> Result<TermSet, SourceError> {
        let opts: CsvFileOptions = parse_options(keyword, self.label())?;
        let id = opts.attachment_id.ok_or_else(|| {
            SourceError::validation(
                "attachment_required",
                format!("Please choose a CSV file for keyword '{}'.", keyword.keyword),
            )
        })?;

        let path = media::resolve_for_keyword(ctx, keyword, id, "CSV").await?;
        let bytes = std::fs::read(&path).map_err(|e| {
            SourceError::fetch(
                "file_unreadable",
                format!("Could not read {}: {}", path.display(), e),
            )
        })?;

        read_csv(&bytes, &opts.delimiter, opts.columns_first_row)
    }
}

#[async_trait]
impl KeywordSource for CsvFileSource {
    fn kind(&self) -> SourceKind {
        SourceKind::CsvFile
    }

    fn label(&self) -> &str {
        "CSV File"
    }

    async fn register(&self, _ctx: &SourceContext, mut sources: Vec<SourceDescriptor>) -> Vec<SourceDescriptor> {
        let mut options = vec![OptionDescriptor::new(
            "attachment_id",
            OptionKind::Attachment,
            "CSV File",
            "A CSV file from the media library.",
        )];
        options.extend(shared_options());
        sources.push(SourceDescriptor {
            name: self.name().to_string(),
            label: self.label().to_string(),
            options,
        });
        sources
    }

    async fn save(&self, ctx: &SourceContext, keyword: Keyword) -> Result<Keyword, SourceError> {
        let terms = self.fetch(ctx, &keyword).await?;
        Ok(keyword.with_terms(terms))
    }

    async fn refresh_terms(
        &self,
        ctx: &SourceContext,
        _existing: TermSet,
        keyword: &Keyword,
    ) -> Result<TermSet, SourceError> {
        self.fetch(ctx, keyword).await
    }
}

// ═══════════════════════════════════════════════════════════════════════
// CSV URL
// ═══════════════════════════════════════════════════════════════════════

pub struct CsvUrlSource;

impl CsvUrlSource {
    async fn fetch(&self, ctx: &SourceContext, keyword: &Keyword) -> Result<TermSet, SourceError> {
        let opts: CsvUrlOptions = parse_options(keyword, self.label())?;
        let url = validate_http_url(&opts.url, "CSV")?;
        let url = rewrite_google_sheets_url(url);

        let bytes = ctx.fetch_bytes(url.as_str()).await?;
        read_csv(&bytes, &opts.delimiter, opts.columns_first_row)
    }
}

#[async_trait]
impl KeywordSource for CsvUrlSource {
    fn kind(&self) -> SourceKind {
        SourceKind::CsvUrl
    }

    fn label(&self) -> &str {
        "CSV URL"
    }

    async fn register(&self, _ctx: &SourceContext, mut sources: Vec<SourceDescriptor>) -> Vec<SourceDescriptor> {
        let mut options = vec![OptionDescriptor::new(
            "url",
            OptionKind::Url,
            "CSV URL",
            "Public URL of a CSV file. Google Sheets share links are converted automatically.",
        )];
        options.extend(shared_options());
        sources.push(SourceDescriptor {
            name: self.name().to_string(),
            label: self.label().to_string(),
            options,
        });
        sources
    }

    async fn save(&self, ctx: &SourceContext, keyword: Keyword) -> Result<Keyword, SourceError> {
        let terms = self.fetch(ctx, &keyword).await?;
        Ok(keyword.with_terms(terms))
    }

    async fn refresh_terms(
        &self,
        ctx: &SourceContext,
        _existing: TermSet,
        keyword: &Keyword,
    ) -> Result<TermSet, SourceError> {
        self.fetch(ctx, keyword).await
    }
}

/// Turns a Google Sheets editor link into its CSV export URL.
///
/// `https://docs.google.com/spreadsheets/d/<id>/edit#gid=5` becomes
/// `https://docs.google.com/spreadsheets/d/<id>/export?format=csv&gid=5`.
/// Any other URL is returned unchanged.
pub fn rewrite_google_sheets_url(mut url: Url) -> Url {
    if url.host_str() != Some("docs.google.com") {
        return url;
    }
    let path = url.path().to_string();
    if !path.starts_with("/spreadsheets/d/") {
        return url;
    }
    let Some(edit_at) = path.find("/edit") else {
        return url;
    };

    let gid = url
        .query_pairs()
        .find(|(k, _)| k == "gid")
        .map(|(_, v)| v.into_owned())
        .or_else(|| {
            url.fragment().and_then(|f| {
                f.split('&')
                    .find_map(|p| p.strip_prefix("gid="))
                    .map(str::to_string)
            })
        });

    url.set_path(&format!("{}/export", &path[..edit_at]));
    url.set_fragment(None);
    url.set_query(None);
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("format", "csv");
        if let Some(gid) = gid {
            query.append_pair("gid", &gid);
        }
    }
    url
}
