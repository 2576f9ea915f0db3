//! RSS / Atom feed keyword source.
//!
//! Each feed item becomes one term with the fixed columns in
//! [`FEED_COLUMNS`]. Feeds change constantly, so `refresh_terms` always
//! polls the URL again and ignores whatever was stored at save time.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::SourceError;
use crate::feed::{parse_feed, FEED_COLUMNS};
use crate::models::{Keyword, SourceKind, TermSet};
use crate::terms::{encode_row, strip_breaks};
use crate::traits::{
    parse_options, validate_http_url, KeywordSource, OptionDescriptor, OptionKind, SourceContext,
    SourceDescriptor,
};

const DELIMITER: &str = ",";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RssOptions {
    url: String,
}

pub struct RssFeedSource;

impl RssFeedSource {
    async fn fetch(&self, ctx: &SourceContext, keyword: &Keyword) -> Result<TermSet, SourceError> {
        let opts: RssOptions = parse_options(keyword, self.label())?;
        let url = validate_http_url(&opts.url, "RSS feed")?;

        let body = ctx.fetch_bytes(url.as_str()).await?;
        let feed = parse_feed(&body)?;
        tracing::debug!(keyword = %keyword.keyword, items = feed.items.len(), "parsed feed");

        let data = feed
            .items
            .iter()
            .map(|item| {
                let fields: Vec<String> = item.fields().iter().map(|f| strip_breaks(f)).collect();
                encode_row(&fields, DELIMITER)
            })
            .collect::<Vec<_>>()
            .join("\n");

        Ok(TermSet {
            delimiter: DELIMITER.to_string(),
            columns: FEED_COLUMNS.join(","),
            data,
        })
    }
}

#[async_trait]
impl KeywordSource for RssFeedSource {
    fn kind(&self) -> SourceKind {
        SourceKind::RssFeed
    }

    fn label(&self) -> &str {
        "RSS Feed"
    }

    async fn register(&self, _ctx: &SourceContext, mut sources: Vec<SourceDescriptor>) -> Vec<SourceDescriptor> {
        sources.push(SourceDescriptor {
            name: self.name().to_string(),
            label: self.label().to_string(),
            options: vec![OptionDescriptor::new(
                "url",
                OptionKind::Url,
                "Feed URL",
                &format!(
                    "RSS or Atom feed. Each item becomes a term with the columns: {}.",
                    FEED_COLUMNS.join(", ")
                ),
            )],
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
