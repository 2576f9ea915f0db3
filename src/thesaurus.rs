//! Synonym lookup for local keywords saved without terms.
//!
//! Providers:
//!
//! | Provider | Behaviour |
//! |----------|-----------|
//! | `disabled` | Always returns no synonyms |
//! | `datamuse` | `GET {url}?rel_syn={word}&max={max_results}`, expects `[{"word": ..}]` |
//!
//! Results are memoized in the persistent [`cache`](crate::cache).

use serde::Deserialize;

use crate::cache;
use crate::error::SourceError;
use crate::traits::SourceContext;

const CACHE_NAMESPACE: &str = "thesaurus";

#[derive(Debug, Deserialize)]
struct DatamuseWord {
    word: String,
}

/// Returns synonyms for `word`, or an empty list when the thesaurus is disabled.
pub async fn lookup_synonyms(ctx: &SourceContext, word: &str) -> Result<Vec<String>, SourceError> {
    let cfg = &ctx.config.thesaurus;
    if !cfg.is_enabled() {
        return Ok(Vec::new());
    }
    let Some(base_url) = cfg.url.as_deref() else {
        return Ok(Vec::new());
    };

    let cache_args = (cfg.provider.as_str(), base_url, word, cfg.max_results);
    match cache::get(&ctx.pool, CACHE_NAMESPACE, &cache_args).await {
        Ok(Some(hit)) => {
            if let Ok(words) = serde_json::from_str::<Vec<String>>(&hit) {
                tracing::debug!(word, count = words.len(), "thesaurus cache hit");
                return Ok(words);
            }
        }
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "thesaurus cache read failed"),
    }

    let mut url = url::Url::parse(base_url).map_err(|e| {
        SourceError::validation("thesaurus_url", format!("Invalid thesaurus URL {}: {}", base_url, e))
    })?;
    url.query_pairs_mut()
        .append_pair("rel_syn", word)
        .append_pair("max", &cfg.max_results.to_string());

    let body = ctx.fetch_bytes(url.as_str()).await?;
    let parsed: Vec<DatamuseWord> = serde_json::from_slice(&body).map_err(|e| {
        SourceError::fetch("thesaurus_response", format!("Unexpected thesaurus response: {}", e))
    })?;
    let words: Vec<String> = parsed
        .into_iter()
        .map(|w| w.word.trim().to_string())
        .filter(|w| !w.is_empty())
        .collect();

    if let Ok(serialized) = serde_json::to_string(&words) {
        if let Err(e) = cache::set(&ctx.pool, CACHE_NAMESPACE, &cache_args, &serialized, cfg.cache_ttl_secs).await {
            tracing::warn!(error = %e, "thesaurus cache write failed");
        }
    }

    Ok(words)
}
