//! Keyword operations shared by the CLI and the HTTP server.
//!
//! ```text
//! save_keyword ──▶ validate name ──▶ source.save() ──▶ shape check ──▶ upsert
//! refresh_keyword ──▶ load ──▶ source.refresh_terms(stored) ──▶ [persist]
//! resolve_terms ──▶ refresh_keyword, with a policy for failures
//! ```
//!
//! Source failures are returned as [`SourceError`] wrapped in
//! `anyhow::Error`; callers downcast to recover the kind and code.

use anyhow::Result;

use crate::error::SourceError;
use crate::keywords;
use crate::models::{Keyword, SourceKind, TermSet};
use crate::traits::{SourceContext, SourceRegistry};

/// What to do when a refresh fails while resolving terms for generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TermPolicy {
    /// Propagate the error and stop.
    #[default]
    Halt,
    /// Log a warning and continue with the terms stored at save time.
    UseStored,
}

fn unknown_keyword(name: &str) -> anyhow::Error {
    SourceError::not_found("not_found", format!("Keyword '{}' does not exist.", name)).into()
}

/// Runs a draft keyword through its source and stores the result.
///
/// Nothing is written when the source rejects the keyword.
pub async fn save_keyword(ctx: &SourceContext, registry: &SourceRegistry, draft: Keyword) -> Result<Keyword> {
    Keyword::validate_name(&draft.keyword)?;
    let source = registry.require(draft.source)?;

    let saved = source.save(ctx, draft).await?;
    if saved.source != SourceKind::Local {
        check_shape(&saved.keyword, &saved.terms());
    }

    let stored = keywords::upsert_keyword(&ctx.pool, &saved).await?;
    tracing::debug!(keyword = %stored.keyword, source = %stored.source, terms = stored.terms().len(), "saved keyword");
    Ok(stored)
}

/// Re-fetches a stored keyword's terms, optionally writing them back.
pub async fn refresh_keyword(
    ctx: &SourceContext,
    registry: &SourceRegistry,
    name: &str,
    persist: bool,
) -> Result<TermSet> {
    let keyword = keywords::get_keyword(&ctx.pool, name)
        .await?
        .ok_or_else(|| unknown_keyword(name))?;
    let source = registry.require(keyword.source)?;

    let refreshed = source.refresh_terms(ctx, keyword.terms(), &keyword).await?;
    if keyword.source != SourceKind::Local {
        check_shape(&keyword.keyword, &refreshed);
    }

    if persist && refreshed != keyword.terms() {
        keywords::upsert_keyword(&ctx.pool, &keyword.with_terms(refreshed.clone())).await?;
    }
    Ok(refreshed)
}

/// Terms to use for generation right now.
pub async fn resolve_terms(
    ctx: &SourceContext,
    registry: &SourceRegistry,
    name: &str,
    policy: TermPolicy,
) -> Result<TermSet> {
    let err = match refresh_keyword(ctx, registry, name, false).await {
        Ok(terms) => return Ok(terms),
        Err(e) => e,
    };

    // Only source failures can fall back; storage errors and unknown
    // keywords always propagate.
    let recoverable = err
        .downcast_ref::<SourceError>()
        .is_some_and(|s| s.code != "not_found");
    if policy == TermPolicy::Halt || !recoverable {
        return Err(err);
    }

    tracing::warn!(keyword = name, error = %err, "refresh failed, using stored terms");
    let keyword = keywords::get_keyword(&ctx.pool, name)
        .await?
        .ok_or_else(|| unknown_keyword(name))?;
    Ok(keyword.terms())
}

fn check_shape(keyword: &str, terms: &TermSet) {
    if let Err((line, fields)) = terms.validate_shape() {
        tracing::warn!(
            keyword,
            line,
            fields,
            columns = terms.column_names().len(),
            "term does not match the keyword's columns"
        );
    }
}
