//! `kw keyword` subcommands.
//!
//! Thin wrappers over [`service`](crate::service) and
//! [`keywords`](crate::keywords) that print results to stdout.

use anyhow::{bail, Context, Result};

use crate::config::Config;
use crate::db;
use crate::keywords;
use crate::models::{Keyword, SourceKind, TermSet};
use crate::service::{self, TermPolicy};
use crate::traits::{options_from_pairs, SourceRegistry};

pub async fn run_save(
    config: &Config,
    registry: &SourceRegistry,
    name: &str,
    source: &str,
    options: &[(String, String)],
) -> Result<()> {
    let ctx = db::open_context(config).await?;
    let source: SourceKind = source.parse()?;
    let options = upload_file_options(options)?;
    let draft = Keyword::draft(name, source, options_from_pairs(&options));

    let saved = service::save_keyword(&ctx, registry, draft).await?;

    println!("keyword save");
    println!("  keyword: {}", saved.keyword);
    if saved.source != source {
        println!("  source: {} (was {})", saved.source, source);
    } else {
        println!("  source: {}", saved.source);
    }
    if !saved.columns.is_empty() {
        println!("  columns: {}", saved.columns);
    }
    println!("  terms: {}", saved.terms().len());

    ctx.pool.close().await;
    Ok(())
}

/// Reads `file=<path>` options on the client and sends the contents as
/// `file_content`, the way a browser upload would.
fn upload_file_options(options: &[(String, String)]) -> Result<Vec<(String, String)>> {
    options
        .iter()
        .map(|(key, value)| {
            if key != "file" {
                return Ok((key.clone(), value.clone()));
            }
            let content = std::fs::read_to_string(value)
                .with_context(|| format!("Failed to read terms file: {}", value))?;
            Ok(("file_content".to_string(), content))
        })
        .collect()
}

pub async fn run_list(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let list = keywords::list_keywords(&pool).await?;

    if list.is_empty() {
        println!("No keywords.");
    } else {
        println!("{:<24} {:<16} {:>6}  COLUMNS", "KEYWORD", "SOURCE", "TERMS");
        for k in &list {
            println!("{:<24} {:<16} {:>6}  {}", k.keyword, k.source, k.term_count, k.columns);
        }
    }

    pool.close().await;
    Ok(())
}

pub async fn run_get(config: &Config, name: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let Some(keyword) = keywords::get_keyword(&pool, name).await? else {
        pool.close().await;
        bail!("Keyword '{}' does not exist.", name);
    };

    println!("--- Keyword ---");
    println!("keyword:   {}", keyword.keyword);
    println!("source:    {}", keyword.source);
    println!("delimiter: {}", keyword.delimiter);
    println!("columns:   {}", keyword.columns);
    println!("options:   {}", serde_json::Value::Object(keyword.options.clone()));
    println!();
    print_terms(&keyword.terms());

    pool.close().await;
    Ok(())
}

pub async fn run_delete(config: &Config, name: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let deleted = keywords::delete_keyword(&pool, name).await?;
    pool.close().await;

    if !deleted {
        bail!("Keyword '{}' does not exist.", name);
    }
    println!("Deleted keyword '{}'.", name);
    Ok(())
}

pub async fn run_refresh(config: &Config, registry: &SourceRegistry, name: &str, persist: bool) -> Result<()> {
    let ctx = db::open_context(config).await?;
    let terms = service::refresh_keyword(&ctx, registry, name, persist).await?;

    println!("keyword refresh");
    println!("  keyword: {}", name);
    println!("  terms: {}", terms.len());
    println!("  persisted: {}", persist);

    ctx.pool.close().await;
    Ok(())
}

/// Prints the terms generation would use right now.
pub async fn run_terms(
    config: &Config,
    registry: &SourceRegistry,
    name: &str,
    refresh: bool,
    ignore_errors: bool,
) -> Result<()> {
    let ctx = db::open_context(config).await?;

    let terms = if refresh {
        let policy = if ignore_errors {
            TermPolicy::UseStored
        } else {
            TermPolicy::Halt
        };
        service::resolve_terms(&ctx, registry, name, policy).await?
    } else {
        match keywords::get_keyword(&ctx.pool, name).await? {
            Some(k) => k.terms(),
            None => bail!("Keyword '{}' does not exist.", name),
        }
    };

    print_terms(&terms);
    ctx.pool.close().await;
    Ok(())
}

fn print_terms(terms: &TermSet) {
    let columns = terms.column_names();
    println!("--- Terms ({}) ---", terms.len());
    for (i, row) in terms.rows().iter().enumerate() {
        if columns.is_empty() {
            println!("{}", row.join(&terms.delimiter));
            continue;
        }
        println!("[{}]", i + 1);
        for (col, value) in columns.iter().zip(row) {
            println!("  {}: {}", col, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_option_is_uploaded_as_content() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("services.txt");
        std::fs::write(&path, "plumber\nroofer\n").unwrap();

        let options = upload_file_options(&[
            ("data".to_string(), "handyman".to_string()),
            ("file".to_string(), path.display().to_string()),
        ])
        .unwrap();
        assert_eq!(
            options,
            vec![
                ("data".to_string(), "handyman".to_string()),
                ("file_content".to_string(), "plumber\nroofer\n".to_string()),
            ]
        );

        let missing = tmp.path().join("nope.txt").display().to_string();
        assert!(upload_file_options(&[("file".to_string(), missing)]).is_err());
    }
}
