//! Keyword persistence.
//!
//! One row per keyword in the `keywords` table. Source options are stored as
//! a JSON object in `options_json`. Writes are plain upserts keyed by the
//! keyword name: two concurrent saves of the same keyword race and the last
//! write wins.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::models::{Keyword, SourceKind};

/// Keyword listing entry without the (potentially large) term data.
#[derive(Debug, Clone, Serialize)]
pub struct KeywordSummary {
    pub id: i64,
    pub keyword: String,
    pub source: String,
    pub columns: String,
    pub term_count: i64,
    pub updated_at: i64,
}

/// Inserts or updates a keyword by name and returns the stored row.
pub async fn upsert_keyword(pool: &SqlitePool, keyword: &Keyword) -> Result<Keyword> {
    let now = chrono::Utc::now().timestamp();
    let options_json = serde_json::to_string(&keyword.options)?;

    sqlx::query(
        r#"
        INSERT INTO keywords (keyword, source, delimiter, columns, data, options_json, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(keyword) DO UPDATE SET
            source = excluded.source,
            delimiter = excluded.delimiter,
            columns = excluded.columns,
            data = excluded.data,
            options_json = excluded.options_json,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&keyword.keyword)
    .bind(keyword.source.as_str())
    .bind(&keyword.delimiter)
    .bind(&keyword.columns)
    .bind(&keyword.data)
    .bind(&options_json)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    match get_keyword(pool, &keyword.keyword).await? {
        Some(stored) => Ok(stored),
        None => bail!("keyword vanished after write: {}", keyword.keyword),
    }
}

pub async fn get_keyword(pool: &SqlitePool, name: &str) -> Result<Option<Keyword>> {
    let row = sqlx::query(
        "SELECT id, keyword, source, delimiter, columns, data, options_json FROM keywords WHERE keyword = ?",
    )
    .bind(name)
    .fetch_optional(pool)
    .await?;

    row.map(|r| row_to_keyword(&r)).transpose()
}

pub async fn list_keywords(pool: &SqlitePool) -> Result<Vec<KeywordSummary>> {
    let rows = sqlx::query(
        r#"
        SELECT id, keyword, source, columns, data, updated_at
        FROM keywords
        ORDER BY keyword ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|r| {
            let data: String = r.get("data");
            KeywordSummary {
                id: r.get("id"),
                keyword: r.get("keyword"),
                source: r.get("source"),
                columns: r.get("columns"),
                term_count: data.lines().filter(|l| !l.trim().is_empty()).count() as i64,
                updated_at: r.get("updated_at"),
            }
        })
        .collect())
}

/// Deletes a keyword. Returns `false` if it did not exist.
pub async fn delete_keyword(pool: &SqlitePool, name: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM keywords WHERE keyword = ?")
        .bind(name)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

fn row_to_keyword(row: &SqliteRow) -> Result<Keyword> {
    let source: String = row.get("source");
    let options_json: String = row.get("options_json");
    let options: Map<String, Value> = serde_json::from_str(&options_json)
        .with_context(|| format!("Corrupt options_json for keyword {}", row.get::<String, _>("keyword")))?;

    Ok(Keyword {
        id: Some(row.get("id")),
        keyword: row.get("keyword"),
        source: source.parse::<SourceKind>()?,
        options,
        delimiter: row.get("delimiter"),
        columns: row.get("columns"),
        data: row.get("data"),
    })
}
