//! Database table keyword source.
//!
//! Every row of a user table in the application database becomes one term.
//! Columns come from `PRAGMA table_info` in declaration order; each cell is
//! read as text, so integers and reals are rendered the way SQLite prints
//! them. The keyword's own bookkeeping tables are never offered.
//!
//! The table picker is filled at registration time from a live
//! `sqlite_master` query, so tables created after startup show up on the
//! next `kw sources` call.

use async_trait::async_trait;
use serde::Deserialize;
use sqlx::{Row, SqlitePool};

use crate::error::SourceError;
use crate::migrate::INTERNAL_TABLES;
use crate::models::{Keyword, SourceKind, TermSet};
use crate::terms::{encode_row, sanitize_cell};
use crate::traits::{
    parse_options, KeywordSource, OptionDescriptor, OptionKind, SourceContext, SourceDescriptor,
};

const DELIMITER: &str = ",";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DatabaseOptions {
    table: String,
}

/// User tables, sorted by name.
pub async fn list_tables(pool: &SqlitePool) -> Result<Vec<String>, SourceError> {
    let names: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(pool)
    .await
    .map_err(SourceError::from_db)?;

    Ok(names
        .into_iter()
        .filter(|n| !INTERNAL_TABLES.contains(&n.as_str()))
        .collect())
}

/// Column names of `table` in declaration order.
pub async fn get_columns(pool: &SqlitePool, table: &str) -> Result<Vec<String>, SourceError> {
    let rows = sqlx::query(&format!("PRAGMA table_info({})", quote_ident(table)))
        .fetch_all(pool)
        .await
        .map_err(SourceError::from_db)?;

    let mut columns: Vec<(i64, String)> = rows
        .iter()
        .map(|r| (r.get::<i64, _>("cid"), r.get::<String, _>("name")))
        .collect();
    columns.sort_by_key(|(cid, _)| *cid);
    Ok(columns.into_iter().map(|(_, name)| name).collect())
}

/// Every row of `table`, each encoded as one delimited term.
pub async fn get_all_rows(
    pool: &SqlitePool,
    table: &str,
    columns: &[String],
) -> Result<Vec<String>, SourceError> {
    if columns.is_empty() {
        return Ok(Vec::new());
    }
    let select = columns
        .iter()
        .map(|c| format!("CAST({} AS TEXT)", quote_ident(c)))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!("SELECT {} FROM {}", select, quote_ident(table));

    let rows = sqlx::query(&sql)
        .fetch_all(pool)
        .await
        .map_err(SourceError::from_db)?;

    rows.iter()
        .map(|row| {
            let cells = columns
                .iter()
                .enumerate()
                .map(|(i, column)| {
                    let value: Option<String> = row.try_get(i).map_err(|e| {
                        SourceError::from_db(format!("column '{}' of table '{}': {}", column, table, e))
                    })?;
                    Ok(sanitize_cell(&value.unwrap_or_default()))
                })
                .collect::<Result<Vec<String>, SourceError>>()?;
            Ok(encode_row(&cells, DELIMITER))
        })
        .collect()
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub struct DatabaseTableSource;

impl DatabaseTableSource {
    async fn fetch(&self, ctx: &SourceContext, keyword: &Keyword) -> Result<TermSet, SourceError> {
        let opts: DatabaseOptions = parse_options(keyword, self.label())?;
        let table = opts.table.trim();
        if table.is_empty() {
            return Err(SourceError::validation(
                "table_missing",
                format!("Please choose a database table for keyword '{}'.", keyword.keyword),
            ));
        }

        let tables = list_tables(&ctx.pool).await?;
        if !tables.iter().any(|t| t == table) {
            return Err(SourceError::validation(
                "table_invalid",
                format!(
                    "The database table '{}' chosen for keyword '{}' does not exist.",
                    table, keyword.keyword
                ),
            ));
        }

        tracing::debug!(keyword = %keyword.keyword, table, "reading database table");
        let columns = get_columns(&ctx.pool, table).await?;
        let rows = get_all_rows(&ctx.pool, table, &columns).await?;

        Ok(TermSet {
            delimiter: DELIMITER.to_string(),
            columns: columns.join(","),
            data: rows.join("\n"),
        })
    }
}

#[async_trait]
impl KeywordSource for DatabaseTableSource {
    fn kind(&self) -> SourceKind {
        SourceKind::DatabaseTable
    }

    fn label(&self) -> &str {
        "Database Table"
    }

    async fn register(&self, ctx: &SourceContext, mut sources: Vec<SourceDescriptor>) -> Vec<SourceDescriptor> {
        let tables = match list_tables(&ctx.pool).await {
            Ok(tables) => tables,
            Err(e) => {
                tracing::warn!(error = %e, "could not list database tables");
                Vec::new()
            }
        };
        sources.push(SourceDescriptor {
            name: self.name().to_string(),
            label: self.label().to_string(),
            options: vec![OptionDescriptor::new(
                "table",
                OptionKind::Select,
                "Table",
                "Each row of this table becomes one term; its columns become the keyword's columns.",
            )
            .with_values(tables)],
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::migrate_pool;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        migrate_pool(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_list_tables_hides_internal_tables() {
        let pool = memory_pool().await;
        sqlx::query("CREATE TABLE towns (name TEXT)")
            .execute(&pool)
            .await
            .unwrap();
        assert_eq!(list_tables(&pool).await.unwrap(), vec!["towns".to_string()]);
    }

    #[tokio::test]
    async fn test_undecodable_cell_is_an_error() {
        let pool = memory_pool().await;
        sqlx::query("CREATE TABLE blobs (name TEXT, payload BLOB)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO blobs VALUES ('bad', X'FFFE00')")
            .execute(&pool)
            .await
            .unwrap();

        let columns = get_columns(&pool, "blobs").await.unwrap();
        let err = get_all_rows(&pool, "blobs", &columns).await.unwrap_err();
        assert_eq!(err.code, "database");
        assert!(err.message.contains("column 'payload'"));
    }

    #[tokio::test]
    async fn test_rows_follow_declared_columns() {
        let pool = memory_pool().await;
        sqlx::query("CREATE TABLE towns (name TEXT, zip INTEGER, note TEXT)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO towns VALUES ('Springfield', 11111, NULL), ('Shelby\"ville', 22222, 'a\nb')")
            .execute(&pool)
            .await
            .unwrap();

        let columns = get_columns(&pool, "towns").await.unwrap();
        assert_eq!(columns, vec!["name", "zip", "note"]);

        let rows = get_all_rows(&pool, "towns", &columns).await.unwrap();
        assert_eq!(rows[0], "\"Springfield\",\"11111\",\"\"");
        assert_eq!(rows[1], "\"Shelby\\\"ville\",\"22222\",\"a<br />b\"");
    }
}
