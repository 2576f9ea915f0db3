//! Media library: uploaded files referenced by attachment id.
//!
//! CSV-file and spreadsheet keywords store an attachment id rather than a
//! path. The id is resolved against the `attachments` table and the media
//! root on every call, so a file deleted after the keyword was saved is
//! reported instead of silently reusing stale data.
//!
//! Files are copied into `[media].root` as `<id>-<original name>`.

use anyhow::{bail, Context, Result};
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};

use crate::error::{ErrorKind, SourceError};
use crate::models::{Attachment, Keyword};
use crate::traits::SourceContext;

/// Copies `source_path` into the media root and records it.
pub async fn add_attachment(pool: &SqlitePool, media_root: &Path, source_path: &Path) -> Result<Attachment> {
    if !source_path.is_file() {
        bail!("File not found: {}", source_path.display());
    }
    let original = source_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| anyhow::anyhow!("Path has no file name: {}", source_path.display()))?;

    std::fs::create_dir_all(media_root)
        .with_context(|| format!("Failed to create media root: {}", media_root.display()))?;

    let now = chrono::Utc::now().timestamp();
    let mime_type = detect_mime_type(&original);

    let id: i64 = sqlx::query_scalar(
        "INSERT INTO attachments (file_name, mime_type, created_at) VALUES ('', ?, ?) RETURNING id",
    )
    .bind(&mime_type)
    .bind(now)
    .fetch_one(pool)
    .await?;

    let file_name = format!("{}-{}", id, original);
    if let Err(e) = std::fs::copy(source_path, media_root.join(&file_name)) {
        sqlx::query("DELETE FROM attachments WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        bail!("Failed to copy {} into media library: {}", source_path.display(), e);
    }

    sqlx::query("UPDATE attachments SET file_name = ? WHERE id = ?")
        .bind(&file_name)
        .bind(id)
        .execute(pool)
        .await?;

    Ok(Attachment {
        id,
        file_name,
        mime_type,
        created_at: now,
    })
}

pub async fn get_attachment(pool: &SqlitePool, id: i64) -> Result<Option<Attachment>> {
    let row = sqlx::query("SELECT id, file_name, mime_type, created_at FROM attachments WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| Attachment {
        id: r.get("id"),
        file_name: r.get("file_name"),
        mime_type: r.get("mime_type"),
        created_at: r.get("created_at"),
    }))
}

pub async fn list_attachments(pool: &SqlitePool) -> Result<Vec<Attachment>> {
    let rows = sqlx::query("SELECT id, file_name, mime_type, created_at FROM attachments ORDER BY id ASC")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|r| Attachment {
            id: r.get("id"),
            file_name: r.get("file_name"),
            mime_type: r.get("mime_type"),
            created_at: r.get("created_at"),
        })
        .collect())
}

/// Removes the attachment row and its file. Returns `false` if unknown.
pub async fn delete_attachment(pool: &SqlitePool, media_root: &Path, id: i64) -> Result<bool> {
    let Some(attachment) = get_attachment(pool, id).await? else {
        return Ok(false);
    };

    let path = media_root.join(&attachment.file_name);
    if path.exists() {
        std::fs::remove_file(&path)
            .with_context(|| format!("Failed to remove {}", path.display()))?;
    }

    sqlx::query("DELETE FROM attachments WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(true)
}

/// Resolves an attachment id to an existing file path.
pub async fn resolve_attachment_path(
    pool: &SqlitePool,
    media_root: &Path,
    id: i64,
) -> Result<PathBuf, SourceError> {
    let attachment = get_attachment(pool, id)
        .await
        .map_err(SourceError::from_db)?
        .ok_or_else(|| {
            SourceError::not_found(
                "attachment_missing",
                format!("Attachment #{} does not exist in the media library.", id),
            )
        })?;

    let path = media_root.join(&attachment.file_name);
    if !path.is_file() {
        return Err(SourceError::not_found(
            "file_missing",
            format!(
                "Attachment #{} ({}) no longer exists on disk.",
                id, attachment.file_name
            ),
        ));
    }
    Ok(path)
}

/// Resolves the attachment behind a keyword, with a message that names the
/// keyword and how to repair it.
pub async fn resolve_for_keyword(
    ctx: &SourceContext,
    keyword: &Keyword,
    id: i64,
    file_kind: &str,
) -> Result<PathBuf, SourceError> {
    tracing::debug!(keyword = %keyword.keyword, attachment = id, "resolving attachment");
    resolve_attachment_path(&ctx.pool, &ctx.config.media.root, id)
        .await
        .map_err(|e| {
            if e.kind != ErrorKind::NotFound {
                return e;
            }
            SourceError::not_found(
                "file_missing",
                format!(
                    "Keyword '{kw}': the {file_kind} file (attachment #{id}) no longer exists in the media library. \
                     Upload it again with `kw media add <file>`, then update the keyword with \
                     `kw keyword save {kw} --source {source} --option attachment_id=<new id>`.",
                    kw = keyword.keyword,
                    file_kind = file_kind,
                    id = id,
                    source = keyword.source,
                ),
            )
        })
}

fn detect_mime_type(file_name: &str) -> String {
    let ext = file_name.rsplit('.').next().unwrap_or("").to_lowercase();
    match ext.as_str() {
        "csv" => "text/csv",
        "txt" => "text/plain",
        "tsv" => "text/tab-separated-values",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        _ => "application/octet-stream",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_mime_type() {
        assert_eq!(detect_mime_type("towns.CSV"), "text/csv");
        assert_eq!(
            detect_mime_type("towns.xlsx"),
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        );
        assert_eq!(detect_mime_type("README"), "application/octet-stream");
    }
}
