//! Persistent key/value cache stored in SQLite.
//!
//! Keys are the SHA-256 of the serialized lookup arguments, so any
//! `Serialize` value can address an entry. Entries carry an absolute expiry
//! and expired rows are treated as missing.

use anyhow::Result;
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;

/// Derives the cache key for a set of arguments.
pub fn cache_key<A: Serialize + ?Sized>(namespace: &str, args: &A) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    hasher.update(b":");
    hasher.update(serde_json::to_vec(args)?);
    Ok(format!("{:x}", hasher.finalize()))
}

pub async fn get<A: Serialize + ?Sized>(pool: &SqlitePool, namespace: &str, args: &A) -> Result<Option<String>> {
    let key = cache_key(namespace, args)?;
    let now = chrono::Utc::now().timestamp();
    let value: Option<String> =
        sqlx::query_scalar("SELECT value FROM cache WHERE key = ? AND expires_at > ?")
            .bind(&key)
            .bind(now)
            .fetch_optional(pool)
            .await?;
    Ok(value)
}

pub async fn set<A: Serialize + ?Sized>(
    pool: &SqlitePool,
    namespace: &str,
    args: &A,
    value: &str,
    ttl_secs: i64,
) -> Result<()> {
    let key = cache_key(namespace, args)?;
    let expires_at = chrono::Utc::now().timestamp() + ttl_secs;
    sqlx::query(
        r#"
        INSERT INTO cache (key, value, expires_at) VALUES (?, ?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at
        "#,
    )
    .bind(&key)
    .bind(value)
    .bind(expires_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Deletes expired rows. Returns the number removed.
pub async fn purge_expired(pool: &SqlitePool) -> Result<u64> {
    let now = chrono::Utc::now().timestamp();
    let result = sqlx::query("DELETE FROM cache WHERE expires_at <= ?")
        .bind(now)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
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
    async fn test_set_then_get_and_overwrite() {
        let pool = memory_pool().await;
        assert_eq!(get(&pool, "thesaurus", &("city", 50)).await.unwrap(), None);

        set(&pool, "thesaurus", &("city", 50), r#"["town"]"#, 60).await.unwrap();
        assert_eq!(
            get(&pool, "thesaurus", &("city", 50)).await.unwrap().as_deref(),
            Some(r#"["town"]"#)
        );
        assert_eq!(get(&pool, "thesaurus", &("city", 10)).await.unwrap(), None);

        set(&pool, "thesaurus", &("city", 50), r#"["borough"]"#, 60).await.unwrap();
        assert_eq!(
            get(&pool, "thesaurus", &("city", 50)).await.unwrap().as_deref(),
            Some(r#"["borough"]"#)
        );
    }

    #[tokio::test]
    async fn test_expired_entries_are_missing_and_purged() {
        let pool = memory_pool().await;
        set(&pool, "thesaurus", "stale", "old", -1).await.unwrap();
        set(&pool, "thesaurus", "fresh", "new", 60).await.unwrap();

        assert_eq!(get(&pool, "thesaurus", "stale").await.unwrap(), None);
        assert_eq!(purge_expired(&pool).await.unwrap(), 1);
        assert_eq!(purge_expired(&pool).await.unwrap(), 0);
        assert_eq!(get(&pool, "thesaurus", "fresh").await.unwrap().as_deref(), Some("new"));
    }

    #[test]
    fn test_cache_key_depends_on_namespace_and_args() {
        let a = cache_key("thesaurus", &("city", 50)).unwrap();
        let b = cache_key("thesaurus", &("city", 50)).unwrap();
        let c = cache_key("thesaurus", &("town", 50)).unwrap();
        let d = cache_key("other", &("city", 50)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_eq!(a.len(), 64);
    }
}
