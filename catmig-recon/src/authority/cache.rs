//! Persisted authority payloads
//!
//! One row per identifier; writes are upserts so a refreshed lookup replaces the
//! stale payload.

use std::path::Path;

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::error::ReconResult;
use crate::identifier::Identifier;

/// Key-value store of raw authority payloads
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, identifier: &Identifier) -> ReconResult<Option<String>>;

    async fn put(
        &self,
        identifier: &Identifier,
        payload: &str,
        authority_id: Option<&str>,
        title: Option<&str>,
    ) -> ReconResult<()>;
}

/// Open (creating if needed) the cache database
pub async fn init_cache_pool(db_path: &Path) -> ReconResult<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).map_err(catmig_common::Error::from)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to cache database: {}", db_url);

    // Records are processed one at a time; a single connection is enough
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&db_url)
        .await?;

    init_tables(&pool).await?;
    Ok(pool)
}

async fn init_tables(pool: &SqlitePool) -> ReconResult<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS authority_cache (
            identifier TEXT PRIMARY KEY,
            authority_id TEXT,
            title TEXT,
            payload TEXT NOT NULL,
            cached_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Cache table initialized (authority_cache)");
    Ok(())
}

/// SQLite-backed [`CacheStore`]
#[derive(Clone)]
pub struct SqliteCache {
    pool: SqlitePool,
}

impl SqliteCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open the cache file at `db_path`
    pub async fn open(db_path: &Path) -> ReconResult<Self> {
        Ok(Self::new(init_cache_pool(db_path).await?))
    }

    /// Private in-memory cache, for tests and dry runs
    pub async fn in_memory() -> ReconResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        init_tables(&pool).await?;
        Ok(Self::new(pool))
    }

    /// Number of cached payloads
    pub async fn count(&self) -> ReconResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM authority_cache")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl CacheStore for SqliteCache {
    async fn get(&self, identifier: &Identifier) -> ReconResult<Option<String>> {
        let payload: Option<String> =
            sqlx::query_scalar("SELECT payload FROM authority_cache WHERE identifier = ?")
                .bind(identifier.as_str())
                .fetch_optional(&self.pool)
                .await?;
        Ok(payload)
    }

    async fn put(
        &self,
        identifier: &Identifier,
        payload: &str,
        authority_id: Option<&str>,
        title: Option<&str>,
    ) -> ReconResult<()> {
        sqlx::query(
            r#"
            INSERT INTO authority_cache (identifier, authority_id, title, payload)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(identifier) DO UPDATE SET
                authority_id = excluded.authority_id,
                title = excluded.title,
                payload = excluded.payload,
                cached_at = datetime('now')
            "#,
        )
        .bind(identifier.as_str())
        .bind(authority_id)
        .bind(title)
        .bind(payload)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> Identifier {
        Identifier::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let cache = SqliteCache::in_memory().await.unwrap();
        assert_eq!(cache.get(&id("1")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_put_then_get_and_upsert() {
        let cache = SqliteCache::in_memory().await.unwrap();
        cache
            .put(&id("42"), "<record>old</record>", Some("42"), Some("Old"))
            .await
            .unwrap();
        cache
            .put(&id("42"), "<record>new</record>", Some("42"), None)
            .await
            .unwrap();

        assert_eq!(
            cache.get(&id("42")).await.unwrap().as_deref(),
            Some("<record>new</record>")
        );
        assert_eq!(cache.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_file_cache_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.db");

        let cache = SqliteCache::open(&path).await.unwrap();
        cache.put(&id("7"), "<record/>", None, None).await.unwrap();
        drop(cache);

        let reopened = SqliteCache::open(&path).await.unwrap();
        assert_eq!(
            reopened.get(&id("7")).await.unwrap().as_deref(),
            Some("<record/>")
        );
    }
}
