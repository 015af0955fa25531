use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Mutex,
};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::domain::{CompanyId, UserId};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use tracing::{debug, warn};

pub const CURRENT_COMPANY_ID_KEY: &str = "currentCompanyId";

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    pub value: String,
    pub owner_user_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // Every connection to `sqlite::memory:` opens its own database, so the
        // in-memory store is pinned to a single connection that never expires.
        let pool_options = if is_memory_url(database_url) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool_options.connect_with(connect_options).await?;

        let storage = Self { pool };
        storage.ensure_kv_table().await?;
        Ok(storage)
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    async fn ensure_kv_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_entries (
                key           TEXT PRIMARY KEY,
                value         TEXT NOT NULL,
                owner_user_id TEXT,
                updated_at    TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to create kv_entries table")?;
        Ok(())
    }

    pub async fn put_entry(&self, key: &str, value: &str, owner_user_id: Option<&str>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO kv_entries (key, value, owner_user_id, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                owner_user_id = excluded.owner_user_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(owner_user_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_entry(&self, key: &str) -> Result<Option<StoredEntry>> {
        let row = sqlx::query(
            "SELECT value, owner_user_id, updated_at FROM kv_entries WHERE key = ?1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| StoredEntry {
            value: row.get::<String, _>("value"),
            owner_user_id: row.get::<Option<String>, _>("owner_user_id"),
            updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
        }))
    }

    pub async fn delete_entry(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM kv_entries WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Entries are scoped to the user that wrote them: loading on behalf of a
/// different user yields `None` and drops the foreign entry.
#[async_trait]
pub trait CompanyIdCache: Send + Sync {
    async fn load(&self, user_id: &UserId) -> Result<Option<CompanyId>>;
    async fn store(&self, user_id: &UserId, company_id: CompanyId) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}

#[async_trait]
impl CompanyIdCache for Storage {
    async fn load(&self, user_id: &UserId) -> Result<Option<CompanyId>> {
        let Some(entry) = self.get_entry(CURRENT_COMPANY_ID_KEY).await? else {
            return Ok(None);
        };

        if entry.owner_user_id.as_deref() != Some(user_id.as_str()) {
            warn!(
                user_id = %user_id,
                owner = entry.owner_user_id.as_deref().unwrap_or("<none>"),
                "storage: dropping company id cached for another user"
            );
            self.delete_entry(CURRENT_COMPANY_ID_KEY).await?;
            return Ok(None);
        }

        match entry.value.trim().parse::<i64>() {
            Ok(id) => Ok(Some(CompanyId(id))),
            Err(err) => {
                warn!(value = %entry.value, %err, "storage: dropping unparseable company id");
                self.delete_entry(CURRENT_COMPANY_ID_KEY).await?;
                Ok(None)
            }
        }
    }

    async fn store(&self, user_id: &UserId, company_id: CompanyId) -> Result<()> {
        debug!(user_id = %user_id, company_id = company_id.0, "storage: caching company id");
        self.put_entry(
            CURRENT_COMPANY_ID_KEY,
            &company_id.0.to_string(),
            Some(user_id.as_str()),
        )
        .await
    }

    async fn clear(&self) -> Result<()> {
        self.delete_entry(CURRENT_COMPANY_ID_KEY).await?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryCompanyIdCache {
    slot: Mutex<Option<(UserId, CompanyId)>>,
}

impl MemoryCompanyIdCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CompanyIdCache for MemoryCompanyIdCache {
    async fn load(&self, user_id: &UserId) -> Result<Option<CompanyId>> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| anyhow!("company id cache lock poisoned"))?;
        match slot.as_ref() {
            Some((owner, company_id)) if owner == user_id => Ok(Some(*company_id)),
            Some(_) => {
                *slot = None;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn store(&self, user_id: &UserId, company_id: CompanyId) -> Result<()> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| anyhow!("company id cache lock poisoned"))?;
        *slot = Some((user_id.clone(), company_id));
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| anyhow!("company id cache lock poisoned"))?;
        *slot = None;
        Ok(())
    }
}

fn is_memory_url(database_url: &str) -> bool {
    database_url.starts_with("sqlite::memory:") || database_url.contains("mode=memory")
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if is_memory_url(database_url) || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
