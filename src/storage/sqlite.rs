use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::error::AppError;
use crate::storage::KeyValueStore;

/// `kv_store` table created by the bundled migrations.
pub struct SqliteKvStore {
    db: SqlitePool,
}

impl SqliteKvStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

fn unavailable(e: sqlx::Error) -> AppError {
    AppError::StorageUnavailable(e.to_string())
}

#[async_trait]
impl KeyValueStore for SqliteKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        sqlx::query_scalar::<_, String>("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.db)
            .await
            .map_err(unavailable)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(now)
        .execute(&self.db)
        .await
        .map_err(unavailable)?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(key)
            .execute(&self.db)
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}
