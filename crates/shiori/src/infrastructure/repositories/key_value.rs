use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tokio::sync::RwLock;

use crate::{
    domain::repositories::key_value::{KeyValueRepository, KeyValueRepositoryError},
    infrastructure::database::Pool,
};

pub struct KeyValueRepositoryImpl {
    pool: Pool,
}

impl KeyValueRepositoryImpl {
    pub fn new<P: Into<Pool>>(pool: P) -> Self {
        Self { pool: pool.into() }
    }
}

#[async_trait]
impl KeyValueRepository for KeyValueRepositoryImpl {
    async fn get_item(&self, key: &str) -> Result<Option<String>, KeyValueRepositoryError> {
        let row = sqlx::query(r#"SELECT value FROM key_value WHERE key = ?"#)
            .bind(key)
            .fetch_optional(&self.pool as &SqlitePool)
            .await?;

        Ok(row.map(|row| row.get(0)))
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), KeyValueRepositoryError> {
        sqlx::query(
            r#"INSERT INTO key_value(key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET
            value = excluded.value,
            updated_at = CURRENT_TIMESTAMP"#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool as &SqlitePool)
        .await?;

        Ok(())
    }
}

/// Process-local store, lost on exit.
#[derive(Debug, Default)]
pub struct MemoryKeyValueRepository {
    items: RwLock<HashMap<String, String>>,
}

#[async_trait]
impl KeyValueRepository for MemoryKeyValueRepository {
    async fn get_item(&self, key: &str) -> Result<Option<String>, KeyValueRepositoryError> {
        Ok(self.items.read().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), KeyValueRepositoryError> {
        self.items
            .write()
            .await
            .insert(key.to_string(), value.to_string());

        Ok(())
    }
}
