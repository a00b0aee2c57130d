use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyValueRepositoryError {
    #[error("database return error: {0}")]
    DbError(#[from] sqlx::Error),
    #[error("other error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Durable string store addressed by key. Each `set_item` replaces the whole
/// value atomically.
#[async_trait]
pub trait KeyValueRepository: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<String>, KeyValueRepositoryError>;

    async fn set_item(&self, key: &str, value: &str) -> Result<(), KeyValueRepositoryError>;
}
