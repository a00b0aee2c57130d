#[macro_use]
extern crate log;

pub mod mangadex;
pub use mangadex::MangaDex;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("token endpoint unreachable: {0}")]
    Network(String),
    #[error("token endpoint rejected the grant: {0}")]
    Rejected(String),
    #[error("malformed token response: {0}")]
    Decode(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Token as returned by the endpoint. `expires_in` is in seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: i64,
}

/// The network half of the OAuth2 password and refresh grants.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    async fn password_grant(&self, username: &str, password: &str) -> Result<Token, Error>;

    async fn refresh_grant(&self, refresh_token: &str) -> Result<Token, Error>;
}
