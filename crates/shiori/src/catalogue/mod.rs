pub mod chapter;
pub use chapter::{AtHomeServer, Chapter, ChapterPage};

pub mod manga;
pub use manga::Manga;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, de::DeserializeOwned};
use shiori_auth::TokenEndpoint;
use thiserror::Error;

use crate::domain::services::token::TokenManager;
use chapter::ChapterData;
use manga::MangaData;

#[derive(Debug, Error)]
pub enum CatalogueError {
    #[error("catalog rejected the access token")]
    Unauthorized,
    #[error("catalog request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Deserialize)]
struct Collection<T> {
    data: Vec<T>,
    #[serde(default)]
    offset: i64,
    #[serde(default)]
    total: i64,
}

/// MangaDex REST client. Every request asks the token manager for a bearer
/// token first and goes out anonymously when there is none.
pub struct Catalogue<E>
where
    E: TokenEndpoint,
{
    client: reqwest::Client,
    tokens: Arc<TokenManager<E>>,
    api_url: String,
    uploads_url: String,
}

impl<E> Catalogue<E>
where
    E: TokenEndpoint,
{
    pub fn new(tokens: Arc<TokenManager<E>>, api_url: &str, uploads_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            tokens,
            api_url: api_url.trim_end_matches('/').to_string(),
            uploads_url: uploads_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn search_manga(&self, title: &str) -> Result<Vec<Manga>, CatalogueError> {
        let res: Collection<MangaData> = self
            .get(
                "/manga",
                &[
                    ("title", title.to_string()),
                    ("includes[]", "cover_art".to_string()),
                ],
            )
            .await?;

        Ok(res.data.into_iter().map(Manga::from).collect())
    }

    /// Most followed titles created within the last 30 days.
    pub async fn popular_manga(&self) -> Result<Vec<Manga>, CatalogueError> {
        let res: Collection<MangaData> = self
            .get(
                "/manga",
                &[
                    ("includes[]", "cover_art".to_string()),
                    ("order[followedCount]", "desc".to_string()),
                    ("createdAtSince", created_since(Utc::now())),
                    ("limit", "10".to_string()),
                ],
            )
            .await?;

        Ok(res.data.into_iter().map(Manga::from).collect())
    }

    /// One page of chapters in ascending chapter order.
    pub async fn manga_feed(
        &self,
        manga_id: &str,
        language: &str,
        limit: i64,
        offset: i64,
    ) -> Result<ChapterPage, CatalogueError> {
        let res: Collection<ChapterData> = self
            .get(
                &format!("/manga/{manga_id}/feed"),
                &[
                    ("limit", format!("{limit}")),
                    ("offset", format!("{offset}")),
                    ("translatedLanguage[]", language.to_string()),
                    ("order[chapter]", "asc".to_string()),
                ],
            )
            .await?;

        Ok(ChapterPage {
            chapters: res.data.into_iter().map(Chapter::from).collect(),
            offset: res.offset,
            total: res.total,
        })
    }

    pub async fn at_home_server(&self, chapter_id: &str) -> Result<AtHomeServer, CatalogueError> {
        self.get(&format!("/at-home/server/{chapter_id}"), &[]).await
    }

    pub fn cover_url(&self, manga: &Manga) -> Option<String> {
        manga
            .cover_file_name
            .as_ref()
            .map(|file| cover_url(&self.uploads_url, &manga.id, file))
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, CatalogueError> {
        let mut req = self
            .client
            .get(format!("{}{path}", self.api_url))
            .query(query);
        if let Some(token) = self.tokens.get_access_token().await {
            req = req.bearer_auth(token);
        }

        let res = req.send().await?;
        if res.status() == StatusCode::UNAUTHORIZED {
            warn!("unauthorized request to {path}");
            return Err(CatalogueError::Unauthorized);
        }

        Ok(res.error_for_status()?.json().await?)
    }
}

pub fn cover_url(uploads_url: &str, manga_id: &str, file_name: &str) -> String {
    format!(
        "{}/covers/{manga_id}/{file_name}",
        uploads_url.trim_end_matches('/')
    )
}

/// Lower bound for the popular list, second precision without offset.
fn created_since(now: DateTime<Utc>) -> String {
    (now - Duration::days(30))
        .format("%Y-%m-%dT%H:%M:%S")
        .to_string()
}
