use std::{collections::BTreeMap, sync::Arc};

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::{
    domain::{
        entities::bookmark::{Bookmark, Bookmarks},
        repositories::key_value::{KeyValueRepository, KeyValueRepositoryError},
    },
    utils::{Clock, SystemClock},
};

/// Storage key holding the whole serialized collection.
pub const BOOKMARKS_KEY: &str = "@bookmarks";

#[derive(Debug, Error)]
pub enum BookmarkError {
    #[error("failed to read bookmarks: {0}")]
    StorageRead(#[source] KeyValueRepositoryError),
    #[error("failed to write bookmarks: {0}")]
    StorageWrite(#[source] KeyValueRepositoryError),
    #[error("failed to encode bookmarks: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("no bookmark for manga {0}")]
    NotFound(String),
}

/// Bookmarks of every manga, stored as one JSON object under
/// [`BOOKMARKS_KEY`].
///
/// Mutations hold `write_lock` across their whole read-modify-write cycle.
pub struct BookmarkService<R>
where
    R: KeyValueRepository,
{
    repo: R,
    write_lock: Mutex<()>,
    clock: Arc<dyn Clock>,
    preserve_notes: bool,
}

impl<R> BookmarkService<R>
where
    R: KeyValueRepository,
{
    pub fn new(repo: R) -> Self {
        Self {
            repo,
            write_lock: Mutex::new(()),
            clock: Arc::new(SystemClock),
            preserve_notes: false,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Keep the notes of an existing bookmark when it is saved again.
    pub fn preserve_notes_on_save(mut self, preserve: bool) -> Self {
        self.preserve_notes = preserve;
        self
    }

    /// An absent or undecodable collection reads as empty. Single records
    /// that do not decode are left out.
    pub async fn get_all(&self) -> Result<Bookmarks, BookmarkError> {
        self.read()
            .await
            .inspect_err(|e| error!("error loading bookmarks: {e}"))
    }

    pub async fn get(&self, manga_id: &str) -> Result<Option<Bookmark>, BookmarkError> {
        Ok(self.get_all().await?.remove(manga_id))
    }

    /// Most recently added first.
    pub async fn list(&self) -> Result<Vec<Bookmark>, BookmarkError> {
        let mut bookmarks: Vec<Bookmark> = self.get_all().await?.into_values().collect();
        bookmarks.sort_by(|a, b| {
            b.date_added
                .cmp(&a.date_added)
                .then_with(|| a.manga_id.cmp(&b.manga_id))
        });

        Ok(bookmarks)
    }

    /// Creates or fully replaces the bookmark of `manga_id`.
    pub async fn save(
        &self,
        manga_id: &str,
        chapter_id: &str,
        chapter_number: Option<&str>,
        page: u32,
        cover_url: Option<&str>,
        title: Option<&str>,
    ) -> Result<Bookmark, BookmarkError> {
        let _guard = self.write_lock.lock().await;

        self.upsert(manga_id, chapter_id, chapter_number, page, cover_url, title)
            .await
            .inspect_err(|e| error!("error saving bookmark for {manga_id}: {e}"))
    }

    /// Removes the bookmark of `manga_id`. Unknown ids are not an error.
    pub async fn delete(&self, manga_id: &str) -> Result<(), BookmarkError> {
        let _guard = self.write_lock.lock().await;

        self.remove(manga_id)
            .await
            .inspect_err(|e| error!("error deleting bookmark for {manga_id}: {e}"))
    }

    pub async fn update_notes(&self, manga_id: &str, notes: &str) -> Result<Bookmark, BookmarkError> {
        let _guard = self.write_lock.lock().await;

        self.set_notes(manga_id, notes)
            .await
            .inspect_err(|e| error!("error updating notes for {manga_id}: {e}"))
    }

    async fn upsert(
        &self,
        manga_id: &str,
        chapter_id: &str,
        chapter_number: Option<&str>,
        page: u32,
        cover_url: Option<&str>,
        title: Option<&str>,
    ) -> Result<Bookmark, BookmarkError> {
        let mut stored = self.read_stored().await?;

        let notes = match stored.get(manga_id).and_then(|v| decode_entry(manga_id, v)) {
            Some(existing) if self.preserve_notes => existing.notes,
            _ => String::new(),
        };

        let bookmark = Bookmark {
            manga_id: manga_id.to_string(),
            chapter_id: chapter_id.to_string(),
            chapter_number: chapter_number.map(str::to_string),
            page,
            cover_url: cover_url.map(str::to_string),
            title: title.map(str::to_string),
            date_added: self.clock.now(),
            notes,
        };
        stored.insert(manga_id.to_string(), serde_json::to_value(&bookmark)?);

        self.write(&stored).await?;
        Ok(bookmark)
    }

    async fn remove(&self, manga_id: &str) -> Result<(), BookmarkError> {
        let mut stored = self.read_stored().await?;
        if stored.remove(manga_id).is_none() {
            debug!("no bookmark for {manga_id} to delete");
        }

        self.write(&stored).await
    }

    async fn set_notes(&self, manga_id: &str, notes: &str) -> Result<Bookmark, BookmarkError> {
        let mut stored = self.read_stored().await?;
        let mut bookmark = stored
            .get(manga_id)
            .and_then(|v| decode_entry(manga_id, v))
            .ok_or_else(|| BookmarkError::NotFound(manga_id.to_string()))?;
        bookmark.notes = notes.to_string();
        stored.insert(manga_id.to_string(), serde_json::to_value(&bookmark)?);

        self.write(&stored).await?;
        Ok(bookmark)
    }

    async fn read(&self) -> Result<Bookmarks, BookmarkError> {
        let stored = self.read_stored().await?;

        Ok(stored
            .iter()
            .filter_map(|(manga_id, value)| {
                decode_entry(manga_id, value).map(|bookmark| (manga_id.clone(), bookmark))
            })
            .collect())
    }

    /// The collection as stored, one undecoded record per manga. Mutations go
    /// through this so records of an unexpected shape are written back as is.
    async fn read_stored(&self) -> Result<StoredBookmarks, BookmarkError> {
        let Some(raw) = self
            .repo
            .get_item(BOOKMARKS_KEY)
            .await
            .map_err(BookmarkError::StorageRead)?
        else {
            return Ok(StoredBookmarks::new());
        };

        match serde_json::from_str(&raw) {
            Ok(stored) => Ok(stored),
            Err(e) => {
                warn!("stored bookmarks are not readable, starting empty: {e}");
                Ok(StoredBookmarks::new())
            }
        }
    }

    async fn write(&self, stored: &StoredBookmarks) -> Result<(), BookmarkError> {
        let raw = serde_json::to_string(stored)?;
        self.repo
            .set_item(BOOKMARKS_KEY, &raw)
            .await
            .map_err(BookmarkError::StorageWrite)
    }
}

type StoredBookmarks = BTreeMap<String, Value>;

fn decode_entry(manga_id: &str, value: &Value) -> Option<Bookmark> {
    match Bookmark::deserialize(value) {
        Ok(mut bookmark) => {
            bookmark.manga_id = manga_id.to_string();
            Some(bookmark)
        }
        Err(e) => {
            warn!("skipping unreadable bookmark for {manga_id}: {e}");
            None
        }
    }
}
