use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Every bookmark, keyed by manga id.
pub type Bookmarks = BTreeMap<String, Bookmark>;

/// Last-read position within one manga.
///
/// The manga id is the key of the stored collection and is not written
/// inside the record itself; it is filled in whenever the collection is read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    #[serde(skip)]
    pub manga_id: String,
    pub chapter_id: String,
    #[serde(default)]
    pub chapter_number: Option<String>,
    /// Zero-based page index.
    pub page: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub date_added: DateTime<Utc>,
    #[serde(default)]
    pub notes: String,
}
