use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChapterAttributes {
    pub chapter: Option<String>,
    pub volume: Option<String>,
    pub title: Option<String>,
    pub translated_language: String,
    pub pages: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChapterData {
    pub id: String,
    #[serde(default)]
    pub attributes: ChapterAttributes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    pub id: String,
    /// Oneshots have no number.
    pub chapter_number: Option<String>,
    pub volume: Option<String>,
    pub title: Option<String>,
    pub language: String,
    pub pages: i64,
}

impl From<ChapterData> for Chapter {
    fn from(data: ChapterData) -> Self {
        Chapter {
            id: data.id,
            chapter_number: data.attributes.chapter,
            volume: data.attributes.volume,
            title: data.attributes.title,
            language: data.attributes.translated_language,
            pages: data.attributes.pages,
        }
    }
}

/// One page of a manga's chapter feed.
#[derive(Debug, Clone)]
pub struct ChapterPage {
    pub chapters: Vec<Chapter>,
    pub offset: i64,
    pub total: i64,
}

impl ChapterPage {
    pub fn has_more(&self) -> bool {
        self.offset + (self.chapters.len() as i64) < self.total
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AtHomeChapter {
    pub hash: String,
    pub data: Vec<String>,
    pub data_saver: Vec<String>,
}

/// Image node assigned to one chapter.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtHomeServer {
    pub base_url: String,
    pub chapter: AtHomeChapter,
}

impl AtHomeServer {
    pub fn page_urls(&self) -> Vec<String> {
        self.urls("data", &self.chapter.data)
    }

    pub fn data_saver_urls(&self) -> Vec<String> {
        self.urls("data-saver", &self.chapter.data_saver)
    }

    fn urls(&self, quality: &str, files: &[String]) -> Vec<String> {
        let base_url = self.base_url.trim_end_matches('/');
        files
            .iter()
            .map(|file| format!("{base_url}/{quality}/{}/{file}", self.chapter.hash))
            .collect()
    }
}
