use std::collections::BTreeMap;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Relationship {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: Option<RelationshipAttributes>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RelationshipAttributes {
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MangaAttributes {
    pub title: BTreeMap<String, String>,
    pub status: Option<String>,
    pub year: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MangaData {
    pub id: String,
    #[serde(default)]
    pub attributes: MangaAttributes,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

/// Catalog title as shown in search and popular lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manga {
    pub id: String,
    pub title: String,
    pub status: Option<String>,
    pub year: Option<i64>,
    pub cover_file_name: Option<String>,
}

impl From<MangaData> for Manga {
    fn from(data: MangaData) -> Self {
        let cover_file_name = data
            .relationships
            .iter()
            .find(|rel| rel.kind == "cover_art")
            .and_then(|rel| rel.attributes.as_ref())
            .and_then(|attr| attr.file_name.clone());

        let mut titles = data.attributes.title;
        let title = titles
            .remove("en")
            .or_else(|| titles.remove("ja"))
            .or_else(|| titles.into_values().next())
            .unwrap_or_else(|| "No Title".to_string());

        Manga {
            id: data.id,
            title,
            status: data.attributes.status,
            year: data.attributes.year,
            cover_file_name,
        }
    }
}
