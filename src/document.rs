use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The closed set of categories an announcement can be filed under.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema,
)]
pub enum Category {
    Placements,
    Events,
    Academics,
    Exams,
    Clubs,
    Announcements,
    Other,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Placements,
        Category::Events,
        Category::Academics,
        Category::Exams,
        Category::Clubs,
        Category::Announcements,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Placements => "Placements",
            Category::Events => "Events",
            Category::Academics => "Academics",
            Category::Exams => "Exams",
            Category::Clubs => "Clubs",
            Category::Announcements => "Announcements",
            Category::Other => "Other",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::NotFound {
                kind: "category",
                name: s.to_string(),
            })
    }
}

/// Metadata stored alongside each document vector.
///
/// Serialized as JSON inside the knowledge store record. A `title` absent
/// from an older record deserializes as the empty string rather than
/// failing the whole query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMeta {
    #[serde(default)]
    pub title: String,
    pub content: String,
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    pub ingested_at: DateTime<Utc>,
}

/// A single query hit: the stored record plus its cosine similarity to the
/// query vector. Built fresh per query, never persisted.
#[derive(Debug, Clone)]
pub struct Match {
    pub id: String,
    pub score: f32,
    pub meta: DocumentMeta,
}

/// Store-level counters for the `status` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub count: usize,
    /// Embedding dimension pinned by the first upsert; None while empty.
    pub dimension: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parses_case_insensitively() {
        assert_eq!("exams".parse::<Category>().unwrap(), Category::Exams);
        assert_eq!("Exams".parse::<Category>().unwrap(), Category::Exams);
        assert_eq!(" EVENTS ".parse::<Category>().unwrap(), Category::Events);
    }

    #[test]
    fn category_rejects_unknown() {
        assert!("Sports".parse::<Category>().is_err());
        assert!("".parse::<Category>().is_err());
    }

    #[test]
    fn category_round_trips_through_display() {
        for c in Category::ALL {
            assert_eq!(c.as_str().parse::<Category>().unwrap(), c);
        }
    }

    #[test]
    fn meta_without_title_deserializes_empty() {
        let json = r#"{
            "content": "Midterms start March 3rd.",
            "category": "Exams",
            "ingested_at": "2025-03-01T10:00:00Z"
        }"#;
        let meta: DocumentMeta = serde_json::from_str(json).unwrap();
        assert_eq!(meta.title, "");
        assert_eq!(meta.category, Category::Exams);
        assert_eq!(meta.department, None);
    }

    #[test]
    fn meta_json_round_trip() {
        let meta = DocumentMeta {
            title: "Midterm Schedule".into(),
            content: "Midterms start March 3rd.".into(),
            category: Category::Exams,
            department: Some("CSE".into()),
            date: Some("2025-03-03".into()),
            ingested_at: Utc::now(),
        };
        let json = serde_json::to_string(&meta).unwrap();
        let back: DocumentMeta = serde_json::from_str(&json).unwrap();
        assert_eq!(back, meta);
    }
}
