use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::timestamp;

/// Book metadata as stored in `book_info.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub author: String,
    /// Chapters in display order.
    #[serde(default)]
    pub chapters: Vec<ChapterEntry>,
}

/// A book's reference to one of its chapters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterEntry {
    pub id: Uuid,
    pub title: String,
    #[serde(with = "timestamp", default = "timestamp::now")]
    pub created_at: NaiveDateTime,
}

impl ChapterEntry {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            created_at: timestamp::now(),
        }
    }
}

impl Book {
    pub fn new(title: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            author: author.into(),
            chapters: Vec::new(),
        }
    }

    pub fn chapter(&self, id: Uuid) -> Option<&ChapterEntry> {
        self.chapters.iter().find(|c| c.id == id)
    }

    pub fn rename_chapter(&mut self, id: Uuid, title: impl Into<String>) -> Option<&ChapterEntry> {
        let entry = self.chapters.iter_mut().find(|c| c.id == id)?;
        entry.title = title.into();
        Some(&*entry)
    }

    pub fn remove_chapter(&mut self, id: Uuid) -> Option<ChapterEntry> {
        let index = self.chapters.iter().position(|c| c.id == id)?;
        Some(self.chapters.remove(index))
    }
}
