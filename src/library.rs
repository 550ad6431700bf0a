//! On-disk storage for books and chapters.
//!
//! Layout under the library root:
//!
//! ```text
//! <book_id>/book_info.json
//! <book_id>/chapters/<chapter_id>/content.json
//! <book_id>/chapters/<chapter_id>/audio/<paragraph_id>_<YYYYMMDD_HHMMSS>.wav (+ derived files)
//! ```
//!
//! Chapter documents are replaced atomically (temp file in the same directory, then rename).
//! Writers of the same chapter are serialized by one of a fixed set of lock stripes chosen by
//! chapter id, so [`Library::edit_chapter`] cycles never interleave within a process.

use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::Result;
use crate::assets::{AudioAssets, paragraph_id_from_filename};
use crate::book::{Book, ChapterEntry};
use crate::chapter::Chapter;
use crate::error::Error;

pub const BOOK_INFO_FILE: &str = "book_info.json";
pub const CHAPTER_CONTENT_FILE: &str = "content.json";
const CHAPTERS_DIR: &str = "chapters";
const AUDIO_DIR: &str = "audio";

const SAVE_STRIPES: usize = 16;

/// Where a recording lives, recovered from its path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioLocation {
    pub book_id: Uuid,
    pub chapter_id: Uuid,
    pub paragraph_id: Uuid,
    pub filename: String,
}

impl AudioLocation {
    /// Parse `.../<book>/chapters/<chapter>/audio/<paragraph>_<timestamp>.wav`.
    ///
    /// Only the trailing components are inspected, so the library root may be relative,
    /// absolute, or spelled differently from the one the path was produced with.
    pub fn from_path(path: &Path) -> Option<Self> {
        let parts: Vec<&str> = path
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => s.to_str(),
                _ => None,
            })
            .collect();

        let [.., book, chapters, chapter, audio, filename] = parts.as_slice() else {
            return None;
        };
        if *chapters != CHAPTERS_DIR || *audio != AUDIO_DIR {
            return None;
        }

        Some(Self {
            book_id: Uuid::parse_str(book).ok()?,
            chapter_id: Uuid::parse_str(chapter).ok()?,
            paragraph_id: paragraph_id_from_filename(filename)?,
            filename: (*filename).to_owned(),
        })
    }
}

pub struct Library {
    root: PathBuf,
    save_locks: Vec<Mutex<()>>,
}

impl Library {
    /// Open (and create if needed) a library rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            save_locks: (0..SAVE_STRIPES).map(|_| Mutex::new(())).collect(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn book_dir(&self, book_id: Uuid) -> PathBuf {
        self.root.join(book_id.to_string())
    }

    pub fn chapter_dir(&self, book_id: Uuid, chapter_id: Uuid) -> PathBuf {
        self.book_dir(book_id)
            .join(CHAPTERS_DIR)
            .join(chapter_id.to_string())
    }

    pub fn audio_assets(&self, book_id: Uuid, chapter_id: Uuid) -> AudioAssets {
        AudioAssets::new(self.chapter_dir(book_id, chapter_id).join(AUDIO_DIR))
    }

    pub fn audio_path(&self, location: &AudioLocation) -> Result<PathBuf> {
        self.audio_assets(location.book_id, location.chapter_id)
            .path(&location.filename)
    }

    // ---------------------------------------------------------------------
    // Books
    // ---------------------------------------------------------------------

    pub fn create_book(&self, title: &str, author: &str) -> Result<Book> {
        let book = Book::new(non_blank(title, "book title")?, author);
        fs::create_dir_all(self.book_dir(book.id).join(CHAPTERS_DIR))?;
        self.save_book(&book)?;
        info!(book_id = %book.id, title = %book.title, "created book");
        Ok(book)
    }

    pub fn save_book(&self, book: &Book) -> Result<()> {
        let dir = self.book_dir(book.id);
        fs::create_dir_all(&dir)?;
        fs::write(dir.join(BOOK_INFO_FILE), serde_json::to_vec_pretty(book)?)?;
        Ok(())
    }

    pub fn load_book(&self, book_id: Uuid) -> Result<Option<Book>> {
        read_json(&self.book_dir(book_id).join(BOOK_INFO_FILE))
    }

    /// Every readable book under the root, in directory enumeration order.
    pub fn list_books(&self) -> Result<Vec<Book>> {
        let mut books = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }

            let info = entry.path().join(BOOK_INFO_FILE);
            match read_json::<Book>(&info) {
                Ok(Some(book)) => books.push(book),
                Ok(None) => {}
                Err(err) => warn!(path = %info.display(), error = %err, "skipping unreadable book"),
            }
        }
        Ok(books)
    }

    /// Apply a non-blank `title` and any `author`; `None` when the book does not exist.
    pub fn update_book(
        &self,
        book_id: Uuid,
        title: Option<&str>,
        author: Option<&str>,
    ) -> Result<Option<Book>> {
        let Some(mut book) = self.load_book(book_id)? else {
            return Ok(None);
        };

        if let Some(title) = title.filter(|t| !t.trim().is_empty()) {
            book.title = title.to_owned();
        }
        if let Some(author) = author {
            book.author = author.to_owned();
        }

        self.save_book(&book)?;
        Ok(Some(book))
    }

    /// Remove a book and everything under it.
    pub fn delete_book(&self, book_id: Uuid) -> Result<bool> {
        let removed = remove_tree(&self.book_dir(book_id))?;
        if removed {
            info!(%book_id, "deleted book");
        }
        Ok(removed)
    }

    /// Append a chapter to `book`, write its empty document, then re-save the book.
    pub fn add_chapter(&self, book: &mut Book, title: &str) -> Result<ChapterEntry> {
        let entry = ChapterEntry::new(non_blank(title, "chapter title")?);

        let mut chapter = Chapter::new(entry.id, entry.title.clone());
        self.save_chapter(book.id, &mut chapter)?;

        book.chapters.push(entry.clone());
        self.save_book(book)?;

        info!(book_id = %book.id, chapter_id = %entry.id, "added chapter");
        Ok(entry)
    }

    /// Rename a chapter in the book's list; the chapter document keeps its original title.
    pub fn rename_chapter(
        &self,
        book: &mut Book,
        chapter_id: Uuid,
        title: &str,
    ) -> Result<Option<ChapterEntry>> {
        let title = non_blank(title, "chapter title")?;
        let Some(entry) = book.rename_chapter(chapter_id, title).cloned() else {
            return Ok(None);
        };
        self.save_book(book)?;
        Ok(Some(entry))
    }

    pub fn delete_chapter(&self, book: &mut Book, chapter_id: Uuid) -> Result<bool> {
        if book.chapter(chapter_id).is_none() {
            return Ok(false);
        }

        remove_tree(&self.chapter_dir(book.id, chapter_id))?;
        book.remove_chapter(chapter_id);
        self.save_book(book)?;

        info!(book_id = %book.id, %chapter_id, "deleted chapter");
        Ok(true)
    }

    // ---------------------------------------------------------------------
    // Chapters
    // ---------------------------------------------------------------------

    pub fn load_chapter(&self, book_id: Uuid, chapter_id: Uuid) -> Result<Option<Chapter>> {
        let path = self
            .chapter_dir(book_id, chapter_id)
            .join(CHAPTER_CONTENT_FILE);
        let Some(mut chapter) = read_json::<Chapter>(&path)? else {
            return Ok(None);
        };
        chapter.ensure_end_paragraph();
        Ok(Some(chapter))
    }

    pub fn save_chapter(&self, book_id: Uuid, chapter: &mut Chapter) -> Result<()> {
        let _guard = self.save_lock(chapter.id);
        self.write_chapter(book_id, chapter)
    }

    /// Load a chapter, let `f` change it, and save it, holding the chapter's lock throughout.
    ///
    /// `None` when the chapter does not exist. Nothing is written when `f` fails.
    pub fn edit_chapter<T, F>(
        &self,
        book_id: Uuid,
        chapter_id: Uuid,
        f: F,
    ) -> Result<Option<(Chapter, T)>>
    where
        F: FnOnce(&mut Chapter, &AudioAssets) -> Result<T>,
    {
        let _guard = self.save_lock(chapter_id);

        let Some(mut chapter) = self.load_chapter(book_id, chapter_id)? else {
            return Ok(None);
        };

        let assets = self.audio_assets(book_id, chapter_id);
        let out = f(&mut chapter, &assets)?;
        self.write_chapter(book_id, &mut chapter)?;
        Ok(Some((chapter, out)))
    }

    fn save_lock(&self, chapter_id: Uuid) -> MutexGuard<'_, ()> {
        let stripe = (chapter_id.as_u128() % SAVE_STRIPES as u128) as usize;
        self.save_locks[stripe]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Caller must hold the chapter's stripe.
    fn write_chapter(&self, book_id: Uuid, chapter: &mut Chapter) -> Result<()> {
        chapter.ensure_end_paragraph();

        let dir = self.chapter_dir(book_id, chapter.id);
        fs::create_dir_all(dir.join(AUDIO_DIR))?;
        write_json_atomic(&dir.join(CHAPTER_CONTENT_FILE), chapter)?;

        debug!(%book_id, chapter_id = %chapter.id, paragraphs = chapter.paragraphs().len(), "saved chapter");
        Ok(())
    }
}

fn non_blank<'a>(value: &'a str, what: &str) -> Result<&'a str> {
    if value.trim().is_empty() {
        return Err(Error::invalid(format!("{what} must not be empty")));
    }
    Ok(value)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    Ok(Some(serde_json::from_slice(&bytes)?))
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::msg(format!("no parent directory for {}", path.display())))?;

    let bytes = serde_json::to_vec_pretty(value)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(&bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    Ok(())
}

fn remove_tree(path: &Path) -> Result<bool> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.into()),
    }
}
