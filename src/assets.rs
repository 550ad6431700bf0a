//! Audio recordings and the recognizer outputs stored next to them.
//!
//! A recording `<paragraph>_<YYYYMMDD_HHMMSS>.wav` shares its base name with the files the
//! recognizer derives from it. The whole set goes away together.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::Result;
use crate::error::Error;

/// Every extension an artifact set can carry, including the raw recording.
pub const ARTIFACT_EXTENSIONS: [&str; 5] = [".wav", ".merge.txt", ".txt", ".srt", ".json"];

/// Build the file name for a new recording of `paragraph_id` made at `at`.
pub fn audio_filename(paragraph_id: Uuid, at: NaiveDateTime) -> String {
    format!("{paragraph_id}_{}.wav", at.format("%Y%m%d_%H%M%S"))
}

/// The paragraph id encoded in a recording's file name, if any.
pub fn paragraph_id_from_filename(filename: &str) -> Option<Uuid> {
    let prefix = filename.split('_').next()?;
    Uuid::parse_str(prefix).ok()
}

/// `a.wav` -> `a`. Only the final extension is stripped.
pub fn base_name(filename: &str) -> &str {
    match filename.rfind('.') {
        Some(idx) if idx > 0 => &filename[..idx],
        _ => filename,
    }
}

/// A name is acceptable when it is a single, non-hidden path component.
fn is_plain_filename(filename: &str) -> bool {
    !filename.is_empty()
        && !filename.starts_with('.')
        && !filename.contains(['/', '\\'])
        && Path::new(filename).file_name().and_then(|n| n.to_str()) == Some(filename)
}

/// Audio directory of one chapter.
#[derive(Debug, Clone)]
pub struct AudioAssets {
    dir: PathBuf,
}

impl AudioAssets {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Resolve `filename` inside the audio directory.
    pub fn path(&self, filename: &str) -> Result<PathBuf> {
        if !is_plain_filename(filename) {
            return Err(Error::invalid(format!("invalid audio file name '{filename}'")));
        }
        Ok(self.dir.join(filename))
    }

    /// Store a recording, creating the audio directory when needed.
    pub fn write(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.path(filename)?;
        fs::create_dir_all(&self.dir)?;
        fs::write(&path, bytes)?;
        debug!(path = %path.display(), bytes = bytes.len(), "stored recording");
        Ok(path)
    }

    /// Delete every artifact sharing `audio_filename`'s base name.
    ///
    /// Files that were never produced are skipped. Returns how many files were removed.
    pub fn delete_artifacts(&self, audio_filename: &str) -> Result<usize> {
        if !is_plain_filename(audio_filename) {
            return Err(Error::invalid(format!(
                "invalid audio file name '{audio_filename}'"
            )));
        }

        let base = base_name(audio_filename);
        let mut removed = 0;
        for ext in ARTIFACT_EXTENSIONS {
            let path = self.dir.join(format!("{base}{ext}"));
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }

        debug!(base, removed, "deleted audio artifacts");
        Ok(removed)
    }
}
