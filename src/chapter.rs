//! Chapter documents and the ordered paragraph list they own.
//!
//! A chapter always ends with exactly one [`Paragraph::End`]. Operations that insert or
//! reorder keep that sentinel in place; [`Chapter::ensure_end_paragraph`] repairs any document
//! that arrives without it (or with more than one).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Result;
use crate::assets::AudioAssets;
use crate::error::Error;
use crate::paragraph::{EndParagraph, Paragraph, RegularParagraph};

/// Which neighbor a paragraph is swapped with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    fn neighbor(self, index: usize) -> Option<usize> {
        match self {
            Direction::Up => index.checked_sub(1),
            Direction::Down => index.checked_add(1),
        }
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" | "-1" => Ok(Direction::Up),
            "down" | "1" | "+1" => Ok(Direction::Down),
            other => Err(Error::invalid(format!(
                "unknown direction '{other}' (expected 'up' or 'down')"
            ))),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Up => "up",
            Direction::Down => "down",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    paragraphs: Vec<Paragraph>,
}

impl Chapter {
    /// A chapter holding only its sentinel.
    pub fn new(id: Uuid, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            paragraphs: vec![Paragraph::End(EndParagraph::new())],
        }
    }

    pub fn paragraphs(&self) -> &[Paragraph] {
        &self.paragraphs
    }

    pub fn regular_paragraphs(&self) -> impl Iterator<Item = &RegularParagraph> {
        self.paragraphs.iter().filter_map(Paragraph::as_regular)
    }

    pub fn paragraph(&self, id: Uuid) -> Option<&RegularParagraph> {
        self.regular_paragraphs().find(|p| p.id == id)
    }

    fn paragraph_mut(&mut self, id: Uuid) -> Option<&mut RegularParagraph> {
        self.paragraphs
            .iter_mut()
            .filter_map(Paragraph::as_regular_mut)
            .find(|p| p.id == id)
    }

    fn position(&self, id: Uuid) -> Option<usize> {
        self.paragraphs
            .iter()
            .position(|p| p.regular_id() == Some(id))
    }

    /// Index a trailing append lands on: just before the sentinel when it is in place.
    fn append_index(&self) -> usize {
        match self.paragraphs.last() {
            Some(last) if last.is_end() => self.paragraphs.len() - 1,
            _ => self.paragraphs.len(),
        }
    }

    /// Rebuild the list as every regular paragraph, in order, followed by one fresh sentinel.
    pub fn ensure_end_paragraph(&mut self) {
        self.paragraphs.retain(|p| !p.is_end());
        self.paragraphs.push(Paragraph::End(EndParagraph::new()));
    }

    /// Insert a new paragraph after `after`, or at the end when `after` is absent or unknown.
    pub fn add_paragraph(
        &mut self,
        text: impl Into<String>,
        after: Option<Uuid>,
    ) -> RegularParagraph {
        let paragraph = RegularParagraph::new(text);
        let index = after
            .and_then(|id| self.position(id))
            .map(|i| i + 1)
            .unwrap_or_else(|| self.append_index());

        self.paragraphs
            .insert(index, Paragraph::Regular(paragraph.clone()));
        paragraph
    }

    pub fn update_paragraph(&mut self, id: Uuid, text: impl Into<String>) -> Option<&RegularParagraph> {
        let p = self.paragraph_mut(id)?;
        p.text = text.into();
        Some(&*p)
    }

    /// Remove a paragraph together with its recording and derived files.
    ///
    /// Returns `false` when no paragraph has `id`.
    pub fn delete_paragraph(&mut self, id: Uuid, assets: &AudioAssets) -> Result<bool> {
        let Some(index) = self.position(id) else {
            return Ok(false);
        };

        if let Some(audio) = self.paragraphs[index]
            .as_regular()
            .and_then(|p| p.audio.as_deref())
        {
            assets.delete_artifacts(audio)?;
        }

        self.paragraphs.remove(index);
        Ok(true)
    }

    /// Swap a paragraph with its neighbor.
    ///
    /// Fails when the paragraph is unknown, the neighbor does not exist, or the neighbor is
    /// the sentinel.
    pub fn move_paragraph(&mut self, id: Uuid, direction: Direction) -> bool {
        let Some(index) = self.position(id) else {
            return false;
        };
        let Some(target) = direction.neighbor(index) else {
            return false;
        };
        match self.paragraphs.get(target) {
            Some(neighbor) if !neighbor.is_end() => {
                self.paragraphs.swap(index, target);
                true
            }
            _ => false,
        }
    }

    /// Attach a recording, discarding the previous one and everything derived from it.
    pub fn add_audio(
        &mut self,
        id: Uuid,
        filename: impl Into<String>,
        assets: &AudioAssets,
    ) -> Result<Option<&RegularParagraph>> {
        let Some(p) = self.paragraph_mut(id) else {
            return Ok(None);
        };

        if let Some(old) = p.audio.as_deref() {
            assets.delete_artifacts(old)?;
        }
        p.audio = Some(filename.into());
        Ok(Some(&*p))
    }

    /// Detach the recording and delete its artifact set.
    pub fn remove_audio(&mut self, id: Uuid, assets: &AudioAssets) -> Result<Option<&RegularParagraph>> {
        let Some(p) = self.paragraph_mut(id) else {
            return Ok(None);
        };

        if let Some(old) = p.audio.as_deref() {
            assets.delete_artifacts(old)?;
        }
        p.audio = None;
        Ok(Some(&*p))
    }

    /// Store a recognized transcript on the paragraph.
    pub fn apply_transcript(
        &mut self,
        id: Uuid,
        text: impl Into<String>,
        transcribe_delay: Option<f64>,
    ) -> Option<&RegularParagraph> {
        let p = self.paragraph_mut(id)?;
        p.text = text.into();
        if transcribe_delay.is_some() {
            p.transcribe_delay = transcribe_delay;
        }
        Some(&*p)
    }

    /// Non-blank paragraph texts joined by newlines.
    pub fn full_text(&self) -> String {
        self.regular_paragraphs()
            .map(|p| p.text.as_str())
            .filter(|text| !text.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn texts(chapter: &Chapter) -> Vec<&str> {
        chapter.paragraphs().iter().map(Paragraph::text).collect()
    }

    fn assert_sentinel_last(chapter: &Chapter) {
        let ends = chapter.paragraphs().iter().filter(|p| p.is_end()).count();
        assert_eq!(ends, 1);
        assert!(chapter.paragraphs().last().is_some_and(Paragraph::is_end));
    }

    #[test]
    fn new_chapter_holds_only_the_sentinel() {
        let chapter = Chapter::new(Uuid::new_v4(), "C1");
        assert_eq!(chapter.paragraphs().len(), 1);
        assert_sentinel_last(&chapter);
        assert_eq!(chapter.full_text(), "");
    }

    #[test]
    fn add_after_known_id_inserts_right_after_it() {
        let mut chapter = Chapter::new(Uuid::new_v4(), "C1");
        let hello = chapter.add_paragraph("Hello", None);
        chapter.add_paragraph("!", None);
        chapter.add_paragraph("World", Some(hello.id));

        assert_eq!(texts(&chapter), vec!["Hello", "World", "!", ""]);
        assert_sentinel_last(&chapter);
        assert_eq!(chapter.full_text(), "Hello\nWorld\n!");
    }

    #[test]
    fn add_after_unknown_id_appends() {
        let mut chapter = Chapter::new(Uuid::new_v4(), "C1");
        chapter.add_paragraph("one", None);
        chapter.add_paragraph("two", Some(Uuid::new_v4()));
        assert_eq!(texts(&chapter), vec!["one", "two", ""]);
        assert_sentinel_last(&chapter);
    }

    #[test]
    fn ensure_end_paragraph_collapses_stray_sentinels() {
        let mut chapter = Chapter::new(Uuid::new_v4(), "C1");
        chapter.add_paragraph("a", None);
        chapter.paragraphs.insert(0, Paragraph::End(EndParagraph::new()));
        chapter.paragraphs.push(Paragraph::End(EndParagraph::new()));

        chapter.ensure_end_paragraph();
        assert_eq!(texts(&chapter), vec!["a", ""]);
        assert_sentinel_last(&chapter);

        chapter.ensure_end_paragraph();
        assert_eq!(chapter.paragraphs().len(), 2);
    }

    #[test]
    fn update_replaces_text_in_place() {
        let mut chapter = Chapter::new(Uuid::new_v4(), "C1");
        let p = chapter.add_paragraph("draft", None);
        let updated = chapter.update_paragraph(p.id, "final").map(|p| p.text.clone());
        assert_eq!(updated.as_deref(), Some("final"));
        assert!(chapter.update_paragraph(Uuid::new_v4(), "x").is_none());
    }

    #[test]
    fn move_swaps_neighbors_but_never_the_sentinel() {
        let mut chapter = Chapter::new(Uuid::new_v4(), "C1");
        let a = chapter.add_paragraph("a", None);
        let b = chapter.add_paragraph("b", None);

        assert!(!chapter.move_paragraph(a.id, Direction::Up));
        assert!(!chapter.move_paragraph(b.id, Direction::Down));
        assert_eq!(texts(&chapter), vec!["a", "b", ""]);

        assert!(chapter.move_paragraph(a.id, Direction::Down));
        assert_eq!(texts(&chapter), vec!["b", "a", ""]);
        assert!(chapter.move_paragraph(a.id, Direction::Up));
        assert_eq!(texts(&chapter), vec!["a", "b", ""]);

        assert!(!chapter.move_paragraph(Uuid::new_v4(), Direction::Up));
        assert_sentinel_last(&chapter);
    }

    #[test]
    fn full_text_skips_blank_paragraphs() {
        let mut chapter = Chapter::new(Uuid::new_v4(), "C1");
        chapter.add_paragraph("first", None);
        chapter.add_paragraph("   ", None);
        chapter.add_paragraph("", None);
        chapter.add_paragraph("last", None);
        assert_eq!(chapter.full_text(), "first\nlast");
    }

    #[test]
    fn replacing_audio_deletes_the_old_artifact_set() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let assets = AudioAssets::new(dir.path());
        let mut chapter = Chapter::new(Uuid::new_v4(), "C1");
        let p = chapter.add_paragraph("", None);

        for name in ["a.wav", "a.txt", "a.merge.txt", "a.json"] {
            fs::write(dir.path().join(name), b"x")?;
        }
        chapter.add_audio(p.id, "a.wav", &assets)?;
        assert!(dir.path().join("a.wav").exists());

        fs::write(dir.path().join("b.wav"), b"y")?;
        let audio = chapter
            .add_audio(p.id, "b.wav", &assets)?
            .and_then(|p| p.audio.clone());
        assert_eq!(audio.as_deref(), Some("b.wav"));

        for name in ["a.wav", "a.txt", "a.merge.txt", "a.json"] {
            assert!(!dir.path().join(name).exists(), "{name} should be gone");
        }
        assert!(dir.path().join("b.wav").exists());
        Ok(())
    }

    #[test]
    fn add_audio_to_unknown_paragraph_is_not_found() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let assets = AudioAssets::new(dir.path());
        let mut chapter = Chapter::new(Uuid::new_v4(), "C1");
        assert!(chapter.add_audio(Uuid::new_v4(), "a.wav", &assets)?.is_none());
        Ok(())
    }

    #[test]
    fn delete_removes_paragraph_and_its_artifacts() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let assets = AudioAssets::new(dir.path());
        let mut chapter = Chapter::new(Uuid::new_v4(), "C1");
        let p = chapter.add_paragraph("bye", None);
        fs::write(dir.path().join("p.wav"), b"x")?;
        fs::write(dir.path().join("p.srt"), b"x")?;
        chapter.add_audio(p.id, "p.wav", &assets)?;

        assert!(chapter.delete_paragraph(p.id, &assets)?);
        assert!(!dir.path().join("p.wav").exists());
        assert!(!dir.path().join("p.srt").exists());
        assert_eq!(chapter.paragraphs().len(), 1);
        assert!(!chapter.delete_paragraph(p.id, &assets)?);
        Ok(())
    }

    #[test]
    fn remove_audio_clears_the_attachment() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let assets = AudioAssets::new(dir.path());
        let mut chapter = Chapter::new(Uuid::new_v4(), "C1");
        let p = chapter.add_paragraph("x", None);
        fs::write(dir.path().join("r.wav"), b"x")?;
        chapter.add_audio(p.id, "r.wav", &assets)?;

        let audio = chapter
            .remove_audio(p.id, &assets)?
            .map(|p| p.audio.clone());
        assert_eq!(audio, Some(None));
        assert!(!dir.path().join("r.wav").exists());
        Ok(())
    }

    #[test]
    fn transcript_keeps_previous_delay_when_none_given() {
        let mut chapter = Chapter::new(Uuid::new_v4(), "C1");
        let p = chapter.add_paragraph("", None);
        chapter.apply_transcript(p.id, "first", Some(0.5));
        let updated = chapter.apply_transcript(p.id, "second", None).cloned();
        let updated = updated.expect("paragraph exists");
        assert_eq!(updated.text, "second");
        assert_eq!(updated.transcribe_delay, Some(0.5));
    }

    #[test]
    fn direction_parses_route_values() -> anyhow::Result<()> {
        assert_eq!("down".parse::<Direction>()?, Direction::Down);
        assert_eq!(" UP ".parse::<Direction>()?, Direction::Up);
        assert!("sideways".parse::<Direction>().is_err());
        Ok(())
    }
}
