//! Filling paragraph text from recordings.
//!
//! A [`Transcriber`] runs a [`Recognizer`] over a paragraph's recording and stores the
//! transcript on the paragraph, together with how long the transcript took to arrive after the
//! narrator stopped speaking.

use std::path::Path;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::Result;
use crate::error::{Entity, Error};
use crate::library::{AudioLocation, Library};
use crate::recognizer::Recognizer;
use crate::wav;

/// Result of one transcription run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transcription {
    pub text: String,
    pub audio_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcribe_delay: Option<f64>,
    /// `false` when the paragraph (or its chapter) was gone by the time the transcript arrived.
    pub paragraph_updated: bool,
}

/// Seconds between the end of the recording and `finished_at_ms`, rounded to hundredths and
/// never negative.
///
/// `started_at_ms` is when recording began (milliseconds since the Unix epoch), so the
/// recording's own length is subtracted from the elapsed time.
pub fn transcribe_delay(started_at_ms: f64, finished_at_ms: f64, audio_seconds: f64) -> f64 {
    let elapsed = (finished_at_ms - started_at_ms) / 1000.0;
    let delay = ((elapsed - audio_seconds) * 100.0).round() / 100.0;
    delay.max(0.0)
}

pub struct Transcriber<'a, R: Recognizer + ?Sized> {
    library: &'a Library,
    recognizer: &'a R,
}

impl<'a, R: Recognizer + ?Sized> Transcriber<'a, R> {
    pub fn new(library: &'a Library, recognizer: &'a R) -> Self {
        Self {
            library,
            recognizer,
        }
    }

    /// Transcribe the recording at `audio_path`, which must follow the library layout.
    pub fn transcribe_path(
        &self,
        audio_path: &Path,
        started_at_ms: Option<f64>,
    ) -> Result<Transcription> {
        let location = AudioLocation::from_path(audio_path).ok_or_else(|| {
            Error::invalid(format!(
                "'{}' is not a recording inside the library",
                audio_path.display()
            ))
        })?;
        self.transcribe(&location, started_at_ms)
    }

    pub fn transcribe(
        &self,
        location: &AudioLocation,
        started_at_ms: Option<f64>,
    ) -> Result<Transcription> {
        let path = self.library.audio_path(location)?;
        if !path.is_file() {
            return Err(Error::NotFound(Entity::Audio));
        }

        let recognition = self.recognizer.recognize(&path)?;

        let audio_seconds = recognition
            .audio_seconds
            .or_else(|| wav::duration_seconds(&path).ok())
            .unwrap_or(0.0);
        let finished_at_ms = Utc::now().timestamp_millis() as f64;
        let delay = started_at_ms.map(|start| transcribe_delay(start, finished_at_ms, audio_seconds));

        let text = recognition.transcript;
        let edited = self
            .library
            .edit_chapter(location.book_id, location.chapter_id, |chapter, _| {
                Ok(chapter
                    .apply_transcript(location.paragraph_id, text.as_str(), delay)
                    .is_some())
            })?;
        let paragraph_updated = matches!(edited, Some((_, true)));

        if paragraph_updated {
            info!(
                paragraph_id = %location.paragraph_id,
                audio_seconds,
                transcribe_delay = ?delay,
                "stored transcript"
            );
        } else {
            warn!(
                book_id = %location.book_id,
                chapter_id = %location.chapter_id,
                paragraph_id = %location.paragraph_id,
                "transcript arrived for a paragraph that no longer exists"
            );
        }

        Ok(Transcription {
            text,
            audio_seconds,
            transcribe_delay: delay,
            paragraph_updated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::audio_filename;
    use crate::recognizer::Recognition;
    use crate::timestamp;
    use hound::{SampleFormat, WavSpec, WavWriter};
    use uuid::Uuid;

    struct FixedRecognizer {
        transcript: &'static str,
        audio_seconds: Option<f64>,
    }

    impl Recognizer for FixedRecognizer {
        fn recognize(&self, _audio_path: &Path) -> Result<Recognition> {
            Ok(Recognition {
                transcript: self.transcript.to_owned(),
                audio_seconds: self.audio_seconds,
            })
        }
    }

    struct FailingRecognizer;

    impl Recognizer for FailingRecognizer {
        fn recognize(&self, _audio_path: &Path) -> Result<Recognition> {
            Err(Error::Recognition("no transcript".to_owned()))
        }
    }

    fn write_wav(path: &Path, seconds: u32) -> anyhow::Result<()> {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec)?;
        for _ in 0..8_000 * seconds {
            writer.write_sample(0i16)?;
        }
        writer.finalize()?;
        Ok(())
    }

    /// A library with one chapter holding one paragraph that has a 2 s recording.
    fn fixture() -> anyhow::Result<(tempfile::TempDir, Library, AudioLocation)> {
        let dir = tempfile::tempdir()?;
        let library = Library::open(dir.path().join("books"))?;
        let mut book = library.create_book("B", "")?;
        let entry = library.add_chapter(&mut book, "C1")?;

        let (_, (paragraph_id, filename)) = library
            .edit_chapter(book.id, entry.id, |chapter, assets| {
                let p = chapter.add_paragraph("", None);
                let filename = audio_filename(p.id, timestamp::now());
                chapter.add_audio(p.id, filename.as_str(), assets)?;
                Ok((p.id, filename))
            })?
            .expect("chapter exists");

        let location = AudioLocation {
            book_id: book.id,
            chapter_id: entry.id,
            paragraph_id,
            filename,
        };
        write_wav(&library.audio_path(&location)?, 2)?;
        Ok((dir, library, location))
    }

    #[test]
    fn delay_subtracts_audio_length_and_clamps() {
        assert_eq!(transcribe_delay(1_000.0, 6_000.0, 3.0), 2.0);
        assert_eq!(transcribe_delay(0.0, 1_234.0, 0.0), 1.23);
        assert_eq!(transcribe_delay(0.0, 1_000.0, 5.0), 0.0);
    }

    #[test]
    fn stores_transcript_and_delay_on_the_paragraph() -> anyhow::Result<()> {
        let (_dir, library, location) = fixture()?;
        let recognizer = FixedRecognizer {
            transcript: "hello world",
            audio_seconds: Some(1.0),
        };

        let started = Utc::now().timestamp_millis() as f64 - 10_000.0;
        let out = Transcriber::new(&library, &recognizer).transcribe(&location, Some(started))?;
        assert_eq!(out.text, "hello world");
        assert!(out.paragraph_updated);
        let delay = out.transcribe_delay.expect("delay computed");
        assert!((8.5..=9.5).contains(&delay), "delay was {delay}");

        let chapter = library
            .load_chapter(location.book_id, location.chapter_id)?
            .expect("chapter");
        let p = chapter.paragraph(location.paragraph_id).expect("paragraph");
        assert_eq!(p.text, "hello world");
        assert_eq!(p.transcribe_delay, Some(delay));
        Ok(())
    }

    #[test]
    fn falls_back_to_wav_header_duration() -> anyhow::Result<()> {
        let (_dir, library, location) = fixture()?;
        let recognizer = FixedRecognizer {
            transcript: "x",
            audio_seconds: None,
        };
        let out = Transcriber::new(&library, &recognizer).transcribe(&location, None)?;
        assert!((out.audio_seconds - 2.0).abs() < 1e-9);
        assert_eq!(out.transcribe_delay, None);
        Ok(())
    }

    #[test]
    fn vanished_paragraph_still_returns_text() -> anyhow::Result<()> {
        let (_dir, library, location) = fixture()?;
        let other = AudioLocation {
            paragraph_id: Uuid::new_v4(),
            ..location.clone()
        };

        let recognizer = FixedRecognizer {
            transcript: "orphan",
            audio_seconds: Some(1.0),
        };
        let out = Transcriber::new(&library, &recognizer).transcribe(&other, None)?;
        assert_eq!(out.text, "orphan");
        assert!(!out.paragraph_updated);
        Ok(())
    }

    #[test]
    fn missing_recording_is_not_found() -> anyhow::Result<()> {
        let (_dir, library, location) = fixture()?;
        let missing = AudioLocation {
            filename: format!("{}_20000101_000000.wav", location.paragraph_id),
            ..location
        };
        let recognizer = FixedRecognizer {
            transcript: "x",
            audio_seconds: None,
        };
        let err = Transcriber::new(&library, &recognizer)
            .transcribe(&missing, None)
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(Entity::Audio)));
        Ok(())
    }

    #[test]
    fn recognizer_failure_leaves_paragraph_untouched() -> anyhow::Result<()> {
        let (_dir, library, location) = fixture()?;
        let path = library.audio_path(&location)?;
        let res = Transcriber::new(&library, &FailingRecognizer).transcribe_path(&path, Some(0.0));
        assert!(matches!(res, Err(Error::Recognition(_))));

        let chapter = library
            .load_chapter(location.book_id, location.chapter_id)?
            .expect("chapter");
        assert_eq!(chapter.paragraph(location.paragraph_id).map(|p| p.text.as_str()), Some(""));
        Ok(())
    }

    #[test]
    fn path_outside_library_layout_is_rejected() -> anyhow::Result<()> {
        let (_dir, library, _location) = fixture()?;
        let res = Transcriber::new(&library, &FailingRecognizer)
            .transcribe_path(Path::new("/tmp/elsewhere.wav"), None);
        assert!(matches!(res, Err(Error::Validation(_))));
        Ok(())
    }
}
