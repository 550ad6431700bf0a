//! `voicebook`: a workbench for narrating books paragraph by paragraph.
//!
//! This crate provides:
//! - The book → chapter → paragraph document model
//! - File-backed storage with atomic chapter saves
//! - Audio attachment bookkeeping (recordings and the files derived from them)
//! - A pluggable recognizer interface plus an external-process implementation
//! - Transcription of recordings back into paragraph text
//!
//! The HTTP server and the CLI in `src/bin` are thin layers over this library.

// Document model.
pub mod book;
pub mod chapter;
pub mod paragraph;
pub mod timestamp;

// Storage.
pub mod assets;
pub mod library;

// Recognition.
pub mod opts;
pub mod recognizer;
pub mod recognizers;
pub mod transcription;
pub mod wav;

// Shared binary helpers.
#[cfg(feature = "cli")]
pub mod cli;

// Logging configuration.
#[cfg(feature = "logging")]
pub mod logging;

mod error;

pub use book::{Book, ChapterEntry};
pub use chapter::{Chapter, Direction};
pub use error::{Entity, Error, Result};
pub use library::{AudioLocation, Library};
#[cfg(feature = "logging")]
pub use logging::init as init_logging;
pub use opts::{MarkerSet, RecognizerOpts};
pub use paragraph::{Paragraph, RegularParagraph};
pub use recognizer::{Recognition, Recognizer};
pub use recognizers::ProcessRecognizer;
pub use transcription::{Transcriber, Transcription};
