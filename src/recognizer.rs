use std::path::Path;

use crate::Result;

/// What a recognizer reports for one recording.
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    pub transcript: String,

    /// Audio length as measured by the recognizer, when it reports one.
    pub audio_seconds: Option<f64>,
}

/// Pluggable speech recognizer used by [`crate::transcription::Transcriber`].
///
/// Implementations turn a recording on disk into a transcript. They are expected to block
/// until the transcript is available or their own time bound expires.
pub trait Recognizer: Send + Sync {
    fn recognize(&self, audio_path: &Path) -> Result<Recognition>;
}

impl<R: Recognizer + ?Sized> Recognizer for std::sync::Arc<R> {
    fn recognize(&self, audio_path: &Path) -> Result<Recognition> {
        (**self).recognize(audio_path)
    }
}
