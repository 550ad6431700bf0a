use std::path::PathBuf;
use std::time::Duration;

/// Marker strings the external recognizer prints on stdout.
///
/// The defaults match the recognizer client the application ships with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerSet {
    /// Precedes the audio length, e.g. `音频长度：3.12s`.
    pub duration: String,

    /// Precedes the transcript. The transcript follows on the same line or on the next
    /// non-blank line.
    pub result: String,

    /// Printed when the recognizer is done, whether or not it produced a transcript.
    pub complete: String,
}

impl Default for MarkerSet {
    fn default() -> Self {
        Self {
            duration: "音频长度：".to_owned(),
            result: "识别结果：".to_owned(),
            complete: "RECOGNITION_COMPLETE".to_owned(),
        }
    }
}

/// How the external recognizer process is launched and supervised.
///
/// This is library-level configuration; binaries map their flags onto it.
#[derive(Debug, Clone)]
pub struct RecognizerOpts {
    /// Executable to run. The audio path is appended after `args`.
    pub program: PathBuf,

    pub args: Vec<String>,

    /// Working directory for the process; inherits ours when `None`.
    pub working_dir: Option<PathBuf>,

    /// Upper bound on waiting for a transcript before the process is killed.
    pub timeout: Duration,

    /// How long a finished recognizer may take to exit on its own before it is killed.
    pub grace_period: Duration,

    pub markers: MarkerSet,
}

impl RecognizerOpts {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            timeout: Duration::from_secs(600),
            grace_period: Duration::from_secs(5),
            markers: MarkerSet::default(),
        }
    }
}
