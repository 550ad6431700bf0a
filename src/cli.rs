//! Command-line flags shared by the binaries.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use crate::opts::{MarkerSet, RecognizerOpts};

/// Flags describing the external recognizer.
#[derive(Args, Debug, Clone)]
pub struct RecognizerArgs {
    /// Recognizer client executable; the audio path is passed as its last argument.
    #[arg(
        long = "recognizer",
        env = "VOICEBOOK_RECOGNIZER",
        default_value = "CW/start_client.exe"
    )]
    pub program: PathBuf,

    /// Extra argument placed before the audio path (repeatable).
    #[arg(long = "recognizer-arg", allow_hyphen_values = true)]
    pub args: Vec<String>,

    /// Working directory for the recognizer process.
    #[arg(long = "recognizer-dir")]
    pub working_dir: Option<PathBuf>,

    /// Seconds to wait for a transcript before killing the recognizer.
    #[arg(long = "recognize-timeout-secs", default_value_t = 600)]
    pub timeout_secs: u64,

    /// Seconds a finished recognizer may take to exit before it is killed.
    #[arg(long = "grace-secs", default_value_t = 5)]
    pub grace_secs: u64,

    /// Marker preceding the audio length in recognizer output.
    #[arg(long = "duration-marker")]
    pub duration_marker: Option<String>,

    /// Marker preceding the transcript in recognizer output.
    #[arg(long = "result-marker")]
    pub result_marker: Option<String>,

    /// Marker the recognizer prints when it is done.
    #[arg(long = "complete-marker")]
    pub complete_marker: Option<String>,
}

impl RecognizerArgs {
    pub fn to_opts(&self) -> RecognizerOpts {
        let defaults = MarkerSet::default();
        RecognizerOpts {
            program: self.program.clone(),
            args: self.args.clone(),
            working_dir: self.working_dir.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            grace_period: Duration::from_secs(self.grace_secs),
            markers: MarkerSet {
                duration: self.duration_marker.clone().unwrap_or(defaults.duration),
                result: self.result_marker.clone().unwrap_or(defaults.result),
                complete: self.complete_marker.clone().unwrap_or(defaults.complete),
            },
        }
    }
}
