/// Line-protocol parsing for recognizers that report results as marked stdout lines.
pub mod markers;

/// Recognizer backed by an external process.
pub mod process;

pub use process::ProcessRecognizer;
