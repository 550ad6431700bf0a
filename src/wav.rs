use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use hound::WavReader;

use crate::Result;
use crate::error::Error;

/// Length in seconds of the WAV stream read from `reader`, taken from its header.
pub fn duration_from_reader<R: Read>(reader: R) -> Result<f64> {
    let reader = WavReader::new(reader)?;
    let spec = reader.spec();

    if spec.sample_rate == 0 {
        return Err(Error::msg("WAV header reports a zero sample rate"));
    }

    // `duration` counts frames (one sample per channel).
    Ok(f64::from(reader.duration()) / f64::from(spec.sample_rate))
}

/// Length in seconds of the WAV file at `path`.
pub fn duration_seconds(path: &Path) -> Result<f64> {
    let file = File::open(path)?;
    duration_from_reader(BufReader::new(file))
}
