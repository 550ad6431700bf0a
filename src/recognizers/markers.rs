use crate::opts::MarkerSet;

/// Outcome of feeding one output line to a [`MarkerParser`].
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Nothing conclusive yet; keep reading.
    Continue,

    /// The transcript was found. Reading can stop.
    Transcript(String),

    /// The recognizer announced it is done without (further) output.
    Complete,
}

/// Incremental scanner over recognizer stdout.
///
/// Lines are fed one at a time. The parser remembers the reported audio length and whether
/// the result marker was seen on an earlier line with nothing after it.
pub struct MarkerParser<'a> {
    markers: &'a MarkerSet,
    audio_seconds: Option<f64>,
    awaiting_result: bool,
}

impl<'a> MarkerParser<'a> {
    pub fn new(markers: &'a MarkerSet) -> Self {
        Self {
            markers,
            audio_seconds: None,
            awaiting_result: false,
        }
    }

    /// Audio length from the most recent parsable duration line.
    pub fn audio_seconds(&self) -> Option<f64> {
        self.audio_seconds
    }

    pub fn feed(&mut self, line: &str) -> Step {
        if let Some(seconds) = after_marker(line, &self.markers.duration).and_then(parse_seconds) {
            self.audio_seconds = Some(seconds);
        }

        if let Some(rest) = after_marker(line, &self.markers.result) {
            let text = rest.trim();
            if !text.is_empty() {
                return Step::Transcript(text.to_owned());
            }
            self.awaiting_result = true;
        } else if self.awaiting_result && !line.trim().is_empty() {
            return Step::Transcript(line.trim().to_owned());
        }

        if !self.markers.complete.is_empty() && line.contains(&self.markers.complete) {
            return Step::Complete;
        }

        Step::Continue
    }
}

fn after_marker<'l>(line: &'l str, marker: &str) -> Option<&'l str> {
    if marker.is_empty() {
        return None;
    }
    line.find(marker).map(|idx| &line[idx + marker.len()..])
}

/// `" 3.12s "` -> `3.12`
fn parse_seconds(raw: &str) -> Option<f64> {
    raw.trim()
        .trim_end_matches(['s', 'S'])
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|s| s.is_finite() && *s >= 0.0)
}
