//! Recognition by running an external client program per recording.
//!
//! The client receives the audio path as its last argument and prints progress on stdout.
//! We read its output on a helper thread and scan each line with [`MarkerParser`] until the
//! transcript shows up, the client signals completion, stdout closes, or the time bound
//! expires. A client that keeps running after answering gets a grace period to exit before it
//! is killed; that wait happens off the caller's thread.

use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::Result;
use crate::error::Error;
use crate::opts::RecognizerOpts;
use crate::recognizer::{Recognition, Recognizer};
use crate::recognizers::markers::{MarkerParser, Step};

const REAP_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct ProcessRecognizer {
    opts: RecognizerOpts,
}

impl ProcessRecognizer {
    pub fn new(opts: RecognizerOpts) -> Self {
        Self { opts }
    }

    pub fn opts(&self) -> &RecognizerOpts {
        &self.opts
    }

    fn spawn(&self, audio_path: &Path) -> Result<Child> {
        let mut cmd = Command::new(&self.opts.program);
        cmd.args(&self.opts.args)
            .arg(audio_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.opts.working_dir {
            cmd.current_dir(dir);
        }

        cmd.spawn().map_err(|err| {
            Error::Recognition(format!(
                "failed to start '{}': {err}",
                self.opts.program.display()
            ))
        })
    }
}

impl Recognizer for ProcessRecognizer {
    fn recognize(&self, audio_path: &Path) -> Result<Recognition> {
        let mut child = self.spawn(audio_path)?;
        debug!(pid = child.id(), audio = %audio_path.display(), "recognizer started");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::msg("recognizer stdout was not captured"))?;
        if let Some(stderr) = child.stderr.take() {
            forward_stderr(stderr);
        }

        let (tx, rx) = mpsc::sync_channel::<String>(64);
        thread::spawn(move || {
            let mut reader = BufReader::new(stdout);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        // The client may not print UTF-8; keep whatever decodes.
                        let line = String::from_utf8_lossy(&buf).into_owned();
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let deadline = Instant::now() + self.opts.timeout;
        let mut parser = MarkerParser::new(&self.opts.markers);
        let transcript = loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok(line) => {
                    debug!(line = %line.trim_end(), "recognizer output");
                    match parser.feed(&line) {
                        Step::Continue => {}
                        Step::Transcript(text) => break Some(text),
                        Step::Complete => break None,
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break None,
                Err(RecvTimeoutError::Timeout) => {
                    warn!(pid = child.id(), timeout = ?self.opts.timeout, "recognizer timed out; killing");
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(Error::Timeout(self.opts.timeout));
                }
            }
        };

        reap_in_background(child, self.opts.grace_period);

        match transcript {
            Some(transcript) => Ok(Recognition {
                transcript,
                audio_seconds: parser.audio_seconds(),
            }),
            None => Err(Error::Recognition(
                "recognizer finished without a transcript".to_owned(),
            )),
        }
    }
}

fn forward_stderr<R: Read + Send + 'static>(stderr: R) {
    thread::spawn(move || {
        let mut reader = BufReader::new(stderr);
        let mut buf = Vec::new();
        while let Ok(n) = reader.read_until(b'\n', &mut buf) {
            if n == 0 {
                break;
            }
            debug!(line = %String::from_utf8_lossy(&buf).trim_end(), "recognizer stderr");
            buf.clear();
        }
    });
}

/// Give the child `grace` to exit by itself, then kill it.
fn reap_in_background(mut child: Child, grace: Duration) {
    thread::spawn(move || {
        let deadline = Instant::now() + grace;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    debug!(pid = child.id(), %status, "recognizer exited");
                    return;
                }
                Ok(None) if Instant::now() < deadline => thread::sleep(REAP_POLL_INTERVAL),
                Ok(None) => {
                    warn!(pid = child.id(), ?grace, "recognizer still running after grace period; killing");
                    let _ = child.kill();
                    let _ = child.wait();
                    return;
                }
                Err(err) => {
                    warn!(pid = child.id(), error = %err, "failed to poll recognizer");
                    return;
                }
            }
        }
    });
}
