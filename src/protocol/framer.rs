//! # Job Framer
//!
//! Splits a raw connection byte stream into print jobs. A job starts at the
//! `^XA` marker and ends at the next `^XZ`; the payload between them (markers
//! excluded) is one [`Job`].
//!
//! ## State Machine
//!
//! ```text
//!            ^XA                       ^XZ
//! Idle ──────────────► InJob ──────────────────► Idle (emit Job)
//!  │ (discard noise)     │ (accumulate payload)
//! ```
//!
//! Network reads can cut a marker in half, so the framer keeps the last few
//! undecided bytes between calls to [`JobFramer::push`]. Markers are matched
//! ASCII case-insensitively, as printers accept `^xa`.

use tracing::{debug, warn};

/// Job start marker.
pub const START_MARKER: &[u8] = b"^XA";
/// Job end marker.
pub const END_MARKER: &[u8] = b"^XZ";

/// Largest payload accepted for a single job (16 MiB). A runaway job is
/// dropped and the framer waits for the next start marker.
pub const DEFAULT_MAX_JOB_SIZE: usize = 16 * 1024 * 1024;

/// One print job: the bytes between a start and end marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    payload: Vec<u8>,
}

impl Job {
    pub fn new(payload: Vec<u8>) -> Self {
        Self { payload }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameState {
    /// Waiting for `^XA`; anything else is noise.
    Idle,
    /// Inside a job, collecting payload until `^XZ`.
    InJob,
}

/// Incremental job framer for one connection.
#[derive(Debug)]
pub struct JobFramer {
    state: FrameState,
    /// Unprocessed bytes. In `InJob` this is the payload collected so far.
    buffer: Vec<u8>,
    /// Offset in `buffer` before which no end marker can start.
    scanned: usize,
    max_job_size: usize,
    /// Set while skipping the rest of an oversized job.
    overflowed: bool,
}

impl Default for JobFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl JobFramer {
    pub fn new() -> Self {
        Self::with_max_job_size(DEFAULT_MAX_JOB_SIZE)
    }

    pub fn with_max_job_size(max_job_size: usize) -> Self {
        Self {
            state: FrameState::Idle,
            buffer: Vec::new(),
            scanned: 0,
            max_job_size,
            overflowed: false,
        }
    }

    /// Whether a job has started but not yet ended.
    pub fn in_job(&self) -> bool {
        self.state == FrameState::InJob
    }

    /// Feed bytes from the stream and return every job they complete, in order.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Job> {
        self.buffer.extend_from_slice(bytes);
        let mut jobs = Vec::new();

        loop {
            match self.state {
                FrameState::Idle => match find_marker(&self.buffer, START_MARKER, 0) {
                    Some(pos) => {
                        if pos > 0 {
                            debug!(bytes = pos, "Discarding bytes outside a job");
                        }
                        self.buffer.drain(..pos + START_MARKER.len());
                        self.scanned = 0;
                        self.state = FrameState::InJob;
                    }
                    None => {
                        // Keep a possible partial marker at the tail.
                        let keep = START_MARKER.len() - 1;
                        if self.buffer.len() > keep {
                            let cut = self.buffer.len() - keep;
                            self.buffer.drain(..cut);
                        }
                        break;
                    }
                },
                FrameState::InJob => match find_marker(&self.buffer, END_MARKER, self.scanned) {
                    Some(pos) => {
                        let rest = self.buffer.split_off(pos + END_MARKER.len());
                        let mut payload = std::mem::replace(&mut self.buffer, rest);
                        payload.truncate(pos);
                        self.state = FrameState::Idle;
                        self.scanned = 0;

                        if std::mem::take(&mut self.overflowed) || pos > self.max_job_size {
                            warn!("Dropped oversized job (limit {} bytes)", self.max_job_size);
                        } else {
                            jobs.push(Job::new(payload));
                        }
                    }
                    None => {
                        self.scanned = self.buffer.len().saturating_sub(END_MARKER.len() - 1);
                        if self.buffer.len() > self.max_job_size {
                            // Keep only the tail that might hold a split end marker.
                            self.overflowed = true;
                            self.buffer.drain(..self.scanned);
                            self.scanned = 0;
                        }
                        break;
                    }
                },
            }
        }

        jobs
    }

    /// Signal end of stream. A job still open is incomplete and discarded.
    pub fn finish(&mut self) {
        if self.state == FrameState::InJob {
            debug!(
                bytes = self.buffer.len(),
                "Stream ended inside a job; discarding partial job"
            );
        }
        self.state = FrameState::Idle;
        self.buffer.clear();
        self.scanned = 0;
        self.overflowed = false;
    }
}

/// Find `marker` in `haystack` at or after `from`, ignoring ASCII case.
fn find_marker(haystack: &[u8], marker: &[u8], from: usize) -> Option<usize> {
    if haystack.len() < marker.len() || from > haystack.len() - marker.len() {
        return None;
    }
    haystack[from..]
        .windows(marker.len())
        .position(|window| window.eq_ignore_ascii_case(marker))
        .map(|pos| pos + from)
}

/// Frame a complete byte buffer (for example a `.zpl` file) into jobs.
pub fn split_jobs(bytes: &[u8]) -> Vec<Job> {
    let mut framer = JobFramer::new();
    let jobs = framer.push(bytes);
    framer.finish();
    jobs
}
