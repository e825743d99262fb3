//! Reassembly buffers for the two upload sub-protocols.
//!
//! Schedule upload: `DATA:` fragments are classified by shape and joined
//! into `"<command> at <date> <time>"` lines.  Legacy clients instead send
//! raw text, possibly split mid-line, which is re-joined on `\n`.
//!
//! Command upload: indexed fragments reassembled in ascending index order
//! once all `N` have arrived.  A repeated index overwrites the earlier
//! payload.

use std::collections::BTreeMap;

use crate::error::ProtocolError;
use crate::schedule::{LINE_SEPARATOR, is_device_command};

// ───────────────────────────────────────────────────────────────
// Schedule upload
// ───────────────────────────────────────────────────────────────

/// Which field a `DATA:` payload fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fragment {
    Command,
    Date,
    Time,
}

impl Fragment {
    /// Structural classification, checked in this order: `/…R` command,
    /// 10-char date containing `-`, anything with `:` is a time.
    pub fn classify(payload: &str) -> Option<Self> {
        if is_device_command(payload) {
            Some(Self::Command)
        } else if payload.len() == 10 && payload.contains('-') {
            Some(Self::Date)
        } else if payload.contains(':') {
            Some(Self::Time)
        } else {
            None
        }
    }
}

/// Result of one accepted `DATA:` fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentOutcome {
    pub kind: Fragment,
    /// Total line count when this fragment completed an entry.
    pub built: Option<usize>,
}

#[derive(Debug, Default)]
pub struct ScheduleUpload {
    active: bool,
    lines: Vec<String>,
    command: Option<String>,
    date: Option<String>,
    time: Option<String>,
    /// Unterminated tail of the last legacy text frame.
    carry: String,
}

impl ScheduleUpload {
    pub fn begin(&mut self) {
        *self = Self {
            active: true,
            ..Self::default()
        };
    }

    pub fn abort(&mut self) {
        *self = Self::default();
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Append the held triple as a line if all three fields are present.
    fn flush_triple(&mut self) -> bool {
        if let (Some(c), Some(d), Some(t)) = (&self.command, &self.date, &self.time) {
            self.lines
                .push(format!("{c}{LINE_SEPARATOR}{d} {t}"));
            self.command = None;
            self.date = None;
            self.time = None;
            true
        } else {
            false
        }
    }

    /// Apply one `DATA:` payload.  Unrecognised payloads leave the
    /// buffers untouched.
    pub fn push_fragment(&mut self, payload: &str) -> Result<FragmentOutcome, ProtocolError> {
        let kind = Fragment::classify(payload).ok_or(ProtocolError::UnrecognizedData)?;
        match kind {
            Fragment::Command => {
                self.flush_triple();
                // A second command replaces a partial entry outright.
                if self.command.is_some() {
                    self.date = None;
                    self.time = None;
                }
                self.command = Some(payload.to_string());
            }
            Fragment::Date => self.date = Some(payload.to_string()),
            Fragment::Time => self.time = Some(payload.to_string()),
        }
        let built = self.flush_triple().then_some(self.lines.len());
        Ok(FragmentOutcome { kind, built })
    }

    /// Apply an unframed text chunk and return the lines it completed.
    ///
    /// The chunk is joined to the carried partial and split on `\n`.  The
    /// trailing piece counts as complete only when it holds exactly one
    /// `" at "`; otherwise it is carried to the next chunk.
    pub fn push_legacy(&mut self, text: &str) -> Vec<String> {
        let joined = core::mem::take(&mut self.carry) + text;
        let mut pieces: Vec<&str> = joined.split('\n').collect();
        let last = pieces.pop().unwrap_or_default().trim();

        let mut added: Vec<String> = pieces
            .into_iter()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        if !last.is_empty() {
            if last.matches(LINE_SEPARATOR).count() == 1 {
                added.push(last.to_string());
            } else {
                self.carry = last.to_string();
            }
        }
        self.lines.extend(added.iter().cloned());
        added
    }

    /// Flush any complete triple and hand back every accumulated line.
    /// The upload is closed afterwards.
    pub fn finish(&mut self) -> Vec<String> {
        self.flush_triple();
        let lines = core::mem::take(&mut self.lines);
        self.abort();
        lines
    }
}

// ───────────────────────────────────────────────────────────────
// Command upload
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct CommandUpload {
    active: bool,
    expected: usize,
    parts: BTreeMap<usize, String>,
}

impl CommandUpload {
    pub fn begin(&mut self, expected: usize) {
        self.active = true;
        self.expected = expected;
        self.parts.clear();
    }

    pub fn abort(&mut self) {
        *self = Self::default();
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Record a fragment.  Returns the number of distinct indices held.
    pub fn insert(&mut self, index: usize, payload: &str) -> Result<usize, ProtocolError> {
        if !self.active {
            return Err(ProtocolError::NoUploadInProgress);
        }
        if index >= self.expected {
            return Err(ProtocolError::InvalidFragmentIndex);
        }
        self.parts.insert(index, payload.to_string());
        Ok(self.parts.len())
    }

    pub fn is_complete(&self) -> bool {
        self.active && self.parts.len() == self.expected
    }

    /// Concatenate in index order and close the upload.  `None` while
    /// fragments are still missing.
    pub fn take_assembled(&mut self) -> Option<String> {
        if !self.is_complete() {
            return None;
        }
        let assembled = self.parts.values().map(String::as_str).collect();
        self.abort();
        Some(assembled)
    }
}
