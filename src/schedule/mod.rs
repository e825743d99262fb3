//! Schedule store: the ordered list of jobs and its text persistence.
//!
//! One line per job, ascending by start time:
//!
//! ```text
//! /2O02R at 2025-03-07 14:30:00
//! /2O03R at 2025-03-07 15:30:00
//! ```
//!
//! A [`Schedule`] is never edited in place: loads and uploads build a new
//! one, and the engine only ever pops stale entries off the front.

pub mod time;

use log::{info, warn};

use crate::app::ports::{FileStore, StorageError};
use crate::error::ProtocolError;
use time::Timestamp;

/// Hard cap on schedule length.
pub const MAX_ENTRIES: usize = 100;

/// Separator between the command and the timestamp of a schedule line.
pub const LINE_SEPARATOR: &str = " at ";

/// `/…R`, the only shape of device command the instrument accepts.
pub fn is_device_command(text: &str) -> bool {
    !text.is_empty() && text.starts_with('/') && text.ends_with('R')
}

// ───────────────────────────────────────────────────────────────
// Job
// ───────────────────────────────────────────────────────────────

/// One scheduled actuation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub command: String,
    pub start: Timestamp,
    /// The line this job was parsed from, trimmed.
    pub raw: String,
}

impl Job {
    /// Parse `"<command> at <timestamp>"`.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let raw = line.trim();
        let (command, stamp) = raw
            .split_once(LINE_SEPARATOR)
            .ok_or(ProtocolError::MissingSeparator)?;
        let command = command.trim();
        if !is_device_command(command) {
            return Err(ProtocolError::InvalidCommand);
        }
        Ok(Self {
            command: command.to_string(),
            start: Timestamp::parse_lenient(stamp)?,
            raw: raw.to_string(),
        })
    }

    /// Canonical persisted form.
    pub fn to_line(&self) -> String {
        format!("{}{}{}", self.command, LINE_SEPARATOR, self.start)
    }
}

// ───────────────────────────────────────────────────────────────
// Schedule
// ───────────────────────────────────────────────────────────────

/// Which file a schedule came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleSource {
    Primary,
    Fallback,
    Missing,
}

/// Jobs sorted ascending by start, at most [`MAX_ENTRIES`] long.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schedule {
    jobs: heapless::Vec<Job, MAX_ENTRIES>,
}

impl Schedule {
    /// Sort and cap.  The earliest [`MAX_ENTRIES`] jobs are kept.
    pub fn from_jobs(jobs: impl IntoIterator<Item = Job>) -> Self {
        let mut all: Vec<Job> = jobs.into_iter().collect();
        all.sort_by_key(|j| j.start);
        if all.len() > MAX_ENTRIES {
            warn!(
                "Schedule: {} entries, keeping the first {}",
                all.len(),
                MAX_ENTRIES
            );
            all.truncate(MAX_ENTRIES);
        }
        let mut out = heapless::Vec::new();
        for job in all {
            // Cannot fail after the truncate above.
            let _ = out.push(job);
        }
        Self { jobs: out }
    }

    /// Parse every line, skipping blanks and logging invalid ones.
    pub fn from_lines(lines: &[String]) -> Self {
        let jobs = lines
            .iter()
            .enumerate()
            .filter(|(_, l)| !l.trim().is_empty())
            .filter_map(|(n, l)| match Job::parse(l) {
                Ok(job) => Some(job),
                Err(e) => {
                    warn!("Schedule: skipping line {} ({}): {}", n + 1, e, l.trim());
                    None
                }
            });
        Self::from_jobs(jobs)
    }

    pub fn load(files: &dyn FileStore, name: &str) -> Result<Self, StorageError> {
        let lines = files.read_lines(name)?;
        let schedule = Self::from_lines(&lines);
        info!("Schedule: loaded {} entries from {}", schedule.len(), name);
        Ok(schedule)
    }

    /// Load `primary`, or `fallback` when the primary is missing, unreadable
    /// or has no valid entries.
    pub fn load_with_fallback(
        files: &dyn FileStore,
        primary: &str,
        fallback: &str,
    ) -> (Self, ScheduleSource) {
        match Self::load(files, primary) {
            Ok(s) if !s.is_empty() => return (s, ScheduleSource::Primary),
            Ok(_) => info!("Schedule: {} is empty, trying {}", primary, fallback),
            Err(e) => info!("Schedule: {} unavailable ({}), trying {}", primary, e, fallback),
        }
        match Self::load(files, fallback) {
            Ok(s) if !s.is_empty() => (s, ScheduleSource::Fallback),
            _ => (Self::default(), ScheduleSource::Missing),
        }
    }

    pub fn save(&self, files: &dyn FileStore, name: &str) -> Result<(), StorageError> {
        files.write_lines(name, &self.to_lines())
    }

    pub fn to_lines(&self) -> Vec<String> {
        self.jobs.iter().map(Job::to_line).collect()
    }

    // ── Access ────────────────────────────────────────────────

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn head(&self) -> Option<&Job> {
        self.jobs.first()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Pop every head entry whose grace window has passed
    /// (`start + grace < now` on the ordering metric).
    pub fn pop_stale(&mut self, now: Timestamp, grace_secs: u32) -> Vec<Job> {
        let now_s = now.ordering_seconds();
        let mut skipped = Vec::new();
        while self
            .jobs
            .first()
            .is_some_and(|head| head.start.ordering_seconds() + i64::from(grace_secs) < now_s)
        {
            skipped.push(self.jobs.remove(0));
        }
        skipped
    }

    /// Shift the schedule onto `now`, preserving offsets between entries.
    ///
    /// Operator utility; the engine cycle never calls it.  The earliest
    /// entry lands at `from_rebase_seconds(now.rebase_seconds())`, which is
    /// one month and one day after `now` on the naive calendar.  Entries
    /// that fall off that calendar are dropped.
    pub fn rebase_to(&self, now: Timestamp) -> Self {
        let Some(earliest) = self.jobs.iter().map(|j| j.start.rebase_seconds()).min() else {
            return Self::default();
        };
        let now_s = now.rebase_seconds();
        let jobs = self.jobs.iter().filter_map(|job| {
            let start = Timestamp::from_rebase_seconds(now_s + job.start.rebase_seconds() - earliest)?;
            let mut moved = job.clone();
            moved.start = start;
            moved.raw = moved.to_line();
            Some(moved)
        });
        Self::from_jobs(jobs)
    }
}
