//! Six-field timestamps and the two calendar-naive seconds metrics.
//!
//! Neither metric is calendar-correct and both must stay that way: the
//! ordering metric drives the start/skip decisions of the schedule engine
//! and the rebase metric shifts whole schedules, exactly as deployed
//! instruments expect.

use core::fmt;

use crate::error::ProtocolError;

/// `(year, month, day, hour, minute, second)`, ordered field by field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl Timestamp {
    pub const fn new(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
        }
    }

    /// Field ranges accepted for a schedule entry.
    pub fn is_valid(&self) -> bool {
        (1..=12).contains(&self.month)
            && (1..=31).contains(&self.day)
            && self.hour <= 23
            && self.minute <= 59
            && self.second <= 59
    }

    // ── Metrics ───────────────────────────────────────────────

    /// Same-day ordering metric: `h*3600 + min*60 + s + day*86400`.
    ///
    /// Month and year are ignored, so comparisons are only meaningful
    /// within one month.
    pub fn ordering_seconds(&self) -> i64 {
        self.hour as i64 * 3600 + self.minute as i64 * 60 + self.second as i64 + self.day as i64 * 86_400
    }

    /// Rebase metric on a 12×30-day calendar:
    /// `(((y*12 + m)*30 + d)*24 + h)*3600 + min*60 + s`.
    pub fn rebase_seconds(&self) -> i64 {
        let days = (self.year as i64 * 12 + self.month as i64) * 30 + self.day as i64;
        (days * 24 + self.hour as i64) * 3600 + self.minute as i64 * 60 + self.second as i64
    }

    /// Inverse used after rebasing.  Day and month come back one-based,
    /// so `from_rebase_seconds(t.rebase_seconds())` lands 31 naive days
    /// after `t`; differences between entries are preserved.
    pub fn from_rebase_seconds(total: i64) -> Option<Self> {
        if total < 0 {
            return None;
        }
        let mut rest = total;
        let second = (rest % 60) as u8;
        rest /= 60;
        let minute = (rest % 60) as u8;
        rest /= 60;
        let hour = (rest % 24) as u8;
        rest /= 24;
        let day = (rest % 30 + 1) as u8;
        rest /= 30;
        let month = (rest % 12 + 1) as u8;
        let year = u16::try_from(rest / 12).ok()?;
        Some(Self::new(year, month, day, hour, minute, second))
    }

    // ── Parsing ───────────────────────────────────────────────

    /// Parse the timestamp half of a schedule line.
    ///
    /// Everything except digits, `-`, `:` and spaces is dropped first.  The
    /// date needs at least three `-` fields; the time after the first space
    /// is optional and missing fields default to zero.
    pub fn parse_lenient(text: &str) -> Result<Self, ProtocolError> {
        let cleaned: String = text
            .trim()
            .chars()
            .filter(|c| c.is_ascii_digit() || matches!(c, ' ' | '-' | ':'))
            .collect();

        let (date_part, time_part) = cleaned.split_once(' ').unwrap_or((cleaned.as_str(), ""));

        let mut date = date_part.split('-');
        let year = field(date.next())?;
        let month = field(date.next())?;
        let day = field(date.next())?;

        let (mut hour, mut minute, mut second) = (0, 0, 0);
        if !time_part.is_empty() {
            let mut time = time_part.split(':');
            hour = field(time.next())?;
            if let Some(m) = time.next() {
                minute = field(Some(m))?;
            }
            if let Some(s) = time.next() {
                second = field(Some(s))?;
            }
        }

        let ts = Self::new(
            u16::try_from(year).map_err(|_| ProtocolError::FieldOutOfRange)?,
            narrow(month)?,
            narrow(day)?,
            narrow(hour)?,
            narrow(minute)?,
            narrow(second)?,
        );
        if !ts.is_valid() {
            return Err(ProtocolError::FieldOutOfRange);
        }
        Ok(ts)
    }

    /// Parse the 14-digit `YYYYMMDDHHMMSS` form used by `T:`.
    pub fn parse_compact(text: &str) -> Result<Self, ProtocolError> {
        let text = text.trim();
        if text.len() != 14 || !text.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ProtocolError::InvalidCompactTime);
        }
        let num = |range: core::ops::Range<usize>| -> u32 {
            text[range].bytes().fold(0, |acc, b| acc * 10 + u32::from(b - b'0'))
        };
        let ts = Self::new(
            num(0..4) as u16,
            num(4..6) as u8,
            num(6..8) as u8,
            num(8..10) as u8,
            num(10..12) as u8,
            num(12..14) as u8,
        );
        if !ts.is_valid() {
            return Err(ProtocolError::FieldOutOfRange);
        }
        Ok(ts)
    }
}

fn field(part: Option<&str>) -> Result<u32, ProtocolError> {
    part.map(str::trim)
        .filter(|p| !p.is_empty())
        .and_then(|p| p.parse::<u32>().ok())
        .ok_or(ProtocolError::InvalidTimestamp)
}

fn narrow(v: u32) -> Result<u8, ProtocolError> {
    u8::try_from(v).map_err(|_| ProtocolError::FieldOutOfRange)
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}
