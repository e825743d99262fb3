//! Wall-clock adapter.
//!
//! Implements [`ClockPort`] on the system real-time clock, kept in UTC.
//!
//! - **`target_os = "espidf"`**: `gettimeofday` / `settimeofday` on the
//!   ESP-IDF RTC.
//! - **all other targets**: host `SystemTime` plus an offset that `set`
//!   adjusts, so `T:` behaves the same in simulation.

#[cfg(not(target_os = "espidf"))]
use core::sync::atomic::{AtomicI64, Ordering};

use log::info;

use crate::app::ports::{ClockError, ClockPort};
use crate::schedule::time::Timestamp;

// ── Civil calendar conversion (proleptic Gregorian, UTC) ──────

/// Seconds since 1970-01-01 00:00:00 for a calendar timestamp.
pub fn to_epoch_seconds(ts: &Timestamp) -> i64 {
    let (m, d) = (i64::from(ts.month), i64::from(ts.day));
    let y = i64::from(ts.year) - i64::from(m <= 2);
    let era = y.div_euclid(400);
    let yoe = y - era * 400;
    let mp = (m + 9) % 12;
    let doy = (153 * mp + 2) / 5 + d - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    let days = era * 146_097 + doe - 719_468;
    days * 86_400 + i64::from(ts.hour) * 3600 + i64::from(ts.minute) * 60 + i64::from(ts.second)
}

/// Calendar timestamp for seconds since the epoch.  `None` outside
/// years 0..=65535.
pub fn from_epoch_seconds(secs: i64) -> Option<Timestamp> {
    let days = secs.div_euclid(86_400);
    let tod = secs.rem_euclid(86_400);
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u8;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u8;
    let year = yoe + era * 400 + i64::from(month <= 2);
    Some(Timestamp::new(
        u16::try_from(year).ok()?,
        month,
        day,
        (tod / 3600) as u8,
        (tod % 3600 / 60) as u8,
        (tod % 60) as u8,
    ))
}

// ───────────────────────────────────────────────────────────────
// RTC clock
// ───────────────────────────────────────────────────────────────

pub struct RtcClock {
    #[cfg(not(target_os = "espidf"))]
    offset_secs: AtomicI64,
}

impl Default for RtcClock {
    fn default() -> Self {
        Self::new()
    }
}

impl RtcClock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            offset_secs: AtomicI64::new(0),
        }
    }

    #[cfg(target_os = "espidf")]
    fn platform_epoch(&self) -> i64 {
        let mut tv = esp_idf_svc::sys::timeval {
            tv_sec: 0,
            tv_usec: 0,
        };
        // SAFETY: valid out-pointer, null timezone.
        if unsafe { esp_idf_svc::sys::gettimeofday(&mut tv, core::ptr::null_mut()) } != 0 {
            return 0;
        }
        tv.tv_sec as i64
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_epoch(&self) -> i64 {
        let host = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |d| d.as_secs() as i64);
        host + self.offset_secs.load(Ordering::Relaxed)
    }

    #[cfg(target_os = "espidf")]
    fn platform_set(&self, epoch: i64) -> Result<(), ClockError> {
        let tv = esp_idf_svc::sys::timeval {
            tv_sec: epoch as esp_idf_svc::sys::time_t,
            tv_usec: 0,
        };
        // SAFETY: valid in-pointer, null timezone.
        if unsafe { esp_idf_svc::sys::settimeofday(&tv, core::ptr::null()) } != 0 {
            return Err(ClockError::SetFailed);
        }
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_set(&self, epoch: i64) -> Result<(), ClockError> {
        let host = self.platform_epoch() - self.offset_secs.load(Ordering::Relaxed);
        self.offset_secs.store(epoch - host, Ordering::Relaxed);
        Ok(())
    }
}

impl ClockPort for RtcClock {
    fn now(&self) -> Timestamp {
        from_epoch_seconds(self.platform_epoch()).unwrap_or_default()
    }

    fn set(&self, ts: Timestamp) -> Result<(), ClockError> {
        if !ts.is_valid() {
            return Err(ClockError::SetFailed);
        }
        self.platform_set(to_epoch_seconds(&ts))?;
        info!("RTC set to {}", ts);
        Ok(())
    }
}
