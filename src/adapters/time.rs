//! Monotonic time adapter.
//!
//! Implements [`TimePort`] for the engine, the sequencer and the device
//! driver.
//!
//! - **`target_os = "espidf"`**: `esp_timer_get_time()` (microsecond,
//!   monotonic); sleeps yield to FreeRTOS through `std::thread::sleep`.
//! - **`not(target_os = "espidf")`**: `std::time::Instant`.

use std::time::Duration;

use crate::app::ports::TimePort;

pub struct MonotonicTime {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for MonotonicTime {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicTime {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }

    /// Microseconds since boot.
    #[cfg(target_os = "espidf")]
    pub fn uptime_us(&self) -> u64 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64
    }

    /// Microseconds since the adapter was created.
    #[cfg(not(target_os = "espidf"))]
    pub fn uptime_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }
}

impl TimePort for MonotonicTime {
    fn uptime_ms(&self) -> u64 {
        self.uptime_us() / 1000
    }

    fn sleep_ms(&self, ms: u32) {
        std::thread::sleep(Duration::from_millis(u64::from(ms)));
    }
}
