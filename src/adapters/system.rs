//! Processor control adapter.
//!
//! Implements [`SystemPort`].
//!
//! - **`target_os = "espidf"`**: `esp_restart()` and `esp_deep_sleep_start()`;
//!   neither returns.
//! - **all other targets**: records the request so tests can observe it.

use core::sync::atomic::{AtomicU32, Ordering};

use log::warn;

use crate::app::ports::{SystemError, SystemPort};

pub struct SystemControl {
    reboots: AtomicU32,
    sleeps: AtomicU32,
    deep_sleep_supported: bool,
}

impl Default for SystemControl {
    fn default() -> Self {
        Self::new(true)
    }
}

impl SystemControl {
    pub fn new(deep_sleep_supported: bool) -> Self {
        Self {
            reboots: AtomicU32::new(0),
            sleeps: AtomicU32::new(0),
            deep_sleep_supported,
        }
    }

    pub fn reboot_count(&self) -> u32 {
        self.reboots.load(Ordering::Relaxed)
    }

    pub fn deep_sleep_count(&self) -> u32 {
        self.sleeps.load(Ordering::Relaxed)
    }

    #[cfg(target_os = "espidf")]
    fn platform_reboot(&self) {
        // SAFETY: no preconditions; does not return.
        unsafe { esp_idf_svc::sys::esp_restart() };
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_reboot(&self) {
        log::info!("System(sim): reboot requested");
    }

    #[cfg(target_os = "espidf")]
    fn platform_deep_sleep(&self) {
        // SAFETY: no wake source configured, so only reset wakes the chip.
        unsafe { esp_idf_svc::sys::esp_deep_sleep_start() };
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_deep_sleep(&self) {
        log::info!("System(sim): deep sleep requested");
    }
}

impl SystemPort for SystemControl {
    fn reboot(&self) {
        warn!("System: rebooting");
        self.reboots.fetch_add(1, Ordering::Relaxed);
        self.platform_reboot();
    }

    fn deep_sleep(&self) -> Result<(), SystemError> {
        if !self.deep_sleep_supported {
            return Err(SystemError::Unsupported);
        }
        warn!("System: entering deep sleep");
        self.sleeps.fetch_add(1, Ordering::Relaxed);
        self.platform_deep_sleep();
        Ok(())
    }
}
