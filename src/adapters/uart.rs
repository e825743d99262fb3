//! Serial link adapter for the pump and the valve actuator.
//!
//! Implements [`DeviceLink`].
//!
//! - **`target_os = "espidf"`**: [`UartLink`] wraps an `esp_idf_hal`
//!   `UartDriver` (9600 baud, 8N1, full duplex).
//! - **all other targets**: [`SimDeviceLink`] acknowledges every command
//!   with a canned ready frame so the firmware runs end to end on a host.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::debug;

use crate::app::ports::DeviceLink;
use crate::drivers::channel::TERMINATOR;
use crate::error::DeviceError;

/// Line rate of both controllers.
pub const BAUD_RATE: u32 = 9600;

/// Reply of an idle, error-free controller.
pub const READY_FRAME: [u8; 7] = [0xFF, 0x2F, 0x30, 0x60, 0x03, 0x0D, 0x0A];

// ───────────────────────────────────────────────────────────────
// ESP-IDF UART
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub struct UartLink {
    name: &'static str,
    driver: Mutex<esp_idf_hal::uart::UartDriver<'static>>,
}

#[cfg(target_os = "espidf")]
impl UartLink {
    /// Open `uart` on the given pins at [`BAUD_RATE`].
    pub fn new<U: esp_idf_hal::uart::Uart>(
        name: &'static str,
        uart: impl esp_idf_hal::peripheral::Peripheral<P = U> + 'static,
        tx: impl esp_idf_hal::peripheral::Peripheral<P = impl esp_idf_hal::gpio::OutputPin> + 'static,
        rx: impl esp_idf_hal::peripheral::Peripheral<P = impl esp_idf_hal::gpio::InputPin> + 'static,
    ) -> Result<Self, DeviceError> {
        use esp_idf_hal::gpio::AnyIOPin;
        use esp_idf_hal::uart::{UartDriver, config::Config};
        use esp_idf_hal::units::Hertz;

        let config = Config::new().baudrate(Hertz(BAUD_RATE));
        let driver = UartDriver::new(
            uart,
            tx,
            rx,
            Option::<AnyIOPin>::None,
            Option::<AnyIOPin>::None,
            &config,
        )
        .map_err(|e| {
            log::error!("UART {}: init failed ({})", name, e);
            DeviceError::Link
        })?;
        log::info!("UART {}: {} baud", name, BAUD_RATE);
        Ok(Self {
            name,
            driver: Mutex::new(driver),
        })
    }

    fn driver(&self) -> MutexGuard<'_, esp_idf_hal::uart::UartDriver<'static>> {
        self.driver.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(target_os = "espidf")]
impl DeviceLink for UartLink {
    fn write(&self, bytes: &[u8]) -> Result<(), DeviceError> {
        let driver = self.driver();
        let mut sent = 0;
        while sent < bytes.len() {
            sent += driver.write(&bytes[sent..]).map_err(|e| {
                log::warn!("UART {}: write failed ({})", self.name, e);
                DeviceError::Link
            })?;
        }
        Ok(())
    }

    fn read_byte(&self, timeout_ms: u32) -> Result<Option<u8>, DeviceError> {
        use esp_idf_hal::delay::TickType;
        let mut buf = [0u8; 1];
        let ticks = TickType::new_millis(u64::from(timeout_ms)).ticks();
        match self.driver().read(&mut buf, ticks) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(buf[0])),
            Err(e) => {
                log::warn!("UART {}: read failed ({})", self.name, e);
                Err(DeviceError::Link)
            }
        }
    }

    fn clear_input(&self) {
        if let Err(e) = self.driver().clear_rx() {
            log::warn!("UART {}: flush failed ({})", self.name, e);
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Simulated controller
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct SimState {
    pending: Vec<u8>,
    rx: VecDeque<u8>,
    commands: Vec<String>,
}

/// Host stand-in for one controller.
pub struct SimDeviceLink {
    name: &'static str,
    reply: Vec<u8>,
    state: Mutex<SimState>,
}

impl SimDeviceLink {
    pub fn new(name: &'static str) -> Self {
        Self::with_reply(name, &READY_FRAME)
    }

    /// Controller that answers every command with `reply`.
    pub fn with_reply(name: &'static str, reply: &[u8]) -> Self {
        Self {
            name,
            reply: reply.to_vec(),
            state: Mutex::new(SimState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Commands received so far, without terminators.
    pub fn commands(&self) -> Vec<String> {
        self.state().commands.clone()
    }
}

impl DeviceLink for SimDeviceLink {
    fn write(&self, bytes: &[u8]) -> Result<(), DeviceError> {
        let mut state = self.state();
        for &b in bytes {
            if b == TERMINATOR {
                let command = String::from_utf8_lossy(&state.pending).into_owned();
                state.pending.clear();
                debug!("SIM {}: {}", self.name, command);
                state.commands.push(command);
                let reply = self.reply.clone();
                state.rx.extend(reply);
            } else {
                state.pending.push(b);
            }
        }
        Ok(())
    }

    fn read_byte(&self, _timeout_ms: u32) -> Result<Option<u8>, DeviceError> {
        Ok(self.state().rx.pop_front())
    }

    fn clear_input(&self) {
        self.state().rx.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_acknowledges_each_terminated_command() {
        let link = SimDeviceLink::new("PUMP");
        link.write(b"/1ZWR\r").unwrap();
        let mut reply = Vec::new();
        while let Some(b) = link.read_byte(10).unwrap() {
            reply.push(b);
        }
        assert_eq!(reply, READY_FRAME);
        assert_eq!(link.commands(), vec!["/1ZWR"]);
    }

    #[test]
    fn partial_write_waits_for_terminator() {
        let link = SimDeviceLink::new("ACTUATOR");
        link.write(b"/2O0").unwrap();
        assert_eq!(link.read_byte(10).unwrap(), None);
        link.write(b"5R\r").unwrap();
        assert_eq!(link.commands(), vec!["/2O05R"]);
        link.clear_input();
        assert_eq!(link.read_byte(10).unwrap(), None);
    }
}
