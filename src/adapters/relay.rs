//! Power relay adapter.
//!
//! [`GpioRelay`] drives any `embedded_hal` output pin, so the same code
//! runs on an `esp_idf_hal::gpio::PinDriver` and on a host mock pin.
//! The relay module is active-low: driving the pin low closes the relay.

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use embedded_hal::digital::{Error as _, OutputPin};
use log::{info, warn};

use crate::app::ports::RelayPort;

pub struct GpioRelay<P: OutputPin> {
    pin: Mutex<P>,
    on: AtomicBool,
}

impl<P: OutputPin + Send> GpioRelay<P> {
    /// Take the pin and drive the relay off.
    pub fn new(pin: P) -> Self {
        let relay = Self {
            pin: Mutex::new(pin),
            on: AtomicBool::new(true),
        };
        relay.set(false);
        relay
    }
}

impl<P: OutputPin + Send> RelayPort for GpioRelay<P> {
    fn set(&self, on: bool) {
        let mut pin = self.pin.lock().unwrap_or_else(PoisonError::into_inner);
        let result = if on { pin.set_low() } else { pin.set_high() };
        match result {
            Ok(()) => {
                if self.on.swap(on, Ordering::AcqRel) != on {
                    info!("Relay: {}", if on { "ON" } else { "OFF" });
                }
            }
            Err(e) => warn!("Relay: pin write failed ({:?})", e.kind()),
        }
    }

    fn is_on(&self) -> bool {
        self.on.load(Ordering::Acquire)
    }
}

/// Pin that only remembers its level, for hosts without GPIO.
#[derive(Debug, Default)]
pub struct SimPin {
    pub high: bool,
}

impl embedded_hal::digital::ErrorType for SimPin {
    type Error = core::convert::Infallible;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.high = false;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.high = true;
        Ok(())
    }
}
