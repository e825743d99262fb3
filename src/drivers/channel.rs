//! Two-channel serial driver for the pump and the valve actuator.
//!
//! Commands are plain text terminated by `\r`; replies end with `\n`
//! (0x0A).  The links are full duplex, so there is no direction pin to
//! toggle.  Each channel is serialised by its own lock, held for one
//! write/read transaction.
//!
//! ```text
//!   "/1…"  ──▶ pump UART
//!   "/2…"  ──▶ actuator UART
//! ```

use core::fmt::Write as _;
use std::sync::{Mutex, PoisonError};

use log::{info, warn};

use crate::app::ports::{ClockPort, DeviceLink, FileStore, TimePort};
use crate::config::SystemConfig;
use crate::error::DeviceError;
use crate::safety::FaultController;

/// Command terminator.
pub const TERMINATOR: u8 = b'\r';
/// Reply terminator.
pub const LINE_END: u8 = 0x0A;
/// Upper bound on any reply buffer.
pub const MAX_RESPONSE_BYTES: usize = 64;

pub type Response = heapless::Vec<u8, MAX_RESPONSE_BYTES>;

// ───────────────────────────────────────────────────────────────
// Channel routing
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Pump,
    Actuator,
}

impl Channel {
    /// Route by the two-character device address prefix.
    pub fn route(command: &str) -> Option<Self> {
        if command.starts_with("/1") {
            Some(Self::Pump)
        } else if command.starts_with("/2") {
            Some(Self::Actuator)
        } else {
            None
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Pump => "PUMP",
            Self::Actuator => "ACTUATOR",
        }
    }
}

/// Space-separated upper-case hex, as written to the diagnostic log.
pub fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{b:02X}");
    }
    out
}

// ───────────────────────────────────────────────────────────────
// Driver
// ───────────────────────────────────────────────────────────────

/// Receive window and diagnostic log target.
#[derive(Debug, Clone)]
pub struct LinkSettings {
    pub receive_timeout_ms: u32,
    pub max_response_bytes: usize,
    pub pump_log_file: heapless::String<32>,
}

impl From<&SystemConfig> for LinkSettings {
    fn from(c: &SystemConfig) -> Self {
        Self {
            receive_timeout_ms: c.receive_timeout_ms,
            max_response_bytes: (c.max_response_bytes as usize).min(MAX_RESPONSE_BYTES),
            pump_log_file: c.pump_log_file.clone(),
        }
    }
}

/// Device protocol driver over the two serial links.
pub struct DeviceDriver<'a> {
    pump: &'a dyn DeviceLink,
    actuator: &'a dyn DeviceLink,
    pump_lock: Mutex<()>,
    actuator_lock: Mutex<()>,
    pub(super) time: &'a dyn TimePort,
    pub(super) clock: &'a dyn ClockPort,
    pub(super) files: &'a dyn FileStore,
    pub(super) faults: &'a FaultController,
    pub(super) settings: LinkSettings,
}

impl<'a> DeviceDriver<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pump: &'a dyn DeviceLink,
        actuator: &'a dyn DeviceLink,
        time: &'a dyn TimePort,
        clock: &'a dyn ClockPort,
        files: &'a dyn FileStore,
        faults: &'a FaultController,
        settings: LinkSettings,
    ) -> Self {
        Self {
            pump,
            actuator,
            pump_lock: Mutex::new(()),
            actuator_lock: Mutex::new(()),
            time,
            clock,
            files,
            faults,
            settings,
        }
    }

    /// Run `f` with exclusive use of `channel`.
    pub(super) fn transact<R>(&self, channel: Channel, f: impl FnOnce(&dyn DeviceLink) -> R) -> R {
        let (link, lock) = match channel {
            Channel::Pump => (self.pump, &self.pump_lock),
            Channel::Actuator => (self.actuator, &self.actuator_lock),
        };
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        f(link)
    }

    // ── Framing ───────────────────────────────────────────────

    pub(super) fn write_command(link: &dyn DeviceLink, command: &str) -> Result<(), DeviceError> {
        let mut frame = Vec::with_capacity(command.len() + 1);
        frame.extend_from_slice(command.as_bytes());
        frame.push(TERMINATOR);
        link.write(&frame)
    }

    /// Collect bytes until [`LINE_END`], `max_bytes` or `timeout_ms`.
    pub(super) fn read_response(
        &self,
        link: &dyn DeviceLink,
        timeout_ms: u32,
        max_bytes: usize,
    ) -> Result<Response, DeviceError> {
        let max_bytes = max_bytes.min(MAX_RESPONSE_BYTES);
        let deadline = self.time.uptime_ms() + u64::from(timeout_ms);
        let mut buf = Response::new();
        while buf.len() < max_bytes {
            let remaining = deadline.saturating_sub(self.time.uptime_ms());
            if remaining == 0 {
                break;
            }
            match link.read_byte(remaining as u32)? {
                Some(b) => {
                    // Bounded by the loop condition.
                    let _ = buf.push(b);
                    if b == LINE_END {
                        break;
                    }
                }
                None => break,
            }
        }
        Ok(buf)
    }

    // ── Public operations ─────────────────────────────────────

    /// Write `command` plus terminator without waiting for a reply.
    pub fn send(&self, channel: Channel, command: &str) -> Result<(), DeviceError> {
        info!("TX {}: {}", channel.name(), command);
        self.transact(channel, |link| Self::write_command(link, command))
    }

    /// Read one reply from `channel`.  An empty buffer means the device
    /// never answered.
    pub fn receive(
        &self,
        channel: Channel,
        timeout_ms: u32,
        max_bytes: usize,
    ) -> Result<Response, DeviceError> {
        self.transact(channel, |link| self.read_response(link, timeout_ms, max_bytes))
    }

    /// Send and collect the acknowledgement in one transaction.
    pub fn command(&self, channel: Channel, command: &str) -> Result<Response, DeviceError> {
        info!("TX {}: {}", channel.name(), command);
        let reply = self.transact(channel, |link| {
            Self::write_command(link, command)?;
            self.read_response(
                link,
                self.settings.receive_timeout_ms,
                self.settings.max_response_bytes,
            )
        })?;
        if reply.is_empty() {
            warn!("RX {}: no reply to {}", channel.name(), command);
        } else {
            info!("RX {}: {}", channel.name(), hex_dump(&reply));
        }
        Ok(reply)
    }

    /// Route by prefix and send.
    pub fn dispatch(&self, command: &str) -> Result<Channel, DeviceError> {
        let channel = Channel::route(command).ok_or(DeviceError::Unroutable)?;
        self.send(channel, command)?;
        Ok(channel)
    }

    // ── Pump diagnostic log ───────────────────────────────────

    /// Append `"<timestamp> | <message>"` to the pump log.
    pub fn pump_log(&self, message: &str) {
        let line = format!("{} | {}", self.clock.now(), message);
        if let Err(e) = self.files.append_line(&self.settings.pump_log_file, &line) {
            warn!("Pump log write failed ({}): {}", e, line);
        }
    }

    pub fn truncate_pump_log(&self) {
        if let Err(e) = self.files.truncate(&self.settings.pump_log_file) {
            warn!("Pump log truncate failed: {}", e);
        }
    }
}
