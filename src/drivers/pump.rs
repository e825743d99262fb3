//! Syringe pump protocol: status queries, poll-until-ready and the legacy
//! frame check.
//!
//! ## Poll contract
//!
//! [`DeviceDriver::poll_until_ready`] queries status every `interval_ms`
//! until `timeout_ms` has elapsed.  It fails at once on a nonzero error
//! code or on emergency stop (checked every iteration) and succeeds on the
//! first ready reply.  A poll that gets no reply is logged and retried
//! until the timeout.

use log::{info, warn};

use super::channel::{Channel, DeviceDriver, hex_dump};
use super::status::DeviceStatus;
use crate::config::PollPlan;
use crate::error::DeviceError;

// ── Fixed command strings ─────────────────────────────────────

/// Status request.
pub const STATUS_QUERY: &str = "/1QR";
/// Initialise the pump and home the plunger.
pub const PUMP_INIT: &str = "/1ZWR";
/// One full draw/dispense stroke, used for both rinse and pump cycles.
pub const PUMP_STROKE: &str = "/1J0S14A0A7640J1M500S14A0M500J0R";
/// Home the valve selector.
pub const VALVE_HOME: &str = "/2wR";
/// Select the rinse port.
pub const RINSE_PORT: &str = "/2O01R";

/// Reply the pump sends for an accepted stroke.
pub const EXPECTED_FRAME: [u8; 7] = [0xFF, 0x2F, 0x30, 0x40, 0x03, 0x0D, 0x0A];

/// Result of [`DeviceDriver::send_and_validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameCheck {
    Ok,
    Mismatch,
    LostComms,
}

impl FrameCheck {
    pub fn label(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Mismatch => "MISMATCH",
            Self::LostComms => "LOST COMMS",
        }
    }
}

impl DeviceDriver<'_> {
    /// Query and decode the pump status.  Stale input is flushed first so
    /// the reply cannot be a leftover acknowledgement.
    pub fn query_pump_status(&self) -> Result<DeviceStatus, DeviceError> {
        let reply = self.transact(Channel::Pump, |link| {
            link.clear_input();
            Self::write_command(link, STATUS_QUERY)?;
            self.read_response(
                link,
                self.settings.receive_timeout_ms,
                self.settings.max_response_bytes,
            )
        })?;
        DeviceStatus::from_response(&reply)
    }

    /// Poll until the pump reports ready.  The first poll is immediate and
    /// the last one falls on the timeout.
    pub fn poll_until_ready(&self, plan: PollPlan) -> Result<DeviceStatus, DeviceError> {
        let started = self.time.uptime_ms();
        let timeout = u64::from(plan.timeout_ms);
        let mut attempt: u32 = 0;

        loop {
            if self.faults.stop_requested() {
                self.pump_log("poll aborted: emergency stop");
                return Err(DeviceError::Aborted);
            }

            attempt += 1;
            match self.query_pump_status() {
                Ok(status) => {
                    self.pump_log(&format!("poll {attempt}: {status}"));
                    if status.is_fault() {
                        warn!("Pump fault {}: {}", status.error_code, status.error_description);
                        return Err(DeviceError::Fault(status.error_code));
                    }
                    if status.ready {
                        info!("Pump ready after {} poll(s)", attempt);
                        return Ok(status);
                    }
                }
                Err(e) => {
                    self.pump_log(&format!("poll {attempt}: {e}"));
                }
            }

            let elapsed = self.time.uptime_ms().saturating_sub(started);
            if elapsed >= timeout {
                self.pump_log(&format!("poll timeout after {}s", elapsed / 1000));
                return Err(DeviceError::Timeout);
            }
            // The last sleep is cut short so one poll lands on the deadline.
            let wait = u64::from(plan.interval_ms).min(timeout - elapsed);
            self.time.sleep_ms(wait as u32);
        }
    }

    /// Send, receive and compare against [`EXPECTED_FRAME`].  Every call
    /// appends a hex audit line to the pump log.
    pub fn send_and_validate(
        &self,
        channel: Channel,
        command: &str,
        cycle: Option<u32>,
    ) -> Result<FrameCheck, DeviceError> {
        let reply = self.command(channel, command)?;
        let check = if reply.is_empty() {
            FrameCheck::LostComms
        } else if reply.as_slice() == EXPECTED_FRAME.as_slice() {
            FrameCheck::Ok
        } else {
            FrameCheck::Mismatch
        };

        let mut line = String::new();
        if let Some(n) = cycle {
            line.push_str(&format!("cycle {n} | "));
        }
        line.push_str(&format!(
            "{} | TX {} | RX [{}]",
            check.label(),
            command,
            hex_dump(&reply)
        ));
        if check != FrameCheck::Ok {
            line.push_str(&format!(" | expected [{}]", hex_dump(&EXPECTED_FRAME)));
        }
        self.pump_log(&line);
        Ok(check)
    }
}
