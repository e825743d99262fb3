//! Unified error types for the autosampler firmware.
//!
//! A single `Error` enum that every subsystem can convert into, keeping the
//! engine and decoder error handling uniform.  All variants are `Copy` so
//! they can be passed through the sequencer and FSM without allocation.
//! Port-level errors (storage, transport, clock, system) live next to their
//! traits in [`crate::app::ports`].

use core::fmt;

use crate::app::ports::{ClockError, StorageError, SystemError, TransportError};
use crate::config::ConfigError;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// An inbound frame, timestamp or schedule line was malformed.
    Protocol(ProtocolError),
    /// A serial device transaction failed.
    Device(DeviceError),
    /// The wireless channel could not deliver a frame.
    Transport(TransportError),
    /// A persisted file could not be read or written.
    Storage(StorageError),
    /// The configuration file was unreadable or out of range.
    Config(ConfigError),
    /// The wall clock rejected a read or a set.
    Clock(ClockError),
    /// Reboot or deep sleep could not be carried out.
    System(SystemError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Protocol(e) => write!(f, "protocol: {e}"),
            Self::Device(e) => write!(f, "device: {e}"),
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Clock(e) => write!(f, "clock: {e}"),
            Self::System(e) => write!(f, "system: {e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Protocol errors
// ---------------------------------------------------------------------------

/// Malformed input from the radio or from a persisted text file.
/// Always recovered locally: the decoder resets the affected buffer and
/// answers with an `ERROR:` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// Schedule line without the `" at "` separator.
    MissingSeparator,
    /// Device command is empty or not of the `/…R` form.
    InvalidCommand,
    /// Timestamp text could not be split into numeric fields.
    InvalidTimestamp,
    /// A timestamp field is outside its calendar range.
    FieldOutOfRange,
    /// `T:` payload is not exactly 14 digits.
    InvalidCompactTime,
    /// Fragment count in `SEND_CMD_START` is missing, zero or not a number.
    InvalidFragmentCount,
    /// `SEND_CMD_PART` arrived without a preceding `SEND_CMD_START`.
    NoUploadInProgress,
    /// `SEND_CMD_PART` index is not a number or not below the expected count.
    InvalidFragmentIndex,
    /// `DATA:` payload is neither a command, a date nor a time.
    UnrecognizedData,
    /// Arguments of a direct command could not be parsed.
    InvalidArguments,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSeparator => write!(f, "missing ' at ' separator"),
            Self::InvalidCommand => write!(f, "command must start with '/' and end with 'R'"),
            Self::InvalidTimestamp => write!(f, "invalid timestamp"),
            Self::FieldOutOfRange => write!(f, "date/time field out of range"),
            Self::InvalidCompactTime => write!(f, "expected 14 digits YYYYMMDDHHMMSS"),
            Self::InvalidFragmentCount => write!(f, "invalid fragment count"),
            Self::NoUploadInProgress => write!(f, "no command upload in progress"),
            Self::InvalidFragmentIndex => write!(f, "invalid fragment index"),
            Self::UnrecognizedData => write!(f, "unrecognized data fragment"),
            Self::InvalidArguments => write!(f, "invalid arguments"),
        }
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}

// ---------------------------------------------------------------------------
// Device errors
// ---------------------------------------------------------------------------

/// Failures on the pump/actuator serial links.  Any of these aborts the
/// running sequence; the schedule engine carries on with the next cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    /// The device did not answer before the receive timeout.
    LostComms,
    /// The answer was too short to carry a status byte.
    ShortResponse(usize),
    /// The pump reported a nonzero error code.
    Fault(u8),
    /// Poll-until-ready exhausted its timeout without a ready status.
    Timeout,
    /// Emergency stop was observed at a checkpoint.
    Aborted,
    /// Command prefix matches neither the pump nor the actuator.
    Unroutable,
    /// The underlying UART write or read failed.
    Link,
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LostComms => write!(f, "lost communication"),
            Self::ShortResponse(n) => write!(f, "short response ({n} bytes)"),
            Self::Fault(code) => write!(
                f,
                "device fault {code}: {}",
                crate::drivers::status::error_description(*code)
            ),
            Self::Timeout => write!(f, "timed out waiting for ready"),
            Self::Aborted => write!(f, "aborted by emergency stop"),
            Self::Unroutable => write!(f, "no device channel for command"),
            Self::Link => write!(f, "serial link failure"),
        }
    }
}

impl From<DeviceError> for Error {
    fn from(e: DeviceError) -> Self {
        Self::Device(e)
    }
}

// ---------------------------------------------------------------------------
// Port error conversions
// ---------------------------------------------------------------------------

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<ClockError> for Error {
    fn from(e: ClockError) -> Self {
        Self::Clock(e)
    }
}

impl From<SystemError> for Error {
    fn from(e: SystemError) -> Self {
        Self::System(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
