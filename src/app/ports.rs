//! Port traits: the seams between orchestration logic and the hardware.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Decoder / Engine / Sequencer (domain)
//! ```
//!
//! Driven adapters (radio, UARTs, relay, RTC, files, power rail) implement
//! these traits.  The domain receives them as `&dyn` references bundled in
//! [`Ports`], so it never touches hardware directly.
//!
//! Every port takes `&self`: the radio callback thread and the scheduler
//! thread share the same adapters, so implementations use interior
//! mutability and must be `Send + Sync`.

use core::fmt;

use log::{info, warn};

use crate::drivers::DeviceDriver;
use crate::schedule::time::Timestamp;

// ───────────────────────────────────────────────────────────────
// Clock and time ports
// ───────────────────────────────────────────────────────────────

/// Wall-clock oracle.  The firmware never synchronises time itself; it
/// only reads the RTC and lets the operator set it with `T:`.
pub trait ClockPort: Send + Sync {
    fn now(&self) -> Timestamp;
    fn set(&self, ts: Timestamp) -> Result<(), ClockError>;
}

/// Monotonic time and blocking sleeps.  Every wait in the engine, the
/// sequencer and the device driver goes through this port.
pub trait TimePort: Send + Sync {
    fn uptime_ms(&self) -> u64;
    fn sleep_ms(&self, ms: u32);
}

// ───────────────────────────────────────────────────────────────
// Message channel (driven adapter: domain → radio)
// ───────────────────────────────────────────────────────────────

/// Outbound text frames to the operator.
pub trait MessagePort: Send + Sync {
    fn send(&self, text: &str) -> Result<(), TransportError>;
    /// Whether the radio stack is up (advertising or connected).
    fn is_active(&self) -> bool;
    /// Tear down and bring the radio back up.
    fn restart(&self) -> Result<(), TransportError>;
}

// ───────────────────────────────────────────────────────────────
// Device link (driven adapter: domain ↔ UART)
// ───────────────────────────────────────────────────────────────

/// One full-duplex serial link to a pump or valve controller.
pub trait DeviceLink: Send + Sync {
    fn write(&self, bytes: &[u8]) -> Result<(), crate::error::DeviceError>;
    /// Read one byte, waiting at most `timeout_ms`.  `Ok(None)` on timeout.
    fn read_byte(&self, timeout_ms: u32) -> Result<Option<u8>, crate::error::DeviceError>;
    /// Discard anything already buffered.
    fn clear_input(&self);
}

// ───────────────────────────────────────────────────────────────
// Relay
// ───────────────────────────────────────────────────────────────

/// Power relay feeding the pump and valve controllers.
pub trait RelayPort: Send + Sync {
    fn set(&self, on: bool);
    fn is_on(&self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// File store (driven adapter: domain ↔ flash filesystem)
// ───────────────────────────────────────────────────────────────

/// Line-oriented text persistence.
///
/// Implementations strip line terminators on read and add `\n` on write.
pub trait FileStore: Send + Sync {
    fn read_lines(&self, name: &str) -> Result<Vec<String>, StorageError>;
    /// Replace the file with `lines`.
    fn write_lines(&self, name: &str, lines: &[String]) -> Result<(), StorageError>;
    fn append_line(&self, name: &str, line: &str) -> Result<(), StorageError>;
    /// Create or empty the file.
    fn truncate(&self, name: &str) -> Result<(), StorageError>;
    fn exists(&self, name: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// System control, power telemetry, file service
// ───────────────────────────────────────────────────────────────

pub trait SystemPort: Send + Sync {
    /// Restart the processor.  Does not return on hardware.
    fn reboot(&self);
    /// Enter deep sleep.  Returns an error where unsupported.
    fn deep_sleep(&self) -> Result<(), SystemError>;
}

pub trait PowerPort: Send + Sync {
    /// Supply rail voltage in volts, `None` when unreadable.
    fn supply_voltage(&self) -> Option<f32>;
}

/// Identity of a running file-transfer service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileServiceHandle {
    pub ssid: heapless::String<32>,
    pub port: u16,
}

/// Snapshot reported by `wifi_status`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FileServiceStatus {
    pub ip: heapless::String<16>,
    pub port: u16,
    pub ssid: heapless::String<32>,
    pub ap_active: bool,
}

/// Background Wi-Fi access point serving the data partition over HTTP.
pub trait FileServicePort: Send + Sync {
    fn start(&self, ssid: &str, password: &str, port: u16)
    -> Result<FileServiceHandle, FileServiceError>;
    fn status(&self) -> FileServiceStatus;
    fn stop(&self, handle: &FileServiceHandle);
}

// ───────────────────────────────────────────────────────────────
// Port bundle
// ───────────────────────────────────────────────────────────────

/// Every collaborator the domain needs, passed around by value.
#[derive(Clone, Copy)]
pub struct Ports<'a> {
    pub clock: &'a dyn ClockPort,
    pub time: &'a dyn TimePort,
    pub messages: &'a dyn MessagePort,
    pub relay: &'a dyn RelayPort,
    pub files: &'a dyn FileStore,
    pub system: &'a dyn SystemPort,
    pub power: &'a dyn PowerPort,
    pub file_service: &'a dyn FileServicePort,
    pub devices: &'a DeviceDriver<'a>,
}

impl Ports<'_> {
    /// Send a status frame, mirrored into the log.  Transport failures are
    /// logged and swallowed.
    pub fn notify(&self, text: &str) {
        info!("» {}", text);
        if let Err(e) = self.messages.send(text) {
            warn!("Radio send failed ({}): {}", e, text);
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`FileStore`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested file does not exist.
    NotFound,
    /// Partition is full.
    Full,
    /// Generic I/O error.
    IoError,
}

/// Errors from [`MessagePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// No central is connected.
    NotConnected,
    /// The stack rejected the notification.
    SendFailed,
    /// Radio bring-up failed.
    InitFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockError {
    /// The RTC rejected the new time.
    SetFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemError {
    /// The platform cannot enter deep sleep.
    Unsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileServiceError {
    AlreadyRunning,
    InvalidCredentials,
    StartFailed,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "file not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "no central connected"),
            Self::SendFailed => write!(f, "notify failed"),
            Self::InitFailed => write!(f, "radio init failed"),
        }
    }
}

impl fmt::Display for ClockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetFailed => write!(f, "failed to set clock"),
        }
    }
}

impl fmt::Display for SystemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported => write!(f, "deep sleep unsupported"),
        }
    }
}

impl fmt::Display for FileServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyRunning => write!(f, "file service already running"),
            Self::InvalidCredentials => write!(f, "SSID 1-32 chars, password empty or 8-64 chars"),
            Self::StartFailed => write!(f, "access point start failed"),
        }
    }
}
