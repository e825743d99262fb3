//! Mock hardware rig for integration tests.
//!
//! Wires the host simulations from `autosampler::adapters` together with
//! a few recording mocks (messages, relay, files, clock) so tests can
//! drive the decoder, the sequencer and the schedule engine end to end
//! and assert on everything that left the device.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use autosampler::adapters::clock::{from_epoch_seconds, to_epoch_seconds};
use autosampler::adapters::power::SupplyMonitor;
use autosampler::adapters::system::SystemControl;
use autosampler::adapters::uart::SimDeviceLink;
use autosampler::adapters::wifi::FileService;
use autosampler::app::ports::{
    ClockError, ClockPort, FileStore, MessagePort, Ports, RelayPort, StorageError, TimePort,
    TransportError,
};
use autosampler::app::state::OrchestratorState;
use autosampler::config::SystemConfig;
use autosampler::drivers::{DeviceDriver, LinkSettings};
use autosampler::schedule::time::Timestamp;

/// Pump reply with the ready bit clear and no error.
pub const BUSY_FRAME: [u8; 7] = [0xFF, 0x2F, 0x30, 0x40, 0x03, 0x0D, 0x0A];

// ── Clock ─────────────────────────────────────────────────────

/// Simulated wall clock and monotonic timer.  Time only moves when
/// something sleeps.
pub struct SimClock {
    /// Wall-clock epoch seconds at uptime zero.
    epoch: AtomicI64,
    uptime_ms: AtomicU64,
    stop_at: Mutex<Option<(u64, Arc<OrchestratorState>)>>,
}

#[allow(dead_code)]
impl SimClock {
    pub fn at(ts: Timestamp) -> Self {
        Self {
            epoch: AtomicI64::new(to_epoch_seconds(&ts)),
            uptime_ms: AtomicU64::new(0),
            stop_at: Mutex::new(None),
        }
    }

    /// Raise an emergency stop once uptime reaches `ms`.
    pub fn stop_at(&self, ms: u64, state: Arc<OrchestratorState>) {
        *self.stop_at.lock().unwrap() = Some((ms, state));
    }

    pub fn advance_secs(&self, secs: u64) {
        self.sleep_ms((secs * 1000) as u32);
    }
}

impl ClockPort for SimClock {
    fn now(&self) -> Timestamp {
        let secs = self.epoch.load(Ordering::SeqCst)
            + (self.uptime_ms.load(Ordering::SeqCst) / 1000) as i64;
        from_epoch_seconds(secs).unwrap_or_default()
    }

    fn set(&self, ts: Timestamp) -> Result<(), ClockError> {
        if !ts.is_valid() {
            return Err(ClockError::SetFailed);
        }
        let elapsed = (self.uptime_ms.load(Ordering::SeqCst) / 1000) as i64;
        self.epoch.store(to_epoch_seconds(&ts) - elapsed, Ordering::SeqCst);
        Ok(())
    }
}

impl TimePort for SimClock {
    fn uptime_ms(&self) -> u64 {
        self.uptime_ms.load(Ordering::SeqCst)
    }

    fn sleep_ms(&self, ms: u32) {
        let now = self.uptime_ms.fetch_add(u64::from(ms), Ordering::SeqCst) + u64::from(ms);
        if let Some((at, state)) = self.stop_at.lock().unwrap().as_ref() {
            if now >= *at {
                state.faults.request_stop();
            }
        }
    }
}

// ── Messages ──────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingMessenger {
    frames: Mutex<Vec<String>>,
    down: AtomicBool,
    restarts: AtomicU32,
}

#[allow(dead_code)]
impl RecordingMessenger {
    pub fn frames(&self) -> Vec<String> {
        self.frames.lock().unwrap().clone()
    }

    /// Drain everything sent so far.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.frames.lock().unwrap())
    }

    pub fn saw(&self, text: &str) -> bool {
        self.frames.lock().unwrap().iter().any(|f| f == text)
    }

    pub fn saw_prefix(&self, prefix: &str) -> bool {
        self.frames.lock().unwrap().iter().any(|f| f.starts_with(prefix))
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn restarts(&self) -> u32 {
        self.restarts.load(Ordering::SeqCst)
    }
}

impl MessagePort for RecordingMessenger {
    fn send(&self, text: &str) -> Result<(), TransportError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        self.frames.lock().unwrap().push(text.to_string());
        Ok(())
    }

    fn is_active(&self) -> bool {
        !self.down.load(Ordering::SeqCst)
    }

    fn restart(&self) -> Result<(), TransportError> {
        self.restarts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ── Relay ─────────────────────────────────────────────────────

#[derive(Default)]
pub struct MockRelay {
    history: Mutex<Vec<bool>>,
}

#[allow(dead_code)]
impl MockRelay {
    pub fn history(&self) -> Vec<bool> {
        self.history.lock().unwrap().clone()
    }
}

impl RelayPort for MockRelay {
    fn set(&self, on: bool) {
        self.history.lock().unwrap().push(on);
    }

    fn is_on(&self) -> bool {
        self.history.lock().unwrap().last().copied().unwrap_or(false)
    }
}

// ── Files ─────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemFiles {
    files: Mutex<HashMap<String, Vec<String>>>,
}

#[allow(dead_code)]
impl MemFiles {
    pub fn put(&self, name: &str, lines: &[&str]) {
        self.files.lock().unwrap().insert(
            name.to_string(),
            lines.iter().map(|l| l.to_string()).collect(),
        );
    }

    pub fn lines(&self, name: &str) -> Vec<String> {
        self.files.lock().unwrap().get(name).cloned().unwrap_or_default()
    }
}

impl FileStore for MemFiles {
    fn read_lines(&self, name: &str) -> Result<Vec<String>, StorageError> {
        self.files.lock().unwrap().get(name).cloned().ok_or(StorageError::NotFound)
    }

    fn write_lines(&self, name: &str, lines: &[String]) -> Result<(), StorageError> {
        self.files.lock().unwrap().insert(name.to_string(), lines.to_vec());
        Ok(())
    }

    fn append_line(&self, name: &str, line: &str) -> Result<(), StorageError> {
        self.files
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .push(line.to_string());
        Ok(())
    }

    fn truncate(&self, name: &str) -> Result<(), StorageError> {
        self.files.lock().unwrap().insert(name.to_string(), Vec::new());
        Ok(())
    }

    fn exists(&self, name: &str) -> bool {
        self.files.lock().unwrap().contains_key(name)
    }
}

// ── Rig ───────────────────────────────────────────────────────

/// 2025-03-07 10:00:00, the default rig start time.
pub const T0: Timestamp = Timestamp::new(2025, 3, 7, 10, 0, 0);

pub struct Rig {
    pub clock: SimClock,
    pub messages: RecordingMessenger,
    pub relay: MockRelay,
    pub files: MemFiles,
    pub system: SystemControl,
    pub power: SupplyMonitor,
    pub file_service: FileService,
    pub pump: SimDeviceLink,
    pub actuator: SimDeviceLink,
    pub state: Arc<OrchestratorState>,
    pub config: SystemConfig,
}

#[allow(dead_code)]
impl Rig {
    pub fn new() -> Self {
        Self::with_pump_reply(T0, &autosampler::adapters::uart::READY_FRAME)
    }

    pub fn starting_at(ts: Timestamp) -> Self {
        Self::with_pump_reply(ts, &autosampler::adapters::uart::READY_FRAME)
    }

    pub fn with_pump_reply(ts: Timestamp, reply: &[u8]) -> Self {
        Self {
            clock: SimClock::at(ts),
            messages: RecordingMessenger::default(),
            relay: MockRelay::default(),
            files: MemFiles::default(),
            system: SystemControl::new(false),
            power: SupplyMonitor::new(4.8),
            file_service: FileService::new(std::env::temp_dir()),
            pump: SimDeviceLink::with_reply("PUMP", reply),
            actuator: SimDeviceLink::new("ACTUATOR"),
            state: Arc::new(OrchestratorState::new()),
            config: SystemConfig::default(),
        }
    }

    /// Build the device driver and the port bundle, then run `f`.
    pub fn with_ports<R>(&self, f: impl FnOnce(Ports<'_>) -> R) -> R {
        let devices = DeviceDriver::new(
            &self.pump,
            &self.actuator,
            &self.clock,
            &self.clock,
            &self.files,
            &self.state.faults,
            LinkSettings::from(&self.config),
        );
        let ports = Ports {
            clock: &self.clock,
            time: &self.clock,
            messages: &self.messages,
            relay: &self.relay,
            files: &self.files,
            system: &self.system,
            power: &self.power,
            file_service: &self.file_service,
            devices: &devices,
        };
        f(ports)
    }

    /// Commands written to the pump that match `command` exactly.
    pub fn pump_count(&self, command: &str) -> usize {
        self.pump.commands().iter().filter(|c| *c == command).count()
    }
}
