//! System configuration parameters
//!
//! All tunable parameters for the autosampler.  Compiled-in defaults match
//! the instrument's field settings; an optional `config.json` on the data
//! partition overrides any subset of them at boot.

use core::fmt;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::app::ports::{FileStore, StorageError};

/// Name of the optional override file, read through the [`FileStore`].
pub const CONFIG_FILE: &str = "config.json";

/// Most strokes a single PUMP step may run.  Config can only lower it.
pub const PUMP_CYCLE_LIMIT: u8 = 15;

/// Timeout/interval pair for a poll-until-ready phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPlan {
    pub timeout_ms: u32,
    pub interval_ms: u32,
}

impl PollPlan {
    pub const fn new(timeout_ms: u32, interval_ms: u32) -> Self {
        Self {
            timeout_ms,
            interval_ms,
        }
    }
}

/// Core system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    // --- Files ---
    /// Primary persisted schedule
    pub schedule_file: heapless::String<32>,
    /// Fallback schedule used when the primary is missing or empty
    pub default_schedule_file: heapless::String<32>,
    /// Step template for the sequencer
    pub sequence_file: heapless::String<32>,
    /// Operational log (`GETLOG` / `CLEARLOG`)
    pub operation_log_file: heapless::String<32>,
    /// Pump diagnostic log, truncated at the start of every run
    pub pump_log_file: heapless::String<32>,

    // --- Schedule engine ---
    /// Tolerance after a job's start during which it still runs (seconds)
    pub grace_window_secs: u32,
    /// WaitForStart / CompletedWaitingForNext poll period (milliseconds)
    pub wait_tick_ms: u32,
    /// Heartbeat and radio-check period while waiting to start (milliseconds)
    pub idle_heartbeat_ms: u32,
    /// Heartbeat period between jobs of a running schedule (milliseconds)
    pub run_heartbeat_ms: u32,
    /// Minimum supply voltage before the radio may be restarted (volts)
    pub min_radio_voltage: f32,

    // --- Sequencer ---
    /// Settle delay after a COMMAND step (milliseconds)
    pub settle_ms: u32,
    /// Cap on PUMP step repetitions, at most [`PUMP_CYCLE_LIMIT`]
    pub max_pump_cycles: u8,
    /// Startup poll after homing the valves and initialising the pump
    pub init_poll: PollPlan,
    /// Poll after each rinse stroke
    pub rinse_poll: PollPlan,
    /// Poll after each pump stroke
    pub pump_poll: PollPlan,
    /// Cross-check every pump stroke reply against the expected frame
    pub frame_audit: bool,

    // --- Device links ---
    /// Per-transaction receive timeout (milliseconds)
    pub receive_timeout_ms: u32,
    /// Receive buffer cap (bytes)
    pub max_response_bytes: u8,

    // --- Decoder ---
    /// Pause between streamed `[LOG]`/`[FILE]` lines (milliseconds)
    pub stream_pacing_ms: u32,
    /// Delay between the RESET/SHUTDOWN ack and acting on it (milliseconds)
    pub reset_flush_ms: u32,

    // --- File service ---
    pub file_service_ssid: heapless::String<32>,
    pub file_service_password: heapless::String<64>,
    pub file_service_port: u16,
}

fn name<const N: usize>(s: &str) -> heapless::String<N> {
    let mut out = heapless::String::new();
    // Every compiled-in name fits its capacity.
    let _ = out.push_str(s);
    out
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            // Files
            schedule_file: name("schedule.txt"),
            default_schedule_file: name("default_schedule.txt"),
            sequence_file: name("sequence.txt"),
            operation_log_file: name("log.txt"),
            pump_log_file: name("pump_log.txt"),

            // Schedule engine
            grace_window_secs: 10,
            wait_tick_ms: 5_000,
            idle_heartbeat_ms: 10_000,
            run_heartbeat_ms: 5_000,
            min_radio_voltage: 3.6,

            // Sequencer
            settle_ms: 4_000,
            max_pump_cycles: PUMP_CYCLE_LIMIT,
            init_poll: PollPlan::new(15_000, 2_000),
            rinse_poll: PollPlan::new(40_000, 5_000),
            pump_poll: PollPlan::new(45_000, 5_000),
            frame_audit: false,

            // Device links
            receive_timeout_ms: 2_000,
            max_response_bytes: 64,

            // Decoder
            stream_pacing_ms: 50,
            reset_flush_ms: 200,

            // File service
            file_service_ssid: name("Autosampler"),
            file_service_password: name("autosampler"),
            file_service_port: 80,
        }
    }
}

// ---------------------------------------------------------------------------
// Validation and loading
// ---------------------------------------------------------------------------

/// Errors from loading or validating the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// The override file exists but could not be read.
    Storage(StorageError),
    /// The override file is not valid JSON for [`SystemConfig`].
    Corrupted,
    /// A field failed range validation.
    ValidationFailed(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
        }
    }
}

impl SystemConfig {
    /// Reject values that would stall or spin the engine.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for plan in [self.init_poll, self.rinse_poll, self.pump_poll] {
            if plan.interval_ms == 0 || plan.interval_ms > plan.timeout_ms {
                return Err(ConfigError::ValidationFailed(
                    "poll interval must be nonzero and within its timeout",
                ));
            }
        }
        if self.wait_tick_ms == 0 || self.idle_heartbeat_ms == 0 || self.run_heartbeat_ms == 0 {
            return Err(ConfigError::ValidationFailed("tick periods must be nonzero"));
        }
        if self.max_pump_cycles == 0 || self.max_pump_cycles > PUMP_CYCLE_LIMIT {
            return Err(ConfigError::ValidationFailed("max_pump_cycles must be 1..=15"));
        }
        if self.receive_timeout_ms == 0 || self.max_response_bytes < 4 {
            return Err(ConfigError::ValidationFailed(
                "receive window must fit a status byte",
            ));
        }
        if !(0.0..=6.0).contains(&self.min_radio_voltage) {
            return Err(ConfigError::ValidationFailed("min_radio_voltage out of range"));
        }
        if self.schedule_file.is_empty() || self.schedule_file == self.default_schedule_file {
            return Err(ConfigError::ValidationFailed(
                "schedule and default schedule files must differ",
            ));
        }
        Ok(())
    }

    /// Parse and validate a JSON override.  Missing fields keep defaults.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text).map_err(|_| ConfigError::Corrupted)?;
        config.validate()?;
        Ok(config)
    }

    /// Load [`CONFIG_FILE`] from the store.  Returns defaults when the file
    /// is absent.
    pub fn load(files: &dyn FileStore) -> Result<Self, ConfigError> {
        if !files.exists(CONFIG_FILE) {
            info!("Config: no {}, using defaults", CONFIG_FILE);
            return Ok(Self::default());
        }
        let lines = files.read_lines(CONFIG_FILE).map_err(ConfigError::Storage)?;
        Self::from_json(&lines.join("\n"))
    }

    /// [`load`](Self::load), falling back to defaults on any error.
    pub fn load_or_default(files: &dyn FileStore) -> Self {
        match Self::load(files) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!("Config load failed ({}), using defaults", e);
                Self::default()
            }
        }
    }
}
