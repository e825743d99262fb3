//! Wireless command decoder.
//!
//! Consumes one inbound frame at a time and answers with zero or more
//! status frames through [`Ports::notify`].  The decoder never fails to
//! its caller: a bad frame resets the affected upload buffer and produces
//! an `ERROR:` frame.
//!
//! ```text
//!   FrameInbox ──▶ CommandDecoder::handle_frame ──▶ InboundCommand::parse
//!                          │
//!                          ├─▶ ScheduleUpload / CommandUpload
//!                          ├─▶ OrchestratorState (flags, schedule swap)
//!                          └─▶ DeviceDriver::dispatch (write only)
//! ```

pub mod command;
pub mod upload;

use log::{debug, info, warn};
use serde::Serialize;

use crate::app::ports::{FileServiceStatus, Ports, StorageError};
use crate::app::state::OrchestratorState;
use crate::config::SystemConfig;
use crate::events::FrameInbox;
use crate::schedule::Schedule;
use crate::schedule::time::Timestamp;
use crate::sequencer::template::Template;
use command::{InboundCommand, RelayAction};
use upload::{CommandUpload, Fragment, ScheduleUpload};

/// JSON body of the `wifi_*` replies.
#[derive(Serialize)]
struct WifiReply<'a> {
    wifi: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<&'a FileServiceStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

pub struct CommandDecoder<'a> {
    ports: Ports<'a>,
    state: &'a OrchestratorState,
    config: &'a SystemConfig,
    schedule_upload: ScheduleUpload,
    command_upload: CommandUpload,
}

impl<'a> CommandDecoder<'a> {
    pub fn new(ports: Ports<'a>, state: &'a OrchestratorState, config: &'a SystemConfig) -> Self {
        Self {
            ports,
            state,
            config,
            schedule_upload: ScheduleUpload::default(),
            command_upload: CommandUpload::default(),
        }
    }

    /// Drain `inbox` forever, one frame at a time.
    pub fn run(&mut self, inbox: &FrameInbox) -> ! {
        info!("Decoder: waiting for frames");
        loop {
            let frame = inbox.recv();
            self.report_dropped(inbox);
            self.handle_frame(&frame);
        }
    }

    /// Tell the operator about frames the radio side had to drop.
    pub fn report_dropped(&self, inbox: &FrameInbox) {
        let dropped = inbox.take_dropped();
        if dropped > 0 {
            self.reply(&format!("ERROR:BUSY {dropped} frames dropped"));
        }
    }

    pub fn handle_frame(&mut self, bytes: &[u8]) {
        let decoded = String::from_utf8_lossy(bytes);
        let text = decoded.trim();
        if text.is_empty() {
            return;
        }
        info!("RX: {}", text);

        match InboundCommand::parse(text) {
            InboundCommand::GetLog => self.stream_log(),
            InboundCommand::ClearLog => self.clear_log(),
            InboundCommand::BeginSchedule => self.begin_schedule(),
            InboundCommand::EndSchedule => self.end_schedule(),
            InboundCommand::Data(payload) => self.data_fragment(payload),
            InboundCommand::ManualStart => {
                self.state.faults.request_start();
                self.reply("ACK:MANUAL_START");
            }
            InboundCommand::EmergencyStop => {
                self.state.faults.request_stop();
                self.reply("ACK:EMERGENCY_STOP");
            }
            InboundCommand::Reset => {
                self.reply("ACK:RESET");
                self.ports.time.sleep_ms(self.config.reset_flush_ms);
                self.ports.system.reboot();
            }
            InboundCommand::Shutdown => {
                self.reply("ACK:SHUTDOWN");
                self.ports.time.sleep_ms(self.config.reset_flush_ms);
                if let Err(e) = self.ports.system.deep_sleep() {
                    warn!("Deep sleep failed ({}), rebooting instead", e);
                    self.ports.system.reboot();
                }
            }
            InboundCommand::SetTime(ts) => self.set_time(ts),
            InboundCommand::Relay(action) => self.relay(action),
            InboundCommand::ReadSchedule => self.read_schedule(),
            InboundCommand::ReadSequence => {
                let t = Template::load(self.ports.files, &self.config.sequence_file);
                self.reply(&format!(
                    "SEQUENCE_CONFIG: RINSE {}, PUMP_CYCLES {}",
                    t.rinse_count(),
                    t.pump_cycles()
                ));
            }
            InboundCommand::UpdateSequence { rinse, pump_cycles } => {
                self.update_sequence(rinse, pump_cycles);
            }
            InboundCommand::WifiOn {
                ssid,
                password,
                port,
            } => self.wifi_on(ssid, password, port),
            InboundCommand::WifiOff => self.wifi_off(),
            InboundCommand::WifiStatus => self.wifi_status(),
            InboundCommand::SendCmdStart(n) => self.begin_command_upload(n),
            InboundCommand::SendCmdPart { index, payload } => self.command_part(index, payload),
            InboundCommand::SendCmd(cmd) => match self.ports.devices.dispatch(cmd) {
                Ok(channel) => self.reply(&format!("ACK:SEND_CMD {} {}", channel.name(), cmd)),
                Err(e) => self.reply(&format!("ERROR:SEND_CMD {e}")),
            },
            InboundCommand::Malformed { command, error } => {
                if command.starts_with("SEND_CMD_") {
                    self.command_upload.abort();
                }
                self.reply(&format!("ERROR:{command} {error}"));
            }
            InboundCommand::Other(raw) => {
                if self.schedule_upload.is_active() {
                    self.legacy_text(raw);
                } else {
                    debug!("Ignoring unrecognised frame: {}", raw);
                }
            }
        }
    }

    fn reply(&self, text: &str) {
        self.ports.notify(text);
    }

    fn pace(&self) {
        self.ports.time.sleep_ms(self.config.stream_pacing_ms);
    }

    // ── Logs ──────────────────────────────────────────────────

    fn stream_log(&self) {
        match self.ports.files.read_lines(&self.config.operation_log_file) {
            Ok(lines) => {
                for line in lines.iter().filter(|l| !l.trim().is_empty()) {
                    self.reply(&format!("[LOG]{}", line.trim()));
                    self.pace();
                }
            }
            Err(e) => {
                info!("Operation log unavailable: {}", e);
                self.reply("[LOG]No log entries found");
            }
        }
        self.reply("LOG_END");
    }

    fn clear_log(&self) {
        match self.ports.files.truncate(&self.config.operation_log_file) {
            Ok(()) => self.reply("LOG_CLEARED"),
            Err(e) => self.reply(&format!("ERROR:CLEARLOG {e}")),
        }
    }

    // ── Schedule upload ───────────────────────────────────────

    fn begin_schedule(&mut self) {
        if self.command_upload.is_active() {
            warn!("Schedule upload started, abandoning command upload");
            self.command_upload.abort();
        }
        self.schedule_upload.begin();
        self.reply("ACK:SCHEDULE_START");
    }

    fn data_fragment(&mut self, payload: &str) {
        if !self.schedule_upload.is_active() {
            warn!("DATA outside a schedule upload: {}", payload);
            return;
        }
        match self.schedule_upload.push_fragment(payload) {
            Ok(outcome) => {
                let ack = match outcome.kind {
                    Fragment::Command => "ACK:CMD_RECEIVED",
                    Fragment::Date => "ACK:DATE_RECEIVED",
                    Fragment::Time => "ACK:TIME_RECEIVED",
                };
                self.reply(&format!("{ack} {payload}"));
                if let Some(n) = outcome.built {
                    self.reply(&format!("ACK:ENTRY_BUILT {n}"));
                }
            }
            Err(_) => self.reply(&format!("ERROR:DATA_UNRECOGNIZED {payload}")),
        }
    }

    fn legacy_text(&mut self, raw: &str) {
        let before = self.schedule_upload.lines().len();
        let added = self.schedule_upload.push_legacy(raw);
        for (i, line) in added.iter().enumerate() {
            debug!("Legacy line: {}", line);
            self.reply(&format!("ACK:LINE_ADDED {}", before + i + 1));
        }
    }

    fn end_schedule(&mut self) {
        let was_active = self.schedule_upload.is_active();
        let lines = self.schedule_upload.finish();
        self.reply(&format!("ACK:SCHEDULE_COMPLETE {}", lines.len()));
        // Nothing received: the stored schedule stays as it is.
        if lines.is_empty() {
            if !was_active {
                warn!("END_SCHEDULE without an upload in progress");
            }
            return;
        }

        let schedule = Schedule::from_lines(&lines);
        let file = &self.config.schedule_file;
        if let Err(e) = schedule.save(self.ports.files, file) {
            self.reply(&format!("ERROR:SCHEDULE_SAVE {e}"));
            return;
        }
        self.reply(&format!("ACK:SCHEDULE_SAVED {}", schedule.len()));

        match Schedule::load(self.ports.files, file) {
            Ok(loaded) => {
                let n = loaded.len();
                self.state.schedule.replace(loaded);
                self.reply(&format!("ACK:SCHEDULE_RELOADED {n}"));
            }
            Err(e) => self.reply(&format!("ERROR:SCHEDULE_RELOAD {e}")),
        }
    }

    fn read_schedule(&self) {
        let lines = match self.ports.files.read_lines(&self.config.schedule_file) {
            Ok(lines) => lines,
            Err(StorageError::NotFound) => Vec::new(),
            Err(e) => {
                self.reply(&format!("ERROR:READ_SCHEDULE {e}"));
                return;
            }
        };
        let mut sent = 0;
        for line in lines.iter().map(|l| l.trim()).filter(|l| !l.is_empty()) {
            self.reply(&format!("[FILE]{line}"));
            self.pace();
            sent += 1;
        }
        self.reply(&format!("ACK:READ_SCHEDULE {sent}"));
    }

    // ── Command upload ────────────────────────────────────────

    fn begin_command_upload(&mut self, expected: usize) {
        if self.schedule_upload.is_active() {
            warn!("Command upload started, abandoning schedule upload");
            self.schedule_upload.abort();
        }
        self.command_upload.begin(expected);
        self.reply(&format!("ACK:SEND_CMD_START {expected}"));
    }

    fn command_part(&mut self, index: usize, payload: &str) {
        let have = match self.command_upload.insert(index, payload) {
            Ok(have) => have,
            Err(e) => {
                self.command_upload.abort();
                self.reply(&format!("ERROR:SEND_CMD_PART {e}"));
                return;
            }
        };
        let expected = self.command_upload.expected();
        self.reply(&format!("ACK:SEND_CMD_PART {index} {have}/{expected}"));

        if let Some(cmd) = self.command_upload.take_assembled() {
            info!("Command upload assembled: {}", cmd);
            match self.ports.devices.dispatch(&cmd) {
                Ok(channel) => self.reply(&format!(
                    "ACK:SEND_CMD_DISPATCHED {} {}",
                    channel.name(),
                    cmd
                )),
                Err(e) => self.reply(&format!("ERROR:SEND_CMD {e}")),
            }
        }
    }

    // ── Direct control ────────────────────────────────────────

    fn set_time(&self, ts: Timestamp) {
        match self.ports.clock.set(ts) {
            Ok(()) => self.reply(&format!("ACK:TIME_SET {ts}")),
            Err(e) => self.reply(&format!("ERROR:TIME_SET {e}")),
        }
    }

    fn relay(&self, action: RelayAction) {
        match action {
            RelayAction::On => {
                self.ports.relay.set(true);
                self.reply("ACK:RELAY_ON");
            }
            RelayAction::Off => {
                self.ports.relay.set(false);
                self.reply("ACK:RELAY_OFF");
            }
            RelayAction::Status => {
                let state = if self.ports.relay.is_on() { "ON" } else { "OFF" };
                self.reply(&format!("RELAY_STATUS:{state}"));
            }
        }
    }

    fn update_sequence(&self, rinse: u32, pump_cycles: u32) {
        let template = Template::with_counts(rinse, pump_cycles);
        match template.save(self.ports.files, &self.config.sequence_file) {
            Ok(()) => self.reply(&format!(
                "ACK:SEQUENCE_UPDATED RINSE {rinse}, PUMP_CYCLES {pump_cycles}"
            )),
            Err(e) => self.reply(&format!("ERROR:UPDATE_SEQUENCE {e}")),
        }
    }

    // ── File service ──────────────────────────────────────────

    fn wifi_reply(&self, wifi: &str, status: Option<&FileServiceStatus>, error: Option<&str>) {
        let body = WifiReply {
            wifi,
            status,
            error,
        };
        match serde_json::to_string(&body) {
            Ok(json) => self.reply(&json),
            Err(e) => warn!("wifi reply encode failed: {}", e),
        }
    }

    fn wifi_on(&self, ssid: Option<&str>, password: Option<&str>, port: Option<u16>) {
        if self.state.file_service().is_some() {
            let status = self.ports.file_service.status();
            self.wifi_reply("on", Some(&status), Some("already running"));
            return;
        }
        let ssid = ssid.unwrap_or(&self.config.file_service_ssid);
        let password = password.unwrap_or(&self.config.file_service_password);
        let port = port.unwrap_or(self.config.file_service_port);

        match self.ports.file_service.start(ssid, password, port) {
            Ok(handle) => {
                info!("File service up: {} port {}", handle.ssid, handle.port);
                self.state.set_file_service(Some(handle));
                let status = self.ports.file_service.status();
                self.wifi_reply("on", Some(&status), None);
            }
            Err(e) => {
                let reason = e.to_string();
                self.wifi_reply("off", None, Some(&reason));
            }
        }
    }

    fn wifi_off(&self) {
        if let Some(handle) = self.state.file_service() {
            self.ports.file_service.stop(&handle);
            self.state.set_file_service(None);
            info!("File service stopped");
        }
        self.wifi_reply("off", None, None);
    }

    fn wifi_status(&self) {
        if self.state.file_service().is_some() {
            let status = self.ports.file_service.status();
            self.wifi_reply("on", Some(&status), None);
        } else {
            self.wifi_reply("off", None, None);
        }
    }
}
