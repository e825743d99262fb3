//! Sequencer and device driver against simulated controllers.

use std::sync::Arc;

use autosampler::app::ports::TimePort;
use autosampler::config::PollPlan;
use autosampler::drivers::pump::PUMP_STROKE;
use autosampler::error::{DeviceError, Error};
use autosampler::sequencer::Sequencer;

use crate::mock_hw::{BUSY_FRAME, Rig, T0};

fn execute(rig: &Rig, command: &str) -> Result<(), Error> {
    rig.with_ports(|ports| Sequencer::new(ports, &rig.state.faults, &rig.config).execute(command))
}

// ── QA-S1: template handling ──────────────────────────────────

#[test]
fn builtin_template_strokes() {
    let rig = Rig::new();
    execute(&rig, "/2O03R").unwrap();
    // 2 rinse strokes + 12 pump strokes.
    assert_eq!(rig.pump_count(PUMP_STROKE), 14);
    assert_eq!(rig.pump_count("/1ZWR"), 1);
    assert!(rig.messages.saw("Sequence complete"));
}

#[test]
fn pump_cycles_are_clamped_with_one_warning() {
    let rig = Rig::new();
    rig.files.put("sequence.txt", &["PUMP 20"]);
    execute(&rig, "/2O03R").unwrap();

    assert_eq!(rig.pump_count(PUMP_STROKE), 15);
    let warnings: Vec<_> = rig
        .messages
        .frames()
        .into_iter()
        .filter(|f| f.starts_with("WARNING:"))
        .collect();
    assert_eq!(warnings, vec!["WARNING: PUMP 20 clamped to 15 cycles"]);
}

#[test]
fn oversized_config_cap_still_stops_at_fifteen() {
    let mut rig = Rig::new();
    rig.config.max_pump_cycles = 40;
    rig.files.put("sequence.txt", &["PUMP 30"]);
    execute(&rig, "/2O03R").unwrap();

    assert_eq!(rig.pump_count(PUMP_STROKE), 15);
    assert!(rig.messages.saw("WARNING: PUMP 30 clamped to 15 cycles"));
}

#[test]
fn lower_config_cap_is_honoured() {
    let mut rig = Rig::new();
    rig.config.max_pump_cycles = 4;
    rig.files.put("sequence.txt", &["PUMP 6"]);
    execute(&rig, "/2O03R").unwrap();

    assert_eq!(rig.pump_count(PUMP_STROKE), 4);
    assert!(rig.messages.saw("WARNING: PUMP 6 clamped to 4 cycles"));
}

#[test]
fn repeated_command_steps_close_each_log_entry() {
    let rig = Rig::new();
    rig.files.put("sequence.txt", &["{COMMAND}", "RINSE 0", "{COMMAND}"]);
    execute(&rig, "/2O04R").unwrap();

    let phases: Vec<String> = rig
        .files
        .lines("log.txt")
        .iter()
        .map(|l| l.rsplit("Status: ").next().unwrap_or_default().to_string())
        .collect();
    assert_eq!(phases, vec!["Start", "End", "Start", "End"]);
    assert_eq!(rig.pump_count(PUMP_STROKE), 0);
}

#[test]
fn pump_log_is_truncated_per_run() {
    let rig = Rig::new();
    rig.files.put("pump_log.txt", &["stale line"]);
    execute(&rig, "/2O02R").unwrap();
    let log = rig.files.lines("pump_log.txt");
    assert!(log[0].ends_with("| sequence start: /2O02R"));
    assert!(log.last().unwrap().ends_with("| sequence complete"));
    assert!(!log.iter().any(|l| l == "stale line"));
}

// ── QA-S2: failures and emergency stop ────────────────────────

#[test]
fn emergency_stop_during_poll_aborts_and_releases_relay() {
    let rig = Rig::with_pump_reply(T0, &BUSY_FRAME);
    rig.clock.stop_at(1_000, Arc::clone(&rig.state));

    let result = execute(&rig, "/2O03R");
    assert_eq!(result, Err(Error::Device(DeviceError::Aborted)));
    assert_eq!(rig.relay.history(), vec![true, false]);
    assert!(rig
        .messages
        .saw("ERROR:SEQUENCE device: aborted by emergency stop"));
    // Never got past the prelude.
    assert!(!rig.actuator.commands().contains(&"/2O03R".to_string()));
}

#[test]
fn stop_before_start_leaves_relay_untouched() {
    let rig = Rig::new();
    rig.state.faults.request_stop();
    assert_eq!(
        execute(&rig, "/2O03R"),
        Err(Error::Device(DeviceError::Aborted))
    );
    assert!(rig.relay.history().is_empty());
    assert!(rig.pump.commands().is_empty());
}

#[test]
fn busy_pump_times_out() {
    let rig = Rig::with_pump_reply(T0, &BUSY_FRAME);
    assert_eq!(
        execute(&rig, "/2O03R"),
        Err(Error::Device(DeviceError::Timeout))
    );
    assert_eq!(rig.relay.history(), vec![true, false]);
    assert!(rig
        .files
        .lines("pump_log.txt")
        .iter()
        .any(|l| l.contains("poll timeout")));
}

#[test]
fn busy_poll_runs_until_the_deadline() {
    let rig = Rig::with_pump_reply(T0, &BUSY_FRAME);
    let result = rig.with_ports(|ports| ports.devices.poll_until_ready(PollPlan::new(45_000, 5_000)));
    assert_eq!(result, Err(DeviceError::Timeout));

    // Polls at 0 s, 5 s, ... 45 s.
    let polls = rig
        .files
        .lines("pump_log.txt")
        .iter()
        .filter(|l| l.contains("| poll ") && !l.contains("timeout"))
        .count();
    assert_eq!(polls, 10);
    assert_eq!(rig.clock.uptime_ms(), 45_000);
}

#[test]
fn uneven_interval_still_polls_at_deadline() {
    let rig = Rig::with_pump_reply(T0, &BUSY_FRAME);
    let result = rig.with_ports(|ports| ports.devices.poll_until_ready(PollPlan::new(15_000, 2_000)));
    assert_eq!(result, Err(DeviceError::Timeout));
    assert_eq!(rig.clock.uptime_ms(), 15_000);
    assert!(rig
        .files
        .lines("pump_log.txt")
        .iter()
        .any(|l| l.contains("poll timeout after 15s")));
}

#[test]
fn pump_fault_code_aborts() {
    // Ready bit set with error 9.
    let rig = Rig::with_pump_reply(T0, &[0xFF, 0x2F, 0x30, 0x69, 0x03, 0x0D, 0x0A]);
    assert_eq!(
        execute(&rig, "/2O03R"),
        Err(Error::Device(DeviceError::Fault(9)))
    );
    assert!(rig.messages.saw_prefix("ERROR:SEQUENCE device: device fault 9: Piston Overload"));
}

#[test]
fn silent_pump_times_out_after_retries() {
    let rig = Rig::with_pump_reply(T0, &[]);
    assert_eq!(
        execute(&rig, "/2O03R"),
        Err(Error::Device(DeviceError::Timeout))
    );
    let polls = rig
        .files
        .lines("pump_log.txt")
        .iter()
        .filter(|l| l.contains("lost communication"))
        .count();
    assert!(polls > 1, "expected repeated polls, got {polls}");
}

// ── QA-S3: frame audit ────────────────────────────────────────

#[test]
fn frame_audit_logs_mismatches() {
    let mut rig = Rig::new();
    rig.config.frame_audit = true;
    rig.files.put("sequence.txt", &["PUMP 1"]);
    execute(&rig, "/2O03R").unwrap();

    let audit: Vec<String> = rig
        .files
        .lines("pump_log.txt")
        .into_iter()
        .filter(|l| l.contains("cycle 1 | "))
        .collect();
    assert_eq!(audit.len(), 1);
    assert!(audit[0].contains("MISMATCH | TX /1J0S14A0A7640J1M500S14A0M500J0R"));
    assert!(audit[0].contains("expected [FF 2F 30 40 03 0D 0A]"));
}
