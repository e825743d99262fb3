//! Command decoder against the mock rig: every inbound frame type and the
//! status frames it produces.

use autosampler::app::ports::ClockPort;
use autosampler::protocol::CommandDecoder;
use autosampler::schedule::Schedule;
use autosampler::schedule::time::Timestamp;

use crate::mock_hw::Rig;

/// Feed `frames` through one decoder and return everything it sent.
fn exchange(rig: &Rig, frames: &[&str]) -> Vec<String> {
    rig.with_ports(|ports| {
        let mut decoder = CommandDecoder::new(ports, &rig.state, &rig.config);
        for f in frames {
            decoder.handle_frame(f.as_bytes());
        }
    });
    rig.messages.take()
}

// ── Schedule upload ───────────────────────────────────────────

#[test]
fn data_fragments_in_any_order_build_one_job() {
    let rig = Rig::new();
    let replies = exchange(
        &rig,
        &[
            "CMD:SCHEDULE_FILE",
            "DATA:2025-03-07",
            "DATA:10:30:00",
            "DATA:/2O05R",
            "CMD:END_SCHEDULE",
        ],
    );
    assert_eq!(
        replies,
        vec![
            "ACK:SCHEDULE_START",
            "ACK:DATE_RECEIVED 2025-03-07",
            "ACK:TIME_RECEIVED 10:30:00",
            "ACK:CMD_RECEIVED /2O05R",
            "ACK:ENTRY_BUILT 1",
            "ACK:SCHEDULE_COMPLETE 1",
            "ACK:SCHEDULE_SAVED 1",
            "ACK:SCHEDULE_RELOADED 1",
        ]
    );
    assert_eq!(
        rig.files.lines("schedule.txt"),
        vec!["/2O05R at 2025-03-07 10:30:00"]
    );
    assert_eq!(rig.state.schedule.len(), 1);
}

#[test]
fn unsorted_upload_is_persisted_in_start_order() {
    let rig = Rig::new();
    exchange(
        &rig,
        &[
            "CMD:SCHEDULE_FILE",
            "DATA:/2O03R",
            "DATA:2025-03-07",
            "DATA:12:00:00",
            "DATA:/2O02R",
            "DATA:2025-03-07",
            "DATA:11:00:00",
            "CMD:END_SCHEDULE",
        ],
    );
    assert_eq!(
        rig.files.lines("schedule.txt"),
        vec![
            "/2O02R at 2025-03-07 11:00:00",
            "/2O03R at 2025-03-07 12:00:00",
        ]
    );
}

#[test]
fn unrecognised_fragment_is_reported_and_ignored() {
    let rig = Rig::new();
    let replies = exchange(&rig, &["CMD:SCHEDULE_FILE", "DATA:banana"]);
    assert_eq!(replies.last().unwrap(), "ERROR:DATA_UNRECOGNIZED banana");
}

#[test]
fn data_outside_upload_is_silent() {
    let rig = Rig::new();
    assert!(exchange(&rig, &["DATA:/2O05R"]).is_empty());
}

#[test]
fn legacy_text_rejoins_split_lines() {
    let rig = Rig::new();
    let replies = exchange(
        &rig,
        &[
            "BEGINFILE",
            "/2O02R at 2025-03-07 10:00:00\n/2O0",
            "3R at 2025-03-07 11:00:00",
            "CMD:END_SCHEDULE",
        ],
    );
    assert!(replies.contains(&"ACK:LINE_ADDED 1".to_string()));
    assert!(replies.contains(&"ACK:LINE_ADDED 2".to_string()));
    assert!(replies.contains(&"ACK:SCHEDULE_COMPLETE 2".to_string()));
    assert_eq!(rig.files.lines("schedule.txt").len(), 2);
}

#[test]
fn bare_end_schedule_keeps_stored_schedule() {
    let rig = Rig::new();
    rig.files.put("schedule.txt", &["/2O02R at 2030-01-01 10:00:00"]);
    rig.state
        .schedule
        .replace(Schedule::from_lines(&rig.files.lines("schedule.txt")));

    assert_eq!(exchange(&rig, &["CMD:END_SCHEDULE"]), vec!["ACK:SCHEDULE_COMPLETE 0"]);
    assert_eq!(rig.files.lines("schedule.txt"), vec!["/2O02R at 2030-01-01 10:00:00"]);
    assert_eq!(rig.state.schedule.len(), 1);
}

#[test]
fn empty_upload_keeps_stored_schedule() {
    let rig = Rig::new();
    rig.files.put("schedule.txt", &["/2O02R at 2030-01-01 10:00:00"]);
    let replies = exchange(&rig, &["CMD:SCHEDULE_FILE", "DATA:/2O05R", "CMD:END_SCHEDULE"]);
    assert_eq!(replies.last().unwrap(), "ACK:SCHEDULE_COMPLETE 0");
    assert_eq!(rig.files.lines("schedule.txt"), vec!["/2O02R at 2030-01-01 10:00:00"]);
}

#[test]
fn read_schedule_streams_file_lines() {
    let rig = Rig::new();
    rig.files.put(
        "schedule.txt",
        &["/2O02R at 2025-03-07 10:00:00", "", "/2O03R at 2025-03-07 11:00:00"],
    );
    let replies = exchange(&rig, &["READ_SCHEDULE"]);
    assert_eq!(
        replies,
        vec![
            "[FILE]/2O02R at 2025-03-07 10:00:00",
            "[FILE]/2O03R at 2025-03-07 11:00:00",
            "ACK:READ_SCHEDULE 2",
        ]
    );
}

#[test]
fn read_schedule_without_file_reports_zero() {
    let rig = Rig::new();
    assert_eq!(exchange(&rig, &["READ_SCHEDULE"]), vec!["ACK:READ_SCHEDULE 0"]);
}

// ── Command upload ────────────────────────────────────────────

#[test]
fn command_parts_are_dispatched_in_index_order() {
    let rig = Rig::new();
    let replies = exchange(
        &rig,
        &[
            "SEND_CMD_START:3",
            "SEND_CMD_PART 1:05",
            "SEND_CMD_PART 0:/2O",
            "SEND_CMD_PART 2:R",
        ],
    );
    assert_eq!(
        replies,
        vec![
            "ACK:SEND_CMD_START 3",
            "ACK:SEND_CMD_PART 1 1/3",
            "ACK:SEND_CMD_PART 0 2/3",
            "ACK:SEND_CMD_PART 2 3/3",
            "ACK:SEND_CMD_DISPATCHED ACTUATOR /2O05R",
        ]
    );
    assert_eq!(rig.actuator.commands(), vec!["/2O05R"]);
    assert!(rig.pump.commands().is_empty());
}

#[test]
fn unspaced_part_form_assembles() {
    let rig = Rig::new();
    let replies = exchange(
        &rig,
        &["SEND_CMD_START:2", "SEND_CMD_PART1:ZR", "SEND_CMD_PART0:/1"],
    );
    assert_eq!(
        replies,
        vec![
            "ACK:SEND_CMD_START 2",
            "ACK:SEND_CMD_PART 1 1/2",
            "ACK:SEND_CMD_PART 0 2/2",
            "ACK:SEND_CMD_DISPATCHED PUMP /1ZR",
        ]
    );
    assert_eq!(rig.pump.commands(), vec!["/1ZR"]);
}

#[test]
fn single_unspaced_part_dispatches() {
    let rig = Rig::new();
    let replies = exchange(&rig, &["SEND_CMD_START:1", "SEND_CMD_PART0:/1A"]);
    assert_eq!(replies.last().unwrap(), "ACK:SEND_CMD_DISPATCHED PUMP /1A");
    assert_eq!(rig.pump.commands(), vec!["/1A"]);
}

#[test]
fn out_of_range_part_aborts_upload() {
    let rig = Rig::new();
    let replies = exchange(
        &rig,
        &["SEND_CMD_START:2", "SEND_CMD_PART 5:x", "SEND_CMD_PART 0:/1ZR"],
    );
    assert_eq!(replies[1], "ERROR:SEND_CMD_PART invalid fragment index");
    assert_eq!(replies[2], "ERROR:SEND_CMD_PART no command upload in progress");
    assert!(rig.pump.commands().is_empty());
}

#[test]
fn schedule_upload_cancels_command_upload() {
    let rig = Rig::new();
    let replies = exchange(
        &rig,
        &["SEND_CMD_START:2", "CMD:SCHEDULE_FILE", "SEND_CMD_PART 0:/1"],
    );
    assert_eq!(replies[1], "ACK:SCHEDULE_START");
    assert_eq!(replies[2], "ERROR:SEND_CMD_PART no command upload in progress");
}

#[test]
fn direct_send_routes_by_prefix() {
    let rig = Rig::new();
    let replies = exchange(&rig, &["SEND_CMD:/1ZR", "SEND_CMD:XYZ", "SEND_CMD_START:0"]);
    assert_eq!(
        replies,
        vec![
            "ACK:SEND_CMD PUMP /1ZR",
            "ERROR:SEND_CMD no device channel for command",
            "ERROR:SEND_CMD_START invalid fragment count",
        ]
    );
    assert_eq!(rig.pump.commands(), vec!["/1ZR"]);
}

// ── Direct control ────────────────────────────────────────────

#[test]
fn relay_commands_are_case_insensitive() {
    let rig = Rig::new();
    let replies = exchange(
        &rig,
        &["relay:on", "RELAY:STATUS", "Relay:Off", "RELAY:status", "RELAY:toggle"],
    );
    assert_eq!(
        replies,
        vec![
            "ACK:RELAY_ON",
            "RELAY_STATUS:ON",
            "ACK:RELAY_OFF",
            "RELAY_STATUS:OFF",
            "ERROR:RELAY invalid arguments",
        ]
    );
    assert_eq!(rig.relay.history(), vec![true, false]);
}

#[test]
fn unknown_text_produces_no_frame() {
    let rig = Rig::new();
    assert!(exchange(&rig, &["hello", "   ", "getlog"]).is_empty());
}

#[test]
fn invalid_utf8_is_ignored_and_decoder_recovers() {
    let rig = Rig::new();
    rig.with_ports(|ports| {
        let mut decoder = CommandDecoder::new(ports, &rig.state, &rig.config);
        decoder.handle_frame(&[0xFF, 0xFE, 0xC3]);
        decoder.handle_frame(&[0x80, b'\r', b'\n']);
        decoder.handle_frame(b"RELAY:ON");
    });
    assert_eq!(rig.messages.take(), vec!["ACK:RELAY_ON"]);
    assert_eq!(rig.relay.history(), vec![true]);
}

#[test]
fn manual_start_and_emergency_stop_set_flags() {
    let rig = Rig::new();
    let replies = exchange(&rig, &["M", "emergency_stop"]);
    assert_eq!(replies, vec!["ACK:MANUAL_START", "ACK:EMERGENCY_STOP"]);
    assert!(rig.state.faults.start_pending());
    assert!(rig.state.faults.stop_requested());
}

#[test]
fn set_time_updates_clock() {
    let rig = Rig::new();
    let replies = exchange(&rig, &["T:20250308143000", "T:2025"]);
    assert_eq!(
        replies,
        vec![
            "ACK:TIME_SET 2025-03-08 14:30:00",
            "ERROR:TIME_SET expected 14 digits YYYYMMDDHHMMSS",
        ]
    );
    assert_eq!(rig.clock.now(), Timestamp::new(2025, 3, 8, 14, 30, 0));
}

#[test]
fn reset_reboots_after_ack() {
    let rig = Rig::new();
    assert_eq!(exchange(&rig, &["reset"]), vec!["ACK:RESET"]);
    assert_eq!(rig.system.reboot_count(), 1);
}

#[test]
fn shutdown_falls_back_to_reboot() {
    // The rig's system control reports deep sleep as unsupported.
    let rig = Rig::new();
    assert_eq!(exchange(&rig, &["SHUTDOWN"]), vec!["ACK:SHUTDOWN"]);
    assert_eq!(rig.system.deep_sleep_count(), 0);
    assert_eq!(rig.system.reboot_count(), 1);
}

// ── Logs and sequence config ─────────────────────────────────

#[test]
fn getlog_streams_and_clearlog_empties() {
    let rig = Rig::new();
    assert_eq!(
        exchange(&rig, &["GETLOG"]),
        vec!["[LOG]No log entries found", "LOG_END"]
    );

    rig.files.put("log.txt", &["first", "", "second"]);
    assert_eq!(
        exchange(&rig, &["GETLOG", "CLEARLOG"]),
        vec!["[LOG]first", "[LOG]second", "LOG_END", "LOG_CLEARED"]
    );
    assert!(rig.files.lines("log.txt").is_empty());
}

#[test]
fn sequence_config_round_trips_through_file() {
    let rig = Rig::new();
    let replies = exchange(
        &rig,
        &["READ_SEQUENCE", "UPDATE_SEQUENCE:3,5", "READ_SEQUENCE", "UPDATE_SEQUENCE:x"],
    );
    assert_eq!(
        replies,
        vec![
            "SEQUENCE_CONFIG: RINSE 2, PUMP_CYCLES 12",
            "ACK:SEQUENCE_UPDATED RINSE 3, PUMP_CYCLES 5",
            "SEQUENCE_CONFIG: RINSE 3, PUMP_CYCLES 5",
            "ERROR:UPDATE_SEQUENCE invalid arguments",
        ]
    );
}

// ── File service ──────────────────────────────────────────────

#[test]
fn wifi_lifecycle_reports_json() {
    let rig = Rig::new();
    let replies = exchange(&rig, &["wifi_status", "wifi_on", "wifi_on", "wifi_off"]);
    assert_eq!(replies[0], r#"{"wifi":"off"}"#);
    assert_eq!(
        replies[1],
        r#"{"wifi":"on","status":{"ip":"192.168.4.1","port":80,"ssid":"Autosampler","ap_active":true}}"#
    );
    assert!(replies[2].ends_with(r#""error":"already running"}"#));
    assert_eq!(replies[3], r#"{"wifi":"off"}"#);
    assert!(rig.state.file_service().is_none());
}

#[test]
fn wifi_rejects_short_password() {
    let rig = Rig::new();
    let replies = exchange(&rig, &["wifi_on Lab short"]);
    assert_eq!(
        replies,
        vec![r#"{"wifi":"off","error":"SSID 1-32 chars, password empty or 8-64 chars"}"#]
    );
}

// ── Radio hand-off ────────────────────────────────────────────

#[test]
fn radio_write_reaches_decoder_through_inbox() {
    use autosampler::adapters::ble::BleMessenger;
    use autosampler::events::INBOX;

    let rig = Rig::new();
    let ble = BleMessenger::new("Autosampler");
    assert!(ble.sim_write(b"RELAY:ON\r\n"));

    let frame = INBOX.try_pop().expect("frame queued");
    rig.with_ports(|ports| {
        CommandDecoder::new(ports, &rig.state, &rig.config).handle_frame(&frame);
    });
    assert_eq!(rig.messages.take(), vec!["ACK:RELAY_ON"]);
    assert!(INBOX.is_empty());
}

#[test]
fn dropped_frames_are_reported_once() {
    use autosampler::events::{FrameInbox, INBOX_DEPTH};

    let rig = Rig::new();
    let inbox = FrameInbox::new();
    for _ in 0..INBOX_DEPTH {
        assert!(inbox.push(b"RELAY:STATUS"));
    }
    assert!(!inbox.push(b"RELAY:ON"));

    rig.with_ports(|ports| {
        let decoder = CommandDecoder::new(ports, &rig.state, &rig.config);
        decoder.report_dropped(&inbox);
        decoder.report_dropped(&inbox);
    });
    assert_eq!(rig.messages.take(), vec!["ERROR:BUSY 1 frames dropped"]);
}
