//! Schedule engine state machine against the mock rig.

use std::sync::Arc;

use autosampler::fsm::StateId;
use autosampler::scheduler::ScheduleEngine;
use autosampler::schedule::time::Timestamp;

use crate::mock_hw::Rig;

fn at(h: u8, m: u8, s: u8) -> Timestamp {
    Timestamp::new(2025, 3, 7, h, m, s)
}

// ── QA-E1: grace window ───────────────────────────────────────

#[test]
fn head_within_grace_starts_immediately() {
    let rig = Rig::starting_at(at(10, 0, 10));
    rig.files.put("schedule.txt", &["/2O05R at 2025-03-07 10:00:00"]);
    let state = rig.with_ports(|ports| {
        let mut engine = ScheduleEngine::new(ports, &rig.state, &rig.config);
        engine.step()
    });
    assert_eq!(state, StateId::Running);
    assert!(rig
        .messages
        .saw("Scheduled start reached (10s grace): 2025-03-07 10:00:00"));
}

#[test]
fn head_past_grace_is_skipped() {
    let rig = Rig::starting_at(at(10, 0, 11));
    rig.files.put("schedule.txt", &["/2O05R at 2025-03-07 10:00:00"]);
    let state = rig.with_ports(|ports| {
        let mut engine = ScheduleEngine::new(ports, &rig.state, &rig.config);
        engine.step()
    });
    assert_eq!(state, StateId::CompletedWaitingForNext);
    assert!(rig.messages.saw("Skipped: /2O05R at 2025-03-07 10:00:00"));
    assert!(rig.messages.saw("No more schedule entries"));
    assert!(rig.actuator.commands().is_empty());
}

#[test]
fn stale_entries_are_dropped_until_a_live_head() {
    let rig = Rig::starting_at(at(10, 5, 0));
    rig.files.put(
        "schedule.txt",
        &[
            "/2O02R at 2025-03-07 10:00:00",
            "/2O03R at 2025-03-07 10:01:00",
            "/2O04R at 2025-03-07 11:00:00",
        ],
    );
    let state = rig.with_ports(|ports| {
        let mut engine = ScheduleEngine::new(ports, &rig.state, &rig.config);
        engine.step()
    });
    assert_eq!(state, StateId::WaitForStart);
    assert_eq!(rig.state.schedule.len(), 1);
    assert!(rig.messages.saw("Next: 2025-03-07 11:00:00"));
}

// ── QA-E2: announcements and heartbeat ────────────────────────

#[test]
fn runtime_summary_is_announced_once() {
    let rig = Rig::new();
    rig.files.put(
        "schedule.txt",
        &["/2O02R at 2025-03-07 11:00:00", "/2O03R at 2025-03-07 12:30:15"],
    );
    rig.with_ports(|ports| {
        let mut engine = ScheduleEngine::new(ports, &rig.state, &rig.config);
        engine.run_for(3);
    });
    let frames = rig.messages.frames();
    let summaries: Vec<_> = frames
        .iter()
        .filter(|f| f.starts_with("Scheduled Runtime:"))
        .collect();
    assert_eq!(summaries, vec!["Scheduled Runtime: 1 hrs 30 min 15 sec"]);
    assert!(rig.messages.saw("Scheduled End Time: 2025-03-07 12:30:15"));
}

#[test]
fn idle_heartbeat_restarts_radio_when_supply_allows() {
    let rig = Rig::new();
    rig.files.put("schedule.txt", &["/2O02R at 2025-03-07 12:00:00"]);
    rig.messages.set_down(true);
    rig.with_ports(|ports| {
        let mut engine = ScheduleEngine::new(ports, &rig.state, &rig.config);
        // Ticks at 0 s, 5 s and 10 s; the heartbeat fires on the third.
        engine.run_for(3);
    });
    assert_eq!(rig.messages.restarts(), 1);
}

#[test]
fn low_supply_blocks_radio_restart() {
    let rig = Rig::new();
    rig.files.put("schedule.txt", &["/2O02R at 2025-03-07 12:00:00"]);
    rig.messages.set_down(true);
    rig.power.set_voltage(3.0);
    rig.with_ports(|ports| {
        let mut engine = ScheduleEngine::new(ports, &rig.state, &rig.config);
        engine.run_for(5);
    });
    assert_eq!(rig.messages.restarts(), 0);
}

#[test]
fn heartbeat_reports_next_entry() {
    let rig = Rig::new();
    rig.files.put("schedule.txt", &["/2O02R at 2025-03-07 12:00:00"]);
    rig.with_ports(|ports| {
        let mut engine = ScheduleEngine::new(ports, &rig.state, &rig.config);
        engine.run_for(3);
    });
    assert!(rig.messages.saw(
        "Waiting for start: now 2025-03-07 10:00:10, next /2O02R at 2025-03-07 12:00:00"
    ));
}

// ── QA-E3: manual start and reload ────────────────────────────

#[test]
fn manual_start_runs_future_schedule() {
    let rig = Rig::new();
    rig.files.put("schedule.txt", &["/2O02R at 2025-03-07 12:00:00"]);
    rig.state.faults.request_start();
    let state = rig.with_ports(|ports| {
        let mut engine = ScheduleEngine::new(ports, &rig.state, &rig.config);
        engine.step()
    });
    assert_eq!(state, StateId::Running);
    assert!(rig.messages.saw("Manual start triggered"));
    assert!(!rig.state.faults.start_pending());
}

#[test]
fn fallback_schedule_is_used_when_primary_missing() {
    let rig = Rig::new();
    rig.files
        .put("default_schedule.txt", &["/2O07R at 2025-03-07 12:00:00"]);
    rig.with_ports(|ports| {
        let mut engine = ScheduleEngine::new(ports, &rig.state, &rig.config);
        engine.step();
    });
    assert_eq!(
        rig.state.schedule.snapshot().head().map(|j| j.command.clone()),
        Some("/2O07R".to_string())
    );
}

#[test]
fn new_schedule_file_wakes_completed_state() {
    let rig = Rig::new();
    rig.with_ports(|ports| {
        let mut engine = ScheduleEngine::new(ports, &rig.state, &rig.config);
        assert_eq!(engine.step(), StateId::CompletedWaitingForNext);
        assert_eq!(engine.step(), StateId::CompletedWaitingForNext);

        rig.files.put("schedule.txt", &["/2O02R at 2025-03-07 12:00:00"]);
        assert_eq!(engine.step(), StateId::WaitForStart);
    });
    assert!(rig.messages.saw("No schedule found"));
    assert!(rig.messages.saw("Schedule completed. Waiting for new schedule"));
    assert_eq!(rig.state.schedule.len(), 1);
}

// ── QA-E4: full run ───────────────────────────────────────────

#[test]
fn single_job_runs_to_completion() {
    let rig = Rig::new();
    rig.files.put("schedule.txt", &["/2O05R at 2025-03-07 10:00:00"]);
    rig.with_ports(|ports| {
        let mut engine = ScheduleEngine::new(ports, &rig.state, &rig.config);
        assert_eq!(engine.step(), StateId::Running);
        assert_eq!(engine.step(), StateId::Running);
        assert_eq!(engine.step(), StateId::CompletedWaitingForNext);
    });

    assert!(rig.messages.saw("Step 1/1: /2O05R"));
    assert!(rig.messages.saw("Step 1 executed: /2O05R"));
    assert!(rig.messages.saw("Progress: 100%"));
    assert!(rig.messages.saw("All steps completed!"));
    assert_eq!(
        rig.actuator.commands(),
        vec!["/2wR", "/2O01R", "/2O05R", "/2wR"]
    );
    assert_eq!(rig.relay.history(), vec![true, false]);

    let log = rig.files.lines("log.txt");
    assert_eq!(log.len(), 2);
    assert!(log[0].ends_with("| Command: /2O05R | Sample: smp 4 | Status: Start"));
    assert!(log[1].ends_with("| Status: End"));

    // Executed jobs stay in the slot for the next cycle.
    assert_eq!(rig.state.schedule.len(), 1);
}

#[test]
fn emergency_stop_between_jobs_aborts_run() {
    let rig = Rig::new();
    rig.files.put(
        "schedule.txt",
        &["/2O05R at 2025-03-07 10:00:00", "/2O06R at 2025-03-07 10:30:00"],
    );
    rig.clock.stop_at(60_000, Arc::clone(&rig.state));

    rig.with_ports(|ports| {
        let mut engine = ScheduleEngine::new(ports, &rig.state, &rig.config);
        assert_eq!(engine.step(), StateId::Running);
        // Runs job 1, then waits toward 10:30 until the stop lands.
        assert_eq!(engine.step(), StateId::Running);
        assert_eq!(engine.step(), StateId::CompletedWaitingForNext);
    });

    assert!(rig
        .messages
        .saw("Emergency stop: run aborted, 1 of 2 steps skipped"));
    assert!(!rig.actuator.commands().contains(&"/2O06R".to_string()));
    assert_eq!(rig.relay.history(), vec![true, false]);
    assert!(rig.messages.saw_prefix("Current: "));
}

#[test]
fn stop_flag_is_cleared_on_next_wait() {
    let rig = Rig::new();
    rig.state.faults.request_stop();
    rig.files.put("schedule.txt", &["/2O02R at 2025-03-07 12:00:00"]);
    rig.with_ports(|ports| {
        let mut engine = ScheduleEngine::new(ports, &rig.state, &rig.config);
        engine.step();
    });
    assert!(!rig.state.faults.stop_requested());
}
