//! Schedule engine states and table builder.
//!
//! ```text
//!  WAIT_FOR_START ──[manual start | head due]──▶ RUNNING
//!        ▲    │                                     │
//!        │  [no schedule | all stale]          [last job | e-stop]
//!        │    ▼                                     ▼
//!        └──[manual start | reload]──── COMPLETED_WAITING_FOR_NEXT
//! ```
//!
//! Start and skip decisions use the ordering metric with the configured
//! grace window: a head at `T` starts for `T <= now <= T + grace` and is
//! skipped once `now > T + grace`.

use std::sync::Arc;

use log::{debug, info, warn};

use super::context::EngineContext;
use super::{StateDescriptor, StateId};
use crate::config::SystemConfig;
use crate::schedule::{Job, Schedule, ScheduleSource};
use crate::sequencer::Sequencer;

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

pub fn build_state_table(config: &SystemConfig) -> [StateDescriptor; StateId::COUNT] {
    [
        StateDescriptor {
            id: StateId::WaitForStart,
            name: "WaitForStart",
            on_enter: Some(wait_enter),
            on_exit: None,
            on_update: wait_update,
            poll_interval_ms: config.wait_tick_ms,
        },
        StateDescriptor {
            id: StateId::Running,
            name: "Running",
            on_enter: Some(running_enter),
            on_exit: Some(running_exit),
            on_update: running_update,
            poll_interval_ms: 0,
        },
        StateDescriptor {
            id: StateId::CompletedWaitingForNext,
            name: "CompletedWaitingForNext",
            on_enter: Some(completed_enter),
            on_exit: None,
            on_update: completed_update,
            poll_interval_ms: config.wait_tick_ms,
        },
    ]
}

fn format_duration(secs: i64) -> String {
    let secs = secs.max(0);
    format!(
        "{} hrs {} min {} sec",
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60
    )
}

// ═══════════════════════════════════════════════════════════════════════════
//  WAIT_FOR_START
// ═══════════════════════════════════════════════════════════════════════════

fn wait_enter(ctx: &mut EngineContext<'_>) {
    ctx.state.faults.clear_stop();
    ctx.last_heartbeat_ms = ctx.uptime_ms();
    ctx.announced = false;
    info!("WaitForStart: {} entries queued", ctx.state.schedule.len());
}

/// Current schedule, loading from flash when the slot is empty.
fn ensure_schedule(ctx: &mut EngineContext<'_>) -> Arc<Schedule> {
    let current = ctx.state.schedule.snapshot();
    if !current.is_empty() {
        return current;
    }
    let c = ctx.config;
    let (loaded, source) =
        Schedule::load_with_fallback(ctx.ports.files, &c.schedule_file, &c.default_schedule_file);
    match source {
        ScheduleSource::Primary => info!("Schedule loaded from {}", c.schedule_file),
        ScheduleSource::Fallback => info!("Schedule loaded from {}", c.default_schedule_file),
        ScheduleSource::Missing => {}
    }
    ctx.state.schedule.replace(loaded);
    ctx.state.schedule.snapshot()
}

fn announce(ctx: &mut EngineContext<'_>, schedule: &Schedule) {
    ctx.announced = true;
    let jobs = schedule.jobs();
    if let (Some(first), Some(last)) = (jobs.first(), jobs.last()) {
        if jobs.len() >= 2 {
            let secs = last.start.ordering_seconds() - first.start.ordering_seconds();
            ctx.notify(&format!("Scheduled Runtime: {}", format_duration(secs)));
            ctx.notify(&format!("Scheduled End Time: {}", last.start));
        }
    }
}

fn idle_heartbeat(ctx: &mut EngineContext<'_>, head: &Job) {
    let now_ms = ctx.uptime_ms();
    if now_ms.saturating_sub(ctx.last_heartbeat_ms) < u64::from(ctx.config.idle_heartbeat_ms) {
        return;
    }
    ctx.last_heartbeat_ms = now_ms;

    let messages = ctx.ports.messages;
    if !messages.is_active() {
        match ctx.ports.power.supply_voltage() {
            Some(v) if v >= ctx.config.min_radio_voltage => {
                info!("Radio down, supply {:.2} V, restarting", v);
                if let Err(e) = messages.restart() {
                    warn!("Radio restart failed: {}", e);
                }
            }
            Some(v) => warn!("Radio down, supply {:.2} V too low to restart", v),
            None => warn!("Radio down, supply voltage unknown"),
        }
    }

    ctx.notify(&format!(
        "Waiting for start: now {}, next {} at {}",
        ctx.ports.clock.now(),
        head.command,
        head.start
    ));
}

fn wait_update(ctx: &mut EngineContext<'_>) -> Option<StateId> {
    let schedule = ensure_schedule(ctx);
    let Some(head) = schedule.head().cloned() else {
        ctx.notify("No schedule found");
        return Some(StateId::CompletedWaitingForNext);
    };
    if !ctx.announced {
        announce(ctx, &schedule);
    }
    idle_heartbeat(ctx, &head);

    if ctx.state.faults.take_start() {
        ctx.notify("Manual start triggered");
        return Some(StateId::Running);
    }

    let now = ctx.ports.clock.now();
    let grace = ctx.config.grace_window_secs;
    let mut remaining = (*schedule).clone();
    let skipped = remaining.pop_stale(now, grace);
    if !skipped.is_empty() {
        for job in &skipped {
            ctx.notify(&format!("Skipped: {} at {}", job.command, job.start));
        }
        let next = remaining.head().cloned();
        ctx.state.schedule.replace(remaining);
        match next {
            None => {
                ctx.notify("No more schedule entries");
                return Some(StateId::CompletedWaitingForNext);
            }
            Some(job) => ctx.notify(&format!("Next: {}", job.start)),
        }
    }

    // After the stale pop the head is never past its grace window.
    let head = ctx.state.schedule.snapshot().head().cloned()?;
    if head.start.ordering_seconds() <= now.ordering_seconds() {
        ctx.notify(&format!(
            "Scheduled start reached ({}s grace): {}",
            grace, head.start
        ));
        return Some(StateId::Running);
    }
    debug!("WaitForStart: now {}, head {}", now, head.start);
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  RUNNING
// ═══════════════════════════════════════════════════════════════════════════

fn running_enter(ctx: &mut EngineContext<'_>) {
    let run = ctx.state.schedule.snapshot();
    info!("Running: {} jobs", run.len());
    ctx.run = Some(run);
    ctx.run_index = 0;
}

fn running_exit(ctx: &mut EngineContext<'_>) {
    ctx.run = None;
    ctx.run_index = 0;
}

/// Sleep `duration_ms`, sending a heartbeat every run-heartbeat period.
/// Returns early on emergency stop.
fn wait_with_heartbeat(ctx: &EngineContext<'_>, duration_ms: u64, next: &Job) {
    let period = u64::from(ctx.config.run_heartbeat_ms.max(1));
    let started = ctx.uptime_ms();
    loop {
        let elapsed = ctx.uptime_ms().saturating_sub(started);
        if elapsed >= duration_ms || ctx.state.faults.stop_requested() {
            return;
        }
        let chunk = period.min(duration_ms - elapsed);
        ctx.ports.time.sleep_ms(u32::try_from(chunk).unwrap_or(u32::MAX));
        if ctx.uptime_ms().saturating_sub(started) < duration_ms {
            ctx.notify(&format!("Current: {}", ctx.ports.clock.now()));
            ctx.notify(&format!("Next at: {}", next.start));
        }
    }
}

fn running_update(ctx: &mut EngineContext<'_>) -> Option<StateId> {
    let Some(run) = ctx.run.clone() else {
        return Some(StateId::CompletedWaitingForNext);
    };
    let total = run.len();
    let i = ctx.run_index;
    let Some(job) = run.jobs().get(i) else {
        ctx.notify("All steps completed!");
        return Some(StateId::CompletedWaitingForNext);
    };

    if ctx.state.faults.stop_requested() {
        ctx.notify(&format!(
            "Emergency stop: run aborted, {} of {} steps skipped",
            total - i,
            total
        ));
        return Some(StateId::CompletedWaitingForNext);
    }

    ctx.notify(&format!("Step {}/{}: {}", i + 1, total, job.command));
    let step_started = ctx.uptime_ms();
    let result =
        Sequencer::new(ctx.ports, &ctx.state.faults, ctx.config).execute(&job.command);
    let duration_s = ctx.uptime_ms().saturating_sub(step_started) / 1000;

    match result {
        Ok(()) => ctx.notify(&format!("Step {} executed: {}", i + 1, job.command)),
        Err(e) => {
            warn!("Step {} failed: {}", i + 1, e);
            ctx.notify(&format!("ERROR:STEP {} {}", i + 1, e));
        }
    }
    ctx.notify(&format!("Progress: {}%", (i + 1) * 100 / total));
    ctx.notify(&format!("Step {} duration: {} sec", i + 1, duration_s));

    if let Some(next) = run.jobs().get(i + 1) {
        let now = ctx.ports.clock.now();
        let remaining_s = (next.start.ordering_seconds() - now.ordering_seconds()).max(0);
        ctx.notify(&format!(
            "Time left: {} minutes, next switch at {}",
            remaining_s / 60,
            next.start
        ));
        wait_with_heartbeat(ctx, remaining_s.unsigned_abs() * 1000, next);
    }

    ctx.run_index += 1;
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  COMPLETED_WAITING_FOR_NEXT
// ═══════════════════════════════════════════════════════════════════════════

fn completed_enter(ctx: &mut EngineContext<'_>) {
    ctx.notify("Schedule completed. Waiting for new schedule");
}

fn completed_update(ctx: &mut EngineContext<'_>) -> Option<StateId> {
    if ctx.state.faults.take_start() {
        ctx.notify("Manual start detected");
        return Some(StateId::WaitForStart);
    }
    match Schedule::load(ctx.ports.files, &ctx.config.schedule_file) {
        Ok(reloaded) if !reloaded.is_empty() => {
            info!("New schedule detected: {} entries", reloaded.len());
            ctx.state.schedule.replace(reloaded);
            Some(StateId::WaitForStart)
        }
        Ok(_) => None,
        Err(e) => {
            debug!("Schedule reload: {}", e);
            None
        }
    }
}
