//! Fault controller: the process-wide emergency-stop and manual-start flags.
//!
//! Both flags are written by the command decoder thread and read (and, for
//! manual start, consumed) by the scheduler thread.
//!
//! ## Consistency policy
//!
//! The flags are independent atomics.  No lock spans a flag read and the
//! action taken on it, so a stop raised a moment after a checkpoint is only
//! seen at the next checkpoint.  This is accepted: cancellation is
//! cooperative and checked at fixed points only.
//!
//! ## Stop lifecycle
//!
//! 1. `EMERGENCY_STOP` arrives; the decoder calls [`FaultController::request_stop`].
//! 2. The engine loop head, the sequencer entry and every poll iteration
//!    observe [`stop_requested`](FaultController::stop_requested) and abort.
//! 3. The flag survives the rest of the run.  It is cleared once per
//!    cycle when `WaitForStart` is entered.

use core::sync::atomic::{AtomicBool, Ordering};

use log::{info, warn};

/// Emergency-stop and manual-start flags.
#[derive(Debug, Default)]
pub struct FaultController {
    emergency_stop: AtomicBool,
    manual_start: AtomicBool,
}

impl FaultController {
    pub const fn new() -> Self {
        Self {
            emergency_stop: AtomicBool::new(false),
            manual_start: AtomicBool::new(false),
        }
    }

    // ── Emergency stop ────────────────────────────────────────

    pub fn request_stop(&self) {
        if !self.emergency_stop.swap(true, Ordering::AcqRel) {
            warn!("EMERGENCY STOP SET");
        }
    }

    pub fn stop_requested(&self) -> bool {
        self.emergency_stop.load(Ordering::Acquire)
    }

    /// Clear the stop flag.  Called from `WaitForStart` entry only.
    pub fn clear_stop(&self) {
        if self.emergency_stop.swap(false, Ordering::AcqRel) {
            info!("EMERGENCY STOP CLEARED");
        }
    }

    // ── Manual start ──────────────────────────────────────────

    pub fn request_start(&self) {
        self.manual_start.store(true, Ordering::Release);
    }

    /// Consume a pending manual start.
    pub fn take_start(&self) -> bool {
        self.manual_start.swap(false, Ordering::AcqRel)
    }

    pub fn start_pending(&self) -> bool {
        self.manual_start.load(Ordering::Acquire)
    }
}
