//! Process-wide orchestrator state.
//!
//! One instance lives for the whole process and is shared by reference
//! between the frame decoder thread and the scheduler thread.
//!
//! ```text
//!   decoder thread ──┐                     ┌── scheduler thread
//!                    ▼                     ▼
//!             ┌───────────────────────────────────┐
//!             │ OrchestratorState                 │
//!             │  faults        (atomics)          │
//!             │  schedule      (Arc swap)         │
//!             │  file_service  (handle)           │
//!             └───────────────────────────────────┘
//! ```
//!
//! The schedule is replaced wholesale by swapping an `Arc`; readers take a
//! snapshot and never observe a half-written list.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::app::ports::FileServiceHandle;
use crate::safety::FaultController;
use crate::schedule::Schedule;

/// Shared, swappable reference to the current [`Schedule`].
#[derive(Debug, Default)]
pub struct ScheduleSlot {
    current: Mutex<Arc<Schedule>>,
}

impl ScheduleSlot {
    pub fn new(schedule: Schedule) -> Self {
        Self {
            current: Mutex::new(Arc::new(schedule)),
        }
    }

    fn guard(&self) -> MutexGuard<'_, Arc<Schedule>> {
        // A panicked holder cannot leave the Arc half-written.
        self.current
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Cheap snapshot of the current schedule.
    pub fn snapshot(&self) -> Arc<Schedule> {
        Arc::clone(&self.guard())
    }

    /// Replace the schedule.
    pub fn replace(&self, schedule: Schedule) {
        *self.guard() = Arc::new(schedule);
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }
}

/// Everything the decoder and the engine share.
#[derive(Debug, Default)]
pub struct OrchestratorState {
    pub faults: FaultController,
    pub schedule: ScheduleSlot,
    file_service: Mutex<Option<FileServiceHandle>>,
}

impl OrchestratorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle of the running file service, if any.
    pub fn file_service(&self) -> Option<FileServiceHandle> {
        self.file_service
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn set_file_service(&self, handle: Option<FileServiceHandle>) {
        *self
            .file_service
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = handle;
    }
}
