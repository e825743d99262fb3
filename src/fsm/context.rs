//! Shared mutable context threaded through every FSM handler.
//!
//! Holds the collaborators, the shared orchestrator state, and the
//! per-cycle bookkeeping of the schedule engine.

use std::sync::Arc;

use crate::app::ports::Ports;
use crate::app::state::OrchestratorState;
use crate::config::SystemConfig;
use crate::schedule::Schedule;

pub struct EngineContext<'a> {
    // -- Collaborators --
    pub ports: Ports<'a>,
    pub state: &'a OrchestratorState,
    pub config: &'a SystemConfig,

    // -- Cycle bookkeeping --
    /// Jobs of the current run, fixed when `Running` is entered.
    pub run: Option<Arc<Schedule>>,
    /// Index of the next job to execute in `run`.
    pub run_index: usize,
    /// Uptime of the last idle heartbeat.
    pub last_heartbeat_ms: u64,
    /// Whether the runtime summary was already sent this wait.
    pub announced: bool,
}

impl<'a> EngineContext<'a> {
    pub fn new(ports: Ports<'a>, state: &'a OrchestratorState, config: &'a SystemConfig) -> Self {
        Self {
            ports,
            state,
            config,
            run: None,
            run_index: 0,
            last_heartbeat_ms: 0,
            announced: false,
        }
    }

    pub fn notify(&self, text: &str) {
        self.ports.notify(text);
    }

    pub fn uptime_ms(&self) -> u64 {
        self.ports.time.uptime_ms()
    }
}
