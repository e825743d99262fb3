//! Schedule engine: the FSM plus its blocking run loop.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  scheduler thread                                            │
//! │                                                              │
//! │   loop {                                                     │
//! │     fsm.tick(ctx)          WaitForStart / Running / Completed │
//! │     sleep(poll_interval)   per-state, via TimePort           │
//! │   }                                                          │
//! │                                                              │
//! │   Running ──▶ Sequencer::execute ──▶ DeviceDriver (UARTs)    │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use log::info;

use crate::app::ports::Ports;
use crate::app::state::OrchestratorState;
use crate::config::SystemConfig;
use crate::fsm::context::EngineContext;
use crate::fsm::{Fsm, StateId, states};

pub struct ScheduleEngine<'a> {
    fsm: Fsm,
    ctx: EngineContext<'a>,
    started: bool,
}

impl<'a> ScheduleEngine<'a> {
    pub fn new(ports: Ports<'a>, state: &'a OrchestratorState, config: &'a SystemConfig) -> Self {
        Self {
            fsm: Fsm::new(states::build_state_table(config), StateId::WaitForStart),
            ctx: EngineContext::new(ports, state, config),
            started: false,
        }
    }

    fn ensure_started(&mut self) {
        if !self.started {
            self.started = true;
            self.fsm.enter(&mut self.ctx);
        }
    }

    /// One FSM tick without the inter-tick sleep.
    pub fn step(&mut self) -> StateId {
        self.ensure_started();
        self.fsm.tick(&mut self.ctx)
    }

    /// Tick and sleep `ticks` times.
    pub fn run_for(&mut self, ticks: usize) -> StateId {
        for _ in 0..ticks {
            self.step();
            self.idle();
        }
        self.fsm.state()
    }

    /// Run forever.
    pub fn run(&mut self) -> ! {
        info!("Schedule engine running");
        loop {
            self.step();
            self.idle();
        }
    }

    pub fn current_state(&self) -> StateId {
        self.fsm.state()
    }

    fn idle(&self) {
        let ms = self.fsm.poll_interval_ms();
        if ms > 0 {
            self.ctx.ports.time.sleep_ms(ms);
        }
    }
}
