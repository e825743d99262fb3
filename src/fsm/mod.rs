//! Function-pointer finite state machine engine.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  StateTable                                                      │
//! │  ┌──────────────┬──────────┬─────────┬───────────────┬────────┐  │
//! │  │ StateId      │ on_enter │ on_exit │ on_update     │ poll   │  │
//! │  ├──────────────┼──────────┼─────────┼───────────────┼────────┤  │
//! │  │ WaitForStart │ fn(ctx)  │ -       │ fn->Option<>  │ 5 s    │  │
//! │  │ Running      │ fn(ctx)  │ fn(ctx) │ fn->Option<>  │ 0      │  │
//! │  │ Completed    │ fn(ctx)  │ -       │ fn->Option<>  │ 5 s    │  │
//! │  └──────────────┴──────────┴─────────┴───────────────┴────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each tick the engine calls `on_update` for the **current** state.
//! If it returns `Some(next_id)`, the engine runs `on_exit` for the
//! current state, then `on_enter` for the next, and updates the
//! current pointer.  The caller sleeps the current state's poll
//! interval between ticks.

pub mod context;
pub mod states;

use context::EngineContext;
use log::info;

/// Must stay in sync with the table built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StateId {
    WaitForStart = 0,
    Running = 1,
    CompletedWaitingForNext = 2,
}

impl StateId {
    pub const COUNT: usize = 3;
    pub const ALL: [StateId; Self::COUNT] =
        [Self::WaitForStart, Self::Running, Self::CompletedWaitingForNext];

    pub const fn index(self) -> usize {
        self as usize
    }
}

/// `on_enter` / `on_exit`, run exactly once per transition.
pub type StateActionFn = fn(&mut EngineContext<'_>);

/// Per-tick handler.  `Some(next)` transitions, `None` stays.
pub type StateUpdateFn = fn(&mut EngineContext<'_>) -> Option<StateId>;

/// One row of the state table.
pub struct StateDescriptor {
    pub id: StateId,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn>,
    pub on_exit: Option<StateActionFn>,
    pub on_update: StateUpdateFn,
    /// Sleep between ticks while in this state.
    pub poll_interval_ms: u32,
}

/// Table-driven engine.  Owns no context; handlers get it per call.
pub struct Fsm {
    table: [StateDescriptor; StateId::COUNT],
    state: StateId,
}

impl Fsm {
    pub fn new(table: [StateDescriptor; StateId::COUNT], initial: StateId) -> Self {
        debug_assert!(
            StateId::ALL.iter().all(|id| table[id.index()].id == *id),
            "state table out of order"
        );
        Self { table, state: initial }
    }

    fn row(&self, id: StateId) -> &StateDescriptor {
        &self.table[id.index()]
    }

    /// Run `on_enter` of the initial state.  Call once before `tick()`.
    pub fn enter(&mut self, ctx: &mut EngineContext<'_>) {
        let row = self.row(self.state);
        info!("engine: entering {}", row.name);
        if let Some(enter) = row.on_enter {
            enter(ctx);
        }
    }

    /// Run the current state's update and follow any transition it asks
    /// for.  Returns the state the engine is in afterwards.
    pub fn tick(&mut self, ctx: &mut EngineContext<'_>) -> StateId {
        let update = self.row(self.state).on_update;
        // Returning the current state re-runs its exit and enter.
        if let Some(next) = update(ctx) {
            self.switch(next, ctx);
        }
        self.state
    }

    pub fn state(&self) -> StateId {
        self.state
    }

    pub fn poll_interval_ms(&self) -> u32 {
        self.row(self.state).poll_interval_ms
    }

    fn switch(&mut self, next: StateId, ctx: &mut EngineContext<'_>) {
        let (from, to) = (self.row(self.state), self.row(next));
        info!("engine: {} -> {}", from.name, to.name);
        let (exit, enter) = (from.on_exit, to.on_enter);

        if let Some(exit) = exit {
            exit(ctx);
        }
        self.state = next;
        if let Some(enter) = enter {
            enter(ctx);
        }
    }
}
