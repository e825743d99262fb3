//! Application core: port traits and the process-wide orchestrator state.
//!
//! Everything the decoder, engine and sequencer share lives in
//! [`state::OrchestratorState`]; everything they talk to lives behind the
//! traits in [`ports`], keeping the domain testable without peripherals.

pub mod ports;
pub mod state;
