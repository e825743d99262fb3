//! Autosampler firmware library.
//!
//! Exposes the orchestration core (decoder, schedule engine, sequencer,
//! device driver) and the adapters for integration testing and host
//! simulation.  All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod error;
pub mod events;
pub mod fsm;
pub mod protocol;
pub mod safety;
pub mod schedule;
pub mod scheduler;
pub mod sequencer;

// Links the std critical-section impl on host builds.
#[cfg(not(target_os = "espidf"))]
use critical_section as _;

pub mod adapters;
pub mod drivers;
pub mod pins;
