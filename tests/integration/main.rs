//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises one subsystem against
//! the mock rig.  All tests run on the host with no hardware attached.

#![cfg(not(target_os = "espidf"))]

mod decoder_tests;
mod engine_tests;
mod mock_hw;
mod sequencer_tests;
