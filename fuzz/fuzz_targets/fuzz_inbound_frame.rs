//! Fuzz target: inbound frame grammar and the upload buffers
//!
//! Splits the input on NUL into frames, classifies each one and feeds the
//! upload payloads into fresh reassembly buffers, asserting that nothing
//! panics and that the command buffer never assembles an incomplete set.
//!
//! cargo fuzz run fuzz_inbound_frame

#![no_main]

use autosampler::protocol::command::InboundCommand;
use autosampler::protocol::upload::{CommandUpload, ScheduleUpload};
use autosampler::schedule::Schedule;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut schedule = ScheduleUpload::default();
    let mut command = CommandUpload::default();

    for raw in data.split(|&b| b == 0) {
        let decoded = String::from_utf8_lossy(raw);
        match InboundCommand::parse(decoded.trim()) {
            InboundCommand::BeginSchedule => schedule.begin(),
            InboundCommand::Data(payload) => {
                let _ = schedule.push_fragment(payload);
            }
            InboundCommand::Other(text) if schedule.is_active() => {
                let _ = schedule.push_legacy(text);
            }
            InboundCommand::EndSchedule => {
                let lines = schedule.finish();
                let parsed = Schedule::from_lines(&lines);
                assert!(parsed.len() <= lines.len());
            }
            InboundCommand::SendCmdStart(n) => command.begin(n.min(64)),
            InboundCommand::SendCmdPart { index, payload } => {
                if command.insert(index, payload).is_err() {
                    command.abort();
                }
                let complete = command.is_complete();
                let assembled = command.take_assembled();
                assert_eq!(complete, assembled.is_some());
            }
            _ => {}
        }
    }
});
