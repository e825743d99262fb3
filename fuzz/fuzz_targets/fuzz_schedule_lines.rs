//! Fuzz target: schedule file parsing
//!
//! Treats the input as a schedule file and checks the loaded schedule:
//! sorted, capped, and stable under a save/load cycle.
//!
//! cargo fuzz run fuzz_schedule_lines

#![no_main]

use autosampler::schedule::{MAX_ENTRIES, Schedule};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    let lines: Vec<String> = text.lines().map(str::to_string).collect();

    let schedule = Schedule::from_lines(&lines);
    assert!(schedule.len() <= MAX_ENTRIES);
    assert!(schedule.jobs().windows(2).all(|w| w[0].start <= w[1].start));

    let reloaded = Schedule::from_lines(&schedule.to_lines());
    assert_eq!(reloaded.len(), schedule.len());
});
