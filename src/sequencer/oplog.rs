//! Operational log lines and sample-slot mapping.

use crate::schedule::time::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    End,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Self::Start => "Start",
            Self::End => "End",
        }
    }
}

/// Sample slot selected by a valve command.
///
/// `/2O<nn>R` and `/2<nn>R` with `nn` in `02..=16` map to slot `nn - 1`;
/// port 01 is the rinse port and has no slot.
pub fn sample_slot(command: &str) -> Option<u8> {
    let command = command.trim();
    let rest = command
        .strip_prefix("/2O")
        .or_else(|| command.strip_prefix("/2"))?;
    let digits = rest.strip_suffix('R')?;
    if digits.len() != 2 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let port: u8 = digits.parse().ok()?;
    (2..=16).contains(&port).then(|| port - 1)
}

/// `"<ts> | Command: <cmd> | Sample: <slot|N/A> | Status: Start|End"`
pub fn operation_line(ts: Timestamp, command: &str, phase: Phase) -> String {
    let sample = match sample_slot(command) {
        Some(n) => format!("smp {n}"),
        None => "N/A".to_string(),
    };
    format!(
        "{} | Command: {} | Sample: {} | Status: {}",
        ts,
        command,
        sample,
        phase.label()
    )
}
