//! Step template loaded from the sequence file.
//!
//! ```text
//! # rinse twice, run the job command, then pump
//! RINSE 2
//! {COMMAND}
//! PUMP_CYCLES 12
//! ```
//!
//! Blank lines and `#` comments are ignored; `PUMP` and `PUMP_CYCLES` are
//! synonyms.  A missing, empty or entirely invalid file yields
//! [`Template::builtin`].

use log::{info, warn};

use crate::app::ports::{FileStore, StorageError};

/// Placeholder line for the job's own command.
pub const COMMAND_TOKEN: &str = "{COMMAND}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Rinse(u32),
    Command,
    Pump(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    steps: Vec<Step>,
}

impl Default for Template {
    fn default() -> Self {
        Self::builtin()
    }
}

fn parse_step(line: &str) -> Option<Step> {
    if line == COMMAND_TOKEN {
        return Some(Step::Command);
    }
    let mut words = line.split_whitespace();
    let keyword = words.next()?;
    let count: u32 = words.next()?.parse().ok()?;
    if words.next().is_some() {
        return None;
    }
    if keyword.eq_ignore_ascii_case("RINSE") {
        Some(Step::Rinse(count))
    } else if keyword.eq_ignore_ascii_case("PUMP") || keyword.eq_ignore_ascii_case("PUMP_CYCLES") {
        Some(Step::Pump(count))
    } else {
        None
    }
}

impl Template {
    /// `[RINSE 2, COMMAND, PUMP 12]`
    pub fn builtin() -> Self {
        Self::with_counts(2, 12)
    }

    pub fn with_counts(rinse: u32, pump_cycles: u32) -> Self {
        Self {
            steps: vec![Step::Rinse(rinse), Step::Command, Step::Pump(pump_cycles)],
        }
    }

    /// Parse template lines.  `None` when no line yields a step.
    pub fn parse(lines: &[String]) -> Option<Self> {
        let mut steps = Vec::new();
        for raw in lines {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match parse_step(line) {
                Some(step) => steps.push(step),
                None => warn!("Sequence: ignoring line '{}'", line),
            }
        }
        (!steps.is_empty()).then_some(Self { steps })
    }

    /// Load `name`, falling back to the built-in template.
    pub fn load(files: &dyn FileStore, name: &str) -> Self {
        match files.read_lines(name) {
            Ok(lines) => Self::parse(&lines).unwrap_or_else(|| {
                info!("Sequence: {} has no steps, using built-in template", name);
                Self::builtin()
            }),
            Err(e) => {
                info!("Sequence: {} unavailable ({}), using built-in template", name, e);
                Self::builtin()
            }
        }
    }

    pub fn save(&self, files: &dyn FileStore, name: &str) -> Result<(), StorageError> {
        files.write_lines(name, &self.to_lines())
    }

    pub fn to_lines(&self) -> Vec<String> {
        let mut lines = vec!["# Sequence template".to_string()];
        lines.extend(self.steps.iter().map(|step| match step {
            Step::Rinse(n) => format!("RINSE {n}"),
            Step::Command => COMMAND_TOKEN.to_string(),
            Step::Pump(n) => format!("PUMP_CYCLES {n}"),
        }));
        lines
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Count of the first RINSE step, 0 if none.
    pub fn rinse_count(&self) -> u32 {
        self.steps
            .iter()
            .find_map(|s| match s {
                Step::Rinse(n) => Some(*n),
                _ => None,
            })
            .unwrap_or(0)
    }

    /// Count of the first PUMP step, 0 if none.
    pub fn pump_cycles(&self) -> u32 {
        self.steps
            .iter()
            .find_map(|s| match s {
                Step::Pump(n) => Some(*n),
                _ => None,
            })
            .unwrap_or(0)
    }
}
