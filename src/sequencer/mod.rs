//! Sampling sequencer: runs the step template for one job.
//!
//! ```text
//!   relay on
//!     prelude    /2wR, /1ZWR, poll init
//!     RINSE n    /2O01R, n × (stroke, poll rinse)
//!     COMMAND    op-log Start, job command → actuator, settle
//!     PUMP n     n × (status check, stroke, poll pump)
//!     postlude   /2wR
//!   relay off
//! ```
//!
//! Any step failure aborts the run.  The relay is switched off on every
//! exit path once it has been switched on.

pub mod oplog;
pub mod template;

use log::{info, warn};

use crate::app::ports::Ports;
use crate::config::{PUMP_CYCLE_LIMIT, SystemConfig};
use crate::drivers::Channel;
use crate::drivers::pump::{PUMP_INIT, PUMP_STROKE, RINSE_PORT, VALVE_HOME};
use crate::error::{DeviceError, Result};
use crate::safety::FaultController;
use oplog::{Phase, operation_line};
use template::{Step, Template};

pub struct Sequencer<'a> {
    ports: Ports<'a>,
    faults: &'a FaultController,
    config: &'a SystemConfig,
}

impl<'a> Sequencer<'a> {
    pub fn new(ports: Ports<'a>, faults: &'a FaultController, config: &'a SystemConfig) -> Self {
        Self {
            ports,
            faults,
            config,
        }
    }

    /// Run the full template for `command`.
    pub fn execute(&self, command: &str) -> Result<()> {
        if self.faults.stop_requested() {
            self.ports.notify("Sequence aborted: emergency stop");
            return Err(DeviceError::Aborted.into());
        }

        let template = Template::load(self.ports.files, &self.config.sequence_file);
        let devices = self.ports.devices;
        devices.truncate_pump_log();
        devices.pump_log(&format!("sequence start: {command}"));

        self.ports.relay.set(true);
        self.ports.notify("Relay on");

        let result = self.run_steps(command, &template);

        self.ports.relay.set(false);
        self.ports.notify("Relay off");

        match &result {
            Ok(()) => {
                devices.pump_log("sequence complete");
                self.ports.notify("Sequence complete");
            }
            Err(e) => {
                devices.pump_log(&format!("sequence aborted: {e}"));
                self.ports.notify(&format!("ERROR:SEQUENCE {e}"));
            }
        }
        result
    }

    fn run_steps(&self, command: &str, template: &Template) -> Result<()> {
        self.prelude()?;

        let mut open = false;
        for step in template.steps() {
            match *step {
                Step::Rinse(n) => self.rinse(n)?,
                Step::Command => {
                    if open {
                        self.log_operation(command, Phase::End);
                    }
                    self.command_step(command)?;
                    open = true;
                }
                Step::Pump(n) => self.pump(n)?,
            }
        }
        if open {
            self.log_operation(command, Phase::End);
        }

        self.postlude()
    }

    // ── Phases ────────────────────────────────────────────────

    fn prelude(&self) -> Result<()> {
        let devices = self.ports.devices;
        self.ports.notify("Homing valves");
        devices.command(Channel::Actuator, VALVE_HOME)?;
        self.ports.notify("Initialising pump");
        devices.command(Channel::Pump, PUMP_INIT)?;
        devices.poll_until_ready(self.config.init_poll)?;
        self.ports.notify("Pump initialised");
        Ok(())
    }

    fn rinse(&self, strokes: u32) -> Result<()> {
        if strokes == 0 {
            return Ok(());
        }
        let devices = self.ports.devices;
        self.ports.notify("Selecting rinse port");
        devices.command(Channel::Actuator, RINSE_PORT)?;
        self.ports.time.sleep_ms(self.config.settle_ms);

        for i in 1..=strokes {
            self.ports.notify(&format!("Rinse {i}/{strokes}"));
            devices.command(Channel::Pump, PUMP_STROKE)?;
            devices.poll_until_ready(self.config.rinse_poll)?;
            devices.pump_log(&format!("rinse {i}/{strokes} complete"));
        }
        self.ports.notify("Rinse complete");
        Ok(())
    }

    fn command_step(&self, command: &str) -> Result<()> {
        self.log_operation(command, Phase::Start);
        self.ports.notify(&format!("Executing command: {command}"));
        self.ports.devices.command(Channel::Actuator, command)?;
        self.ports.time.sleep_ms(self.config.settle_ms);
        self.ports.notify("Valves set");
        Ok(())
    }

    fn pump(&self, requested: u32) -> Result<()> {
        let max = u32::from(self.config.max_pump_cycles.min(PUMP_CYCLE_LIMIT));
        let cycles = if requested > max {
            warn!("PUMP {} exceeds the {} cycle limit", requested, max);
            self.ports
                .notify(&format!("WARNING: PUMP {requested} clamped to {max} cycles"));
            max
        } else {
            requested
        };

        let devices = self.ports.devices;
        self.ports
            .notify(&format!("Starting pump sequence ({cycles} cycles)"));
        for i in 1..=cycles {
            match devices.query_pump_status() {
                Ok(status) if status.is_fault() => {
                    devices.pump_log(&format!("cycle {i}: pre-check fault, {status}"));
                    return Err(DeviceError::Fault(status.error_code).into());
                }
                Ok(_) => {}
                Err(e) => devices.pump_log(&format!("cycle {i}: pre-check failed, {e}")),
            }

            if self.config.frame_audit {
                devices.send_and_validate(Channel::Pump, PUMP_STROKE, Some(i))?;
            } else {
                devices.command(Channel::Pump, PUMP_STROKE)?;
            }
            devices.poll_until_ready(self.config.pump_poll)?;
            devices.pump_log(&format!("cycle {i}/{cycles} complete"));
            self.ports.notify(&format!("Pump cycle {i}/{cycles}"));
        }
        self.ports.notify("Pumping complete");
        Ok(())
    }

    fn postlude(&self) -> Result<()> {
        self.ports.notify("Resetting valves");
        self.ports.devices.command(Channel::Actuator, VALVE_HOME)?;
        Ok(())
    }

    fn log_operation(&self, command: &str, phase: Phase) {
        let line = operation_line(self.ports.clock.now(), command, phase);
        info!("{}", line);
        if let Err(e) = self
            .ports
            .files
            .append_line(&self.config.operation_log_file, &line)
        {
            warn!("Operation log write failed: {}", e);
        }
    }
}
