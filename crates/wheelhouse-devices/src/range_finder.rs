use serde::{Deserialize, Serialize};
use tracing::debug;
use wheelhouse_hal::{DEFAULT_TIMEOUT_ITERATIONS, PinArbiter, RANGE_TIMEOUT, UltrasonicRange};
use wheelhouse_middleware::{Driver, Mailbox};
use wheelhouse_types::{BotError, OwnerToken};

fn default_timeout_iterations() -> u32 {
    DEFAULT_TIMEOUT_ITERATIONS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeFinderConfig {
    pub name: String,
    pub trigger_line: u8,
    pub echo_line: u8,
    #[serde(default = "default_timeout_iterations")]
    pub timeout_iterations: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeCommand {
    /// Take one reading and report it in metres.
    Get,
}

pub struct RangeFinder {
    sensor: UltrasonicRange,
}

impl RangeFinder {
    pub fn new(arbiter: &PinArbiter, config: &RangeFinderConfig) -> Self {
        Self {
            sensor: UltrasonicRange::new(
                arbiter,
                config.trigger_line,
                config.echo_line,
                config.timeout_iterations,
            ),
        }
    }
}

impl Driver for RangeFinder {
    type Command = RangeCommand;

    fn execute(&mut self, command: RangeCommand, owner: OwnerToken, mailbox: &Mailbox) -> Result<(), BotError> {
        match command {
            RangeCommand::Get => {
                let distance = self.sensor.measure(owner)?;
                if distance == RANGE_TIMEOUT {
                    debug!(lines = ?self.sensor.lines(), "no echo");
                    mailbox.warn("range finder timed out");
                } else {
                    mailbox.report(format!("{distance:.12}"));
                }
                Ok(())
            }
        }
    }

    fn stop(&mut self, owner: OwnerToken) -> Result<(), BotError> {
        self.sensor.shutdown(owner)
    }
}
