//! HC-SR04 style ultrasonic rangefinder on a trigger and an echo line.
//!
//! A 10 µs pulse on the trigger makes the module emit a ping; the echo line
//! then stays high for as long as the sound took to come back. Both waits are
//! bounded by a number of polling iterations, not by wall-clock time, so a
//! loaded system times out after the same number of samples as an idle one.

use std::thread;
use std::time::{Duration, Instant};

use tracing::trace;
use wheelhouse_types::{BotError, OwnerToken};

use crate::arbiter::{Pin, PinArbiter, PinConfig};
use crate::gpio::Level;

/// Returned by [`UltrasonicRange::measure`] when the echo never arrives or
/// never ends.
pub const RANGE_TIMEOUT: f64 = -1.0;

/// Polling iterations allowed for each of the two echo edges.
pub const DEFAULT_TIMEOUT_ITERATIONS: u32 = 5000;

const TRIGGER_PULSE: Duration = Duration::from_micros(10);

/// Metres per second, halved for the round trip.
const HALF_SPEED_OF_SOUND: f64 = 340.0 / 2.0;

pub struct UltrasonicRange {
    arbiter: PinArbiter,
    trigger: Pin,
    echo: Pin,
    timeout_iterations: u32,
}

impl UltrasonicRange {
    pub fn new(arbiter: &PinArbiter, trigger_line: u8, echo_line: u8, timeout_iterations: u32) -> Self {
        Self {
            arbiter: arbiter.clone(),
            trigger: arbiter.pin(trigger_line, PinConfig::output()),
            echo: arbiter.pin(echo_line, PinConfig::input()),
            timeout_iterations,
        }
    }

    pub fn lines(&self) -> [u8; 2] {
        [self.trigger.line(), self.echo.line()]
    }

    /// Distance to the target in metres, or [`RANGE_TIMEOUT`].
    ///
    /// Claims both lines for the duration of the measurement.
    pub fn measure(&self, owner: OwnerToken) -> Result<f64, BotError> {
        let claimed = self.arbiter.acquire_all(&self.lines(), owner)?;
        let result = self.ping(owner);
        self.arbiter.release_all(&claimed, owner);
        result
    }

    fn ping(&self, owner: OwnerToken) -> Result<f64, BotError> {
        self.trigger.set_high(owner)?;
        thread::sleep(TRIGGER_PULSE);
        self.trigger.set_low(owner)?;

        let Some(start) = self.wait_while(Level::Low, owner)? else {
            trace!(line = self.echo.line(), "echo never rose");
            return Ok(RANGE_TIMEOUT);
        };
        let Some(stop) = self.wait_while(Level::High, owner)? else {
            trace!(line = self.echo.line(), "echo never fell");
            return Ok(RANGE_TIMEOUT);
        };
        Ok(stop.saturating_duration_since(start).as_secs_f64() * HALF_SPEED_OF_SOUND)
    }

    /// Poll the echo line while it reads `level`, at most `timeout_iterations`
    /// times. Returns the time of the last sample at that level, or `None`
    /// when every budgeted sample read `level`.
    fn wait_while(&self, level: Level, owner: OwnerToken) -> Result<Option<Instant>, BotError> {
        let mut last = Instant::now();
        let mut iterations = 0;
        while iterations < self.timeout_iterations && self.echo.read(owner)? == level {
            last = Instant::now();
            iterations += 1;
        }
        if iterations == self.timeout_iterations {
            return Ok(None);
        }
        Ok(Some(last))
    }

    pub fn shutdown(&self, owner: OwnerToken) -> Result<(), BotError> {
        self.arbiter.shutdown_all(&self.lines(), owner)
    }
}
