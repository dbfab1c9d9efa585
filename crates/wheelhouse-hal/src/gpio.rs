//! [`GpioBackend`] – the seam between the arbiter and real hardware.
//!
//! The [`PinArbiter`][crate::arbiter::PinArbiter] is the only caller of a
//! backend. It performs ownership bookkeeping and then delegates the actual
//! line manipulation here, so the same drivers run against
//! [`SimGpio`][crate::sim::SimGpio] in tests and against the Raspberry Pi
//! backend on target.

use serde::{Deserialize, Serialize};
use wheelhouse_types::BotError;

/// Whether a line drives or senses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Input,
    Output,
}

/// Logic level of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Level {
    Low,
    High,
}

/// Pulse-width modulation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PwmSettings {
    /// Hertz.
    pub frequency: f64,
    /// Percentage in `0.0..=100.0`.
    pub duty_cycle: f64,
}

impl Default for PwmSettings {
    fn default() -> Self {
        Self {
            frequency: 50.0,
            duty_cycle: 100.0,
        }
    }
}

/// Low-level line operations. Implementations use interior mutability so a
/// single backend can be shared by every pin through an `Arc`.
pub trait GpioBackend: Send + Sync {
    /// Configure the line's direction. Called once per line lifetime.
    fn setup(&self, line: u8, direction: Direction) -> Result<(), BotError>;

    fn write(&self, line: u8, level: Level) -> Result<(), BotError>;

    fn read(&self, line: u8) -> Result<Level, BotError>;

    /// Start PWM, or reconfigure it if it is already running.
    fn start_pwm(&self, line: u8, pwm: PwmSettings) -> Result<(), BotError>;

    fn stop_pwm(&self, line: u8) -> Result<(), BotError>;

    /// Release the line's hardware configuration.
    fn cleanup(&self, line: u8) -> Result<(), BotError>;
}
