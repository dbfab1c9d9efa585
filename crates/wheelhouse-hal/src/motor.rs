//! Two-line DC motor driven through an H-bridge.
//!
//! One line is the "forward" input of the bridge, the other the "reverse"
//! input. PWM on exactly one of them spins the motor; PWM on both shorts the
//! windings (brake); no PWM lets it coast.

use serde::{Deserialize, Serialize};
use tracing::debug;
use wheelhouse_types::{BotError, OwnerToken};

use crate::arbiter::{Pin, PinArbiter, PinConfig};
use crate::gpio::PwmSettings;

/// Drive state of a [`Motor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotorState {
    #[default]
    Coast,
    Forward,
    Reverse,
    Brake,
}

/// Composite actuator owning a forward and a reverse line.
///
/// Every operation claims both lines with
/// [`PinArbiter::acquire_all`] before touching either, and releases what it
/// claimed before returning, whether or not it succeeded. A caller that
/// already holds the lines keeps them.
pub struct Motor {
    arbiter: PinArbiter,
    forward: Pin,
    reverse: Pin,
    state: MotorState,
}

impl Motor {
    pub fn new(arbiter: &PinArbiter, forward_line: u8, reverse_line: u8, pwm: PwmSettings) -> Self {
        let config = PinConfig::output().with_pwm(pwm.frequency, pwm.duty_cycle);
        Self {
            arbiter: arbiter.clone(),
            forward: arbiter.pin(forward_line, config),
            reverse: arbiter.pin(reverse_line, config),
            state: MotorState::Coast,
        }
    }

    pub fn state(&self) -> MotorState {
        self.state
    }

    /// `[forward, reverse]` line numbers, in acquisition order.
    pub fn lines(&self) -> [u8; 2] {
        [self.forward.line(), self.reverse.line()]
    }

    fn with_lines<T>(
        &self,
        owner: OwnerToken,
        f: impl FnOnce(&Pin, &Pin) -> Result<T, BotError>,
    ) -> Result<T, BotError> {
        let claimed = self.arbiter.acquire_all(&self.lines(), owner)?;
        let result = f(&self.forward, &self.reverse);
        self.arbiter.release_all(&claimed, owner);
        result
    }

    /// State implied by which lines are currently modulating.
    fn observed_state(&self) -> MotorState {
        match (self.forward.is_pwm_running(), self.reverse.is_pwm_running()) {
            (true, false) => MotorState::Forward,
            (false, true) => MotorState::Reverse,
            (true, true) => MotorState::Brake,
            (false, false) => MotorState::Coast,
        }
    }

    /// Move to `target`. Requesting the current state touches nothing.
    ///
    /// If the transition fails part way, [`Motor::state`] reflects what the
    /// lines are actually doing.
    pub fn drive(&mut self, target: MotorState, owner: OwnerToken) -> Result<(), BotError> {
        if target == self.state {
            return Ok(());
        }
        let outcome = self.with_lines(owner, |forward, reverse| match target {
            MotorState::Forward => {
                reverse.stop_pwm(owner)?;
                forward.start_pwm(owner)
            }
            MotorState::Reverse => {
                forward.stop_pwm(owner)?;
                reverse.start_pwm(owner)
            }
            MotorState::Brake => {
                forward.start_pwm(owner)?;
                reverse.start_pwm(owner)
            }
            MotorState::Coast => {
                forward.stop_pwm(owner)?;
                reverse.stop_pwm(owner)
            }
        });
        if let Err(err) = outcome {
            self.state = self.observed_state();
            debug!(lines = ?self.lines(), target = ?target, state = ?self.state, %err, "motor transition failed");
            return Err(err);
        }
        debug!(lines = ?self.lines(), from = ?self.state, to = ?target, "motor transition");
        self.state = target;
        Ok(())
    }

    pub fn forward(&mut self, owner: OwnerToken) -> Result<(), BotError> {
        self.drive(MotorState::Forward, owner)
    }

    pub fn reverse(&mut self, owner: OwnerToken) -> Result<(), BotError> {
        self.drive(MotorState::Reverse, owner)
    }

    pub fn brake(&mut self, owner: OwnerToken) -> Result<(), BotError> {
        self.drive(MotorState::Brake, owner)
    }

    pub fn coast(&mut self, owner: OwnerToken) -> Result<(), BotError> {
        self.drive(MotorState::Coast, owner)
    }

    /// Set the duty cycle (percent) on both lines, keeping the drive state.
    pub fn set_duty_cycle(&mut self, duty_cycle: f64, owner: OwnerToken) -> Result<(), BotError> {
        if !(0.0..=100.0).contains(&duty_cycle) {
            return Err(BotError::Configuration(format!(
                "duty cycle {duty_cycle} outside 0..=100"
            )));
        }
        self.with_lines(owner, |forward, reverse| {
            forward.set_duty_cycle(duty_cycle, owner)?;
            reverse.set_duty_cycle(duty_cycle, owner)
        })
    }

    /// Set the PWM frequency on both lines, keeping the drive state.
    pub fn set_frequency(&mut self, frequency: f64, owner: OwnerToken) -> Result<(), BotError> {
        self.with_lines(owner, |forward, reverse| {
            forward.set_frequency(frequency, owner)?;
            reverse.set_frequency(frequency, owner)
        })
    }

    /// Force coast, then tear both lines down to `Uninitialized`.
    pub fn shutdown(&mut self, owner: OwnerToken) -> Result<(), BotError> {
        let stopped = self.with_lines(owner, |forward, reverse| {
            forward.stop_pwm(owner)?;
            reverse.stop_pwm(owner)
        });
        self.state = self.observed_state();
        stopped?;
        self.arbiter.shutdown_all(&self.lines(), owner)
    }
}
