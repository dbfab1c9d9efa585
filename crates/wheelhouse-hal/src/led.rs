//! Single PWM-dimmed LED.

use wheelhouse_types::{BotError, OwnerToken};

use crate::arbiter::{Pin, PinArbiter, PinConfig};
use crate::gpio::PwmSettings;

/// Default LED PWM: 1 Hz at full duty, i.e. steadily lit.
pub const LED_PWM: PwmSettings = PwmSettings {
    frequency: 1.0,
    duty_cycle: 100.0,
};

/// An LED on one output line. Lit means PWM is running.
pub struct Led {
    pin: Pin,
    lit: bool,
}

impl Led {
    pub fn new(arbiter: &PinArbiter, line: u8, pwm: PwmSettings) -> Self {
        Self {
            pin: arbiter.pin(line, PinConfig::output().with_pwm(pwm.frequency, pwm.duty_cycle)),
            lit: false,
        }
    }

    pub fn line(&self) -> u8 {
        self.pin.line()
    }

    pub fn is_lit(&self) -> bool {
        self.lit
    }

    pub fn on(&mut self, owner: OwnerToken) -> Result<(), BotError> {
        if self.lit {
            return Ok(());
        }
        self.pin.with_claim(owner, |pin| pin.start_pwm(owner))?;
        self.lit = true;
        Ok(())
    }

    pub fn off(&mut self, owner: OwnerToken) -> Result<(), BotError> {
        if !self.lit {
            return Ok(());
        }
        self.pin.with_claim(owner, |pin| pin.stop_pwm(owner))?;
        self.lit = false;
        Ok(())
    }

    pub fn flip(&mut self, owner: OwnerToken) -> Result<(), BotError> {
        if self.lit { self.off(owner) } else { self.on(owner) }
    }

    pub fn set_duty_cycle(&mut self, duty_cycle: f64, owner: OwnerToken) -> Result<(), BotError> {
        self.pin
            .with_claim(owner, |pin| pin.set_duty_cycle(duty_cycle, owner))
    }

    pub fn set_frequency(&mut self, frequency: f64, owner: OwnerToken) -> Result<(), BotError> {
        self.pin
            .with_claim(owner, |pin| pin.set_frequency(frequency, owner))
    }

    /// Turn off and tear the line down.
    pub fn shutdown(&mut self, owner: OwnerToken) -> Result<(), BotError> {
        self.lit = false;
        self.pin.shutdown(owner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::sim::{GpioOp, SimGpio};
    use wheelhouse_types::LineOwner;

    const A: OwnerToken = OwnerToken::new(5);

    #[test]
    fn on_is_idempotent_and_flip_toggles() {
        let sim = Arc::new(SimGpio::new());
        let arbiter = PinArbiter::new(sim.clone());
        let mut led = Led::new(&arbiter, 21, LED_PWM);

        led.on(A).unwrap();
        led.on(A).unwrap();
        assert_eq!(sim.pwm_ops(), vec![GpioOp::StartPwm(21, LED_PWM)]);

        led.flip(A).unwrap();
        assert!(!led.is_lit());
        assert_eq!(sim.pwm_ops().last(), Some(&GpioOp::StopPwm(21)));
        assert_eq!(arbiter.owner(21), LineOwner::Free);
    }

    #[test]
    fn contended_led_stays_dark() {
        let sim = Arc::new(SimGpio::new());
        let arbiter = PinArbiter::new(sim.clone());
        let mut led = Led::new(&arbiter, 21, LED_PWM);
        arbiter.acquire(21, OwnerToken::new(9)).unwrap();

        assert!(led.on(A).is_err());
        assert!(!led.is_lit());
        assert!(sim.pwm_ops().is_empty());
    }

    #[test]
    fn shutdown_resets_line() {
        let sim = Arc::new(SimGpio::new());
        let arbiter = PinArbiter::new(sim.clone());
        let mut led = Led::new(&arbiter, 21, LED_PWM);
        led.on(A).unwrap();
        led.shutdown(A).unwrap();

        assert!(!led.is_lit());
        assert_eq!(arbiter.owner(21), LineOwner::Uninitialized);
        assert_eq!(sim.ops().last(), Some(&GpioOp::Cleanup(21)));
    }
}
