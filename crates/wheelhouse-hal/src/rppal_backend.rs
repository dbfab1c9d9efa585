//! Raspberry Pi GPIO backend (feature `rpi`). Lines are BCM numbers.
//!
//! PWM is software PWM driven by rppal's per-pin thread.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rppal::gpio::{Gpio, InputPin, OutputPin};
use wheelhouse_types::BotError;

use crate::gpio::{Direction, GpioBackend, Level, PwmSettings};

enum LineHandle {
    Output(OutputPin),
    Input(InputPin),
}

pub struct RppalGpio {
    gpio: Gpio,
    lines: Mutex<HashMap<u8, LineHandle>>,
}

fn fault(line: u8, err: impl std::fmt::Display) -> BotError {
    BotError::Hardware {
        component: format!("gpio{line}"),
        details: err.to_string(),
    }
}

impl RppalGpio {
    /// Open `/dev/gpiomem`.
    pub fn open() -> Result<Self, BotError> {
        let gpio = Gpio::new().map_err(|e| BotError::Hardware {
            component: "gpio".to_string(),
            details: e.to_string(),
        })?;
        Ok(Self {
            gpio,
            lines: Mutex::new(HashMap::new()),
        })
    }

    fn lines(&self) -> MutexGuard<'_, HashMap<u8, LineHandle>> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_output<T>(
        &self,
        line: u8,
        f: impl FnOnce(&mut OutputPin) -> Result<T, rppal::gpio::Error>,
    ) -> Result<T, BotError> {
        match self.lines().get_mut(&line) {
            Some(LineHandle::Output(pin)) => f(pin).map_err(|e| fault(line, e)),
            Some(LineHandle::Input(_)) => Err(fault(line, "configured as input")),
            None => Err(fault(line, "not set up")),
        }
    }
}

impl GpioBackend for RppalGpio {
    fn setup(&self, line: u8, direction: Direction) -> Result<(), BotError> {
        let pin = self.gpio.get(line).map_err(|e| fault(line, e))?;
        let handle = match direction {
            Direction::Output => LineHandle::Output(pin.into_output_low()),
            Direction::Input => LineHandle::Input(pin.into_input()),
        };
        self.lines().insert(line, handle);
        Ok(())
    }

    fn write(&self, line: u8, level: Level) -> Result<(), BotError> {
        self.with_output(line, |pin| {
            match level {
                Level::Low => pin.set_low(),
                Level::High => pin.set_high(),
            }
            Ok(())
        })
    }

    fn read(&self, line: u8) -> Result<Level, BotError> {
        match self.lines().get(&line) {
            Some(LineHandle::Input(pin)) => Ok(if pin.is_high() { Level::High } else { Level::Low }),
            Some(LineHandle::Output(_)) => Err(fault(line, "configured as output")),
            None => Err(fault(line, "not set up")),
        }
    }

    fn start_pwm(&self, line: u8, pwm: PwmSettings) -> Result<(), BotError> {
        self.with_output(line, |pin| {
            pin.set_pwm_frequency(pwm.frequency, pwm.duty_cycle / 100.0)
        })
    }

    fn stop_pwm(&self, line: u8) -> Result<(), BotError> {
        self.with_output(line, |pin| pin.clear_pwm())
    }

    fn cleanup(&self, line: u8) -> Result<(), BotError> {
        // Dropping the handle restores the pin's original mode.
        self.lines().remove(&line);
        Ok(())
    }
}
