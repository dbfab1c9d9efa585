//! LED devices: a single [`IndicatorLight`] and a [`LightTower`] of several.

use serde::{Deserialize, Serialize};
use serde_json::json;
use wheelhouse_hal::{Led, PinArbiter, PwmSettings};
use wheelhouse_middleware::{Driver, Mailbox};
use wheelhouse_types::{BotError, OwnerToken, Payload};

fn default_led_frequency() -> f64 {
    1.0
}

fn default_duty_cycle() -> f64 {
    100.0
}

fn default_flash_seconds() -> f64 {
    5.0
}

fn default_roll_time() -> f64 {
    1.0
}

fn flash_delay_ms(seconds: f64) -> Result<u64, BotError> {
    if !(seconds >= 0.0 && seconds.is_finite()) {
        return Err(BotError::Configuration(format!(
            "cannot flash for {seconds} seconds"
        )));
    }
    Ok((seconds * 1000.0).round() as u64)
}

// ─────────────────────────────────────────────────────────────────────────────
// IndicatorLight
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorLightConfig {
    pub name: String,
    pub line: u8,
    #[serde(default = "default_led_frequency")]
    pub frequency: f64,
    #[serde(default = "default_duty_cycle")]
    pub duty_cycle: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightCommand {
    On,
    Off,
    Flip,
    /// Turn on now and schedule `off` after `seconds_to_flash`.
    Flash {
        #[serde(default = "default_flash_seconds")]
        seconds_to_flash: f64,
    },
    Duty { duty_cycle: f64 },
    Freq { frequency: f64 },
}

pub struct IndicatorLight {
    led: Led,
}

impl IndicatorLight {
    pub fn new(arbiter: &PinArbiter, config: &IndicatorLightConfig) -> Self {
        let pwm = PwmSettings {
            frequency: config.frequency,
            duty_cycle: config.duty_cycle,
        };
        Self {
            led: Led::new(arbiter, config.line, pwm),
        }
    }

    pub fn is_lit(&self) -> bool {
        self.led.is_lit()
    }
}

impl Driver for IndicatorLight {
    type Command = LightCommand;

    fn execute(&mut self, command: LightCommand, owner: OwnerToken, mailbox: &Mailbox) -> Result<(), BotError> {
        match command {
            LightCommand::On => self.led.on(owner),
            LightCommand::Off => self.led.off(owner),
            LightCommand::Flip => self.led.flip(owner),
            LightCommand::Flash { seconds_to_flash } => {
                let delay = flash_delay_ms(seconds_to_flash)?;
                self.led.on(owner)?;
                mailbox.schedule("off", delay);
                Ok(())
            }
            LightCommand::Duty { duty_cycle } => self.led.set_duty_cycle(duty_cycle, owner),
            LightCommand::Freq { frequency } => self.led.set_frequency(frequency, owner),
        }
    }

    fn stop(&mut self, owner: OwnerToken) -> Result<(), BotError> {
        self.led.shutdown(owner)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LightTower
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightTowerConfig {
    pub name: String,
    /// One line per LED, bottom to top.
    pub lines: Vec<u8>,
    #[serde(default = "default_led_frequency")]
    pub frequency: f64,
    #[serde(default = "default_duty_cycle")]
    pub duty_cycle: f64,
}

/// Tower commands. `led_number` picks one LED by position; absent means all.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TowerCommand {
    On {
        #[serde(default)]
        led_number: Option<usize>,
    },
    Off {
        #[serde(default)]
        led_number: Option<usize>,
    },
    Flip {
        #[serde(default)]
        led_number: Option<usize>,
    },
    Flash {
        #[serde(default)]
        led_number: Option<usize>,
        #[serde(default = "default_flash_seconds")]
        seconds_to_flash: f64,
    },
    Duty {
        #[serde(default)]
        led_number: Option<usize>,
        #[serde(default = "default_duty_cycle")]
        duty_cycle: f64,
    },
    Freq {
        #[serde(default)]
        led_number: Option<usize>,
        #[serde(default = "default_led_frequency")]
        frequency: f64,
    },
    /// Light one LED, then schedule the next step after `roll_time` seconds.
    Roll {
        #[serde(default = "default_roll_time")]
        roll_time: f64,
        #[serde(default)]
        starting_led: usize,
    },
    /// End a roll at its next step.
    #[serde(rename = "stoproll")]
    StopRoll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RollState {
    #[default]
    Idle,
    Rolling,
    Stopping,
}

pub struct LightTower {
    leds: Vec<Led>,
    roll: RollState,
}

impl LightTower {
    pub fn new(arbiter: &PinArbiter, config: &LightTowerConfig) -> Result<Self, BotError> {
        if config.lines.is_empty() {
            return Err(BotError::Configuration(format!(
                "light tower {} has no lines",
                config.name
            )));
        }
        let pwm = PwmSettings {
            frequency: config.frequency,
            duty_cycle: config.duty_cycle,
        };
        Ok(Self {
            leds: config
                .lines
                .iter()
                .map(|&line| Led::new(arbiter, line, pwm))
                .collect(),
            roll: RollState::Idle,
        })
    }

    pub fn lit(&self) -> Vec<bool> {
        self.leds.iter().map(Led::is_lit).collect()
    }

    pub fn roll_state(&self) -> RollState {
        self.roll
    }

    /// Apply `f` to the selected LED, or to every LED.
    fn each(
        &mut self,
        led_number: Option<usize>,
        mut f: impl FnMut(&mut Led) -> Result<(), BotError>,
    ) -> Result<(), BotError> {
        match led_number {
            Some(index) => {
                let count = self.leds.len();
                let led = self.leds.get_mut(index).ok_or_else(|| {
                    BotError::Configuration(format!("no led {index}; tower has {count}"))
                })?;
                f(led)
            }
            None => self.leds.iter_mut().try_for_each(f),
        }
    }

    fn roll_step(&mut self, roll_time: f64, starting_led: usize, owner: OwnerToken, mailbox: &Mailbox) -> Result<(), BotError> {
        let delay = flash_delay_ms(roll_time)?;
        if starting_led >= self.leds.len() {
            return Err(BotError::Configuration(format!(
                "no led {starting_led}; tower has {}",
                self.leds.len()
            )));
        }
        self.each(None, |led| led.off(owner))?;
        if self.roll == RollState::Stopping {
            self.roll = RollState::Idle;
            return Ok(());
        }
        self.roll = RollState::Rolling;
        self.leds[starting_led].on(owner)?;
        let next = (starting_led + 1) % self.leds.len();
        mailbox.schedule(
            Payload::with_args(
                "roll",
                [("roll_time", json!(roll_time)), ("starting_led", json!(next))],
            ),
            delay,
        );
        Ok(())
    }
}

impl Driver for LightTower {
    type Command = TowerCommand;

    fn execute(&mut self, command: TowerCommand, owner: OwnerToken, mailbox: &Mailbox) -> Result<(), BotError> {
        match command {
            TowerCommand::On { led_number } => self.each(led_number, |led| led.on(owner)),
            TowerCommand::Off { led_number } => self.each(led_number, |led| led.off(owner)),
            TowerCommand::Flip { led_number } => self.each(led_number, |led| led.flip(owner)),
            TowerCommand::Flash {
                led_number,
                seconds_to_flash,
            } => {
                let delay = flash_delay_ms(seconds_to_flash)?;
                self.each(led_number, |led| led.on(owner))?;
                let off = match led_number {
                    Some(index) => Payload::with_args("off", [("led_number", json!(index))]),
                    None => Payload::command("off"),
                };
                mailbox.schedule(off, delay);
                Ok(())
            }
            TowerCommand::Duty {
                led_number,
                duty_cycle,
            } => self.each(led_number, |led| led.set_duty_cycle(duty_cycle, owner)),
            TowerCommand::Freq {
                led_number,
                frequency,
            } => self.each(led_number, |led| led.set_frequency(frequency, owner)),
            TowerCommand::Roll {
                roll_time,
                starting_led,
            } => self.roll_step(roll_time, starting_led, owner, mailbox),
            TowerCommand::StopRoll => {
                if self.roll == RollState::Rolling {
                    self.roll = RollState::Stopping;
                }
                Ok(())
            }
        }
    }

    fn stop(&mut self, owner: OwnerToken) -> Result<(), BotError> {
        self.roll = RollState::Idle;
        self.leds
            .iter_mut()
            .map(|led| led.shutdown(owner))
            .fold(Ok(()), Result::and)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use wheelhouse_hal::SimGpio;
    use wheelhouse_middleware::{Device, ManagedDevice};
    use wheelhouse_types::{LineOwner, Message, ROBOT};

    use super::*;

    const A: OwnerToken = OwnerToken::new(11);

    fn tower(lines: Vec<u8>) -> (PinArbiter, LightTower) {
        let arbiter = PinArbiter::new(Arc::new(SimGpio::new()));
        let config = LightTowerConfig {
            name: "tower".to_string(),
            lines,
            frequency: 1.0,
            duty_cycle: 100.0,
        };
        let tower = LightTower::new(&arbiter, &config).unwrap();
        (arbiter, tower)
    }

    #[test]
    fn flash_schedules_off_after_the_requested_seconds() {
        let arbiter = PinArbiter::new(Arc::new(SimGpio::new()));
        let config = IndicatorLightConfig {
            name: "status".to_string(),
            line: 4,
            frequency: 1.0,
            duty_cycle: 100.0,
        };
        let mut light = IndicatorLight::new(&arbiter, &config);
        let mailbox = Mailbox::new("status");

        light
            .execute(LightCommand::Flash { seconds_to_flash: 2.5 }, A, &mailbox)
            .unwrap();

        assert!(light.is_lit());
        let out = mailbox.drain();
        assert_eq!(out.len(), 1);
        assert!(out[0].is_self_addressed());
        assert_eq!(out[0].destination_device, "status");
        assert_eq!(out[0].delay, 2500);
        assert_eq!(out[0].payload, Payload::command("off"));
    }

    #[test]
    fn bare_flash_uses_five_seconds() {
        assert_eq!(
            Payload::command("flash").decode::<LightCommand>().unwrap(),
            LightCommand::Flash { seconds_to_flash: 5.0 }
        );
    }

    #[test]
    fn negative_flash_is_rejected_before_touching_the_led() {
        let arbiter = PinArbiter::new(Arc::new(SimGpio::new()));
        let config = IndicatorLightConfig {
            name: "status".to_string(),
            line: 4,
            frequency: 1.0,
            duty_cycle: 100.0,
        };
        let mut light = IndicatorLight::new(&arbiter, &config);
        let err = light
            .execute(LightCommand::Flash { seconds_to_flash: -1.0 }, A, &Mailbox::new("status"))
            .unwrap_err();
        assert!(matches!(err, BotError::Configuration(_)));
        assert!(!light.is_lit());
        assert_eq!(arbiter.owner(4), LineOwner::Uninitialized);
    }

    #[test]
    fn tower_commands_address_one_or_all_leds() {
        let (_, mut tower) = tower(vec![5, 6, 13]);
        let mailbox = Mailbox::new("tower");

        tower
            .execute(TowerCommand::On { led_number: Some(1) }, A, &mailbox)
            .unwrap();
        assert_eq!(tower.lit(), vec![false, true, false]);

        tower.execute(TowerCommand::Flip { led_number: None }, A, &mailbox).unwrap();
        assert_eq!(tower.lit(), vec![true, false, true]);

        let err = tower
            .execute(TowerCommand::Off { led_number: Some(3) }, A, &mailbox)
            .unwrap_err();
        assert!(matches!(err, BotError::Configuration(_)));
    }

    #[test]
    fn tower_flash_of_one_led_schedules_its_own_off() {
        let (_, mut tower) = tower(vec![5, 6]);
        let mailbox = Mailbox::new("tower");
        tower
            .execute(
                TowerCommand::Flash {
                    led_number: Some(0),
                    seconds_to_flash: 1.0,
                },
                A,
                &mailbox,
            )
            .unwrap();
        let scheduled = &mailbox.drain()[0];
        assert_eq!(
            scheduled.payload,
            Payload::with_args("off", [("led_number", json!(0))])
        );
        assert_eq!(scheduled.delay, 1000);
    }

    #[test]
    fn roll_advances_and_wraps_until_stopped() {
        let (_, mut tower) = tower(vec![5, 6]);
        let mailbox = Mailbox::new("tower");

        tower
            .execute(
                TowerCommand::Roll {
                    roll_time: 0.5,
                    starting_led: 1,
                },
                A,
                &mailbox,
            )
            .unwrap();
        assert_eq!(tower.lit(), vec![false, true]);
        let next = mailbox.drain().remove(0);
        assert_eq!(next.delay, 500);
        let TowerCommand::Roll { starting_led, .. } = next.payload.decode().unwrap() else {
            panic!("expected a roll step");
        };
        assert_eq!(starting_led, 0);

        tower.execute(TowerCommand::StopRoll, A, &mailbox).unwrap();
        assert_eq!(tower.roll_state(), RollState::Stopping);
        tower
            .execute(
                TowerCommand::Roll {
                    roll_time: 0.5,
                    starting_led,
                },
                A,
                &mailbox,
            )
            .unwrap();
        assert_eq!(tower.lit(), vec![false, false]);
        assert_eq!(tower.roll_state(), RollState::Idle);
        assert!(mailbox.is_empty());
    }

    #[test]
    fn empty_tower_is_a_configuration_error() {
        let arbiter = PinArbiter::new(Arc::new(SimGpio::new()));
        let config = LightTowerConfig {
            name: "tower".to_string(),
            lines: vec![],
            frequency: 1.0,
            duty_cycle: 100.0,
        };
        assert!(matches!(
            LightTower::new(&arbiter, &config),
            Err(BotError::Configuration(_))
        ));
    }

    #[test]
    fn stop_uninitializes_every_led() {
        let (arbiter, tower) = tower(vec![5, 6]);
        let mut device = Device::new("tower", tower);
        device.dispatch(
            &Message::new("on").addressed_to(ROBOT, "tower"),
            0,
        );
        assert_eq!(arbiter.owner(5), LineOwner::Free);

        device.stop(A).unwrap();
        assert_eq!(arbiter.owner(5), LineOwner::Uninitialized);
        assert_eq!(arbiter.owner(6), LineOwner::Uninitialized);
    }
}
