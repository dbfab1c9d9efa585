//! A single H-bridge motor exposed as a device.

use serde::{Deserialize, Serialize};
use wheelhouse_hal::{Motor, MotorState, PinArbiter, PwmSettings};
use wheelhouse_middleware::{Driver, Mailbox};
use wheelhouse_types::{BotError, OwnerToken};

fn default_motor_frequency() -> f64 {
    50.0
}

fn default_motor_duty() -> f64 {
    100.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotorConfig {
    pub name: String,
    pub forward_line: u8,
    pub reverse_line: u8,
    #[serde(default = "default_motor_frequency")]
    pub frequency: f64,
    #[serde(default = "default_motor_duty")]
    pub duty_cycle: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotorCommand {
    Forward,
    Reverse,
    Brake,
    Coast,
    #[serde(rename = "set_dutycycle")]
    SetDutyCycle { duty_cycle: f64 },
    SetFreq { frequency: f64 },
}

pub struct SingleMotor {
    motor: Motor,
}

impl SingleMotor {
    pub fn new(arbiter: &PinArbiter, config: &MotorConfig) -> Self {
        let pwm = PwmSettings {
            frequency: config.frequency,
            duty_cycle: config.duty_cycle,
        };
        Self {
            motor: Motor::new(arbiter, config.forward_line, config.reverse_line, pwm),
        }
    }

    pub fn state(&self) -> MotorState {
        self.motor.state()
    }
}

impl Driver for SingleMotor {
    type Command = MotorCommand;

    fn execute(&mut self, command: MotorCommand, owner: OwnerToken, _mailbox: &Mailbox) -> Result<(), BotError> {
        match command {
            MotorCommand::Forward => self.motor.forward(owner),
            MotorCommand::Reverse => self.motor.reverse(owner),
            MotorCommand::Brake => self.motor.brake(owner),
            MotorCommand::Coast => self.motor.coast(owner),
            MotorCommand::SetDutyCycle { duty_cycle } => self.motor.set_duty_cycle(duty_cycle, owner),
            MotorCommand::SetFreq { frequency } => self.motor.set_frequency(frequency, owner),
        }
    }

    fn stop(&mut self, owner: OwnerToken) -> Result<(), BotError> {
        self.motor.shutdown(owner)
    }
}
