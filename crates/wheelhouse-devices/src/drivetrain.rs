//! Cat-style drivetrain run by a microcontroller over the serial bridge.
//!
//! The firmware understands three commands:
//!
//! | Command | Fields | Reply |
//! |---|---|---|
//! | `who_are_you` | none | `who_are_you_return,<name>` |
//! | `set_speed` | motor 0, motor 1 (rotations per second) | `set_speed_return,<m0>,<m1>` |
//! | `get_speed` | none | `get_speed_return`, six fields; 1 and 4 are the estimates |
//!
//! When no board answers at construction the device stays loaded but every
//! command just warns that it is not connected.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use wheelhouse_middleware::{Driver, Mailbox};
use wheelhouse_serial::{Bridge, BridgeConfig, Field, PortProvider};
use wheelhouse_types::{BotError, OwnerToken, Payload};

const SET_SPEED: &str = "set_speed";
const GET_SPEED: &str = "get_speed";

fn default_min_speed() -> f64 {
    0.0
}

fn default_max_speed() -> f64 {
    2.0
}

fn default_user_unit_to_rps() -> f64 {
    0.7596357
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrivetrainConfig {
    pub name: String,
    pub serial: BridgeConfig,
    #[serde(default = "default_min_speed")]
    pub min_speed: f64,
    #[serde(default = "default_max_speed")]
    pub max_speed: f64,
    /// Wheel rotations per second for one user speed unit.
    #[serde(default = "default_user_unit_to_rps")]
    pub user_unit_to_rps: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriveCommand {
    Forward,
    Reverse,
    Left,
    Right,
    Brake,
    Coast,
    #[serde(rename = "setspeed")]
    SetSpeed { speed: f64 },
    #[serde(rename = "getspeed")]
    GetSpeed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriveState {
    #[default]
    Coast,
    Forward,
    Reverse,
    Left,
    Right,
    Brake,
}

pub struct Drivetrain {
    name: String,
    bridge: Bridge,
    state: DriveState,
    /// Requested speed in rotations per second.
    set_speed: f64,
    min_speed: f64,
    max_speed: f64,
    user_unit_to_rps: f64,
}

impl Drivetrain {
    pub fn new(config: &DrivetrainConfig, ports: &dyn PortProvider) -> Result<Self, BotError> {
        if !(config.user_unit_to_rps > 0.0) || config.min_speed > config.max_speed {
            return Err(BotError::Configuration(format!(
                "drivetrain {}: bad speed calibration",
                config.name
            )));
        }
        Ok(Self {
            name: config.name.clone(),
            bridge: Bridge::connect(config.serial.clone(), ports),
            state: DriveState::Coast,
            set_speed: 0.0,
            min_speed: config.min_speed,
            max_speed: config.max_speed,
            user_unit_to_rps: config.user_unit_to_rps,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.bridge.is_bound()
    }

    pub fn state(&self) -> DriveState {
        self.state
    }

    /// Requested speed in user units.
    pub fn user_speed(&self) -> f64 {
        self.set_speed / self.user_unit_to_rps
    }

    fn motor_speeds(&self, state: DriveState) -> (f64, f64) {
        let s = self.set_speed;
        match state {
            DriveState::Forward => (s, s),
            DriveState::Reverse => (-s, -s),
            DriveState::Left => (-s, s),
            DriveState::Right => (s, -s),
            DriveState::Brake | DriveState::Coast => (0.0, 0.0),
        }
    }

    fn send_speeds(&mut self, m0: f64, m1: f64, mailbox: &Mailbox) -> Result<(), BotError> {
        let reply = match self.bridge.call(SET_SPEED, &[Field::Float(m0), Field::Float(m1)]) {
            Ok(reply) => reply,
            Err(BotError::Communication(details)) => {
                warn!(device = %self.name, %details, "set_speed not acknowledged");
                mailbox.warn(format!(
                    "Received unexpected reply when setting speed ({details})."
                ));
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        let echoed = |i: usize| reply.field(i).and_then(Field::as_f64);
        match (echoed(0), echoed(1)) {
            (Some(a), Some(b)) => mailbox.report(format!(
                "Set speed to {}, {}",
                a / self.user_unit_to_rps,
                b / self.user_unit_to_rps
            )),
            _ => mailbox.warn(format!(
                "Received unexpected reply when setting speed ({reply})."
            )),
        }
        Ok(())
    }

    fn apply(&mut self, state: DriveState, mailbox: &Mailbox) -> Result<(), BotError> {
        self.state = state;
        let (m0, m1) = self.motor_speeds(state);
        self.send_speeds(m0, m1, mailbox)
    }

    fn change_speed(&mut self, speed: f64, mailbox: &Mailbox) -> Result<(), BotError> {
        if speed < self.min_speed || speed > self.max_speed || speed.is_nan() {
            warn!(device = %self.name, speed, "rejecting speed");
            mailbox.warn(format!("speed {speed:.3} is invalid"));
            mailbox.schedule(Payload::with_args("setspeed", [("speed", json!(0))]), 0);
            return Ok(());
        }
        self.set_speed = speed * self.user_unit_to_rps;
        self.apply(self.state, mailbox)
    }

    fn report_speed(&mut self, mailbox: &Mailbox) -> Result<(), BotError> {
        match self.bridge.call(GET_SPEED, &[]) {
            Ok(reply) => {
                let field = |i: usize| reply.field(i).and_then(Field::as_f64);
                match (field(1), field(4)) {
                    (Some(m0), Some(m1)) => {
                        mailbox.report(format!("Estimated motor speeds: {m0:.3} {m1:.3}"))
                    }
                    _ => mailbox.warn(format!(
                        "Received unexpected reply when getting speed ({reply})."
                    )),
                }
                Ok(())
            }
            Err(BotError::Communication(details)) => {
                mailbox.warn(format!(
                    "Received unexpected reply when getting speed ({details})."
                ));
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

impl Driver for Drivetrain {
    type Command = DriveCommand;

    fn execute(&mut self, command: DriveCommand, _owner: OwnerToken, mailbox: &Mailbox) -> Result<(), BotError> {
        if !self.bridge.is_bound() {
            mailbox.warn(format!("{} is not connected", self.name));
            return Ok(());
        }
        match command {
            DriveCommand::Forward => self.apply(DriveState::Forward, mailbox),
            DriveCommand::Reverse => self.apply(DriveState::Reverse, mailbox),
            DriveCommand::Left => self.apply(DriveState::Left, mailbox),
            DriveCommand::Right => self.apply(DriveState::Right, mailbox),
            DriveCommand::Brake => self.apply(DriveState::Brake, mailbox),
            DriveCommand::Coast => self.apply(DriveState::Coast, mailbox),
            DriveCommand::SetSpeed { speed } => self.change_speed(speed, mailbox),
            DriveCommand::GetSpeed => self.report_speed(mailbox),
        }
    }

    fn stop(&mut self, _owner: OwnerToken) -> Result<(), BotError> {
        if !self.bridge.is_bound() {
            return Ok(());
        }
        self.state = DriveState::Coast;
        self.bridge.call(SET_SPEED, &[Field::Float(0.0), Field::Float(0.0)])?;
        Ok(())
    }

    fn on_attach(&mut self, mailbox: &Mailbox) {
        let config = self.bridge.config();
        match self.bridge.port() {
            Some(port) => {
                info!(device = %self.name, port, "drivetrain attached");
                mailbox.report(format!(
                    "{} connected on {port} at {} baud.",
                    config.internal_device_name, config.baud_rate
                ));
                if let Err(err) = self.apply(DriveState::Coast, mailbox) {
                    warn!(device = %self.name, %err, "initial coast failed");
                }
            }
            None => mailbox.warn(format!(
                "Could not find usb device identifying as {}",
                config.internal_device_name
            )),
        }
    }
}
