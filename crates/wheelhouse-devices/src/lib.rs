//! # wheelhouse-devices
//!
//! The robot's devices, each a [`Driver`](wheelhouse_middleware::Driver)
//! ready to be wrapped in a [`Device`](wheelhouse_middleware::Device) and
//! loaded into a manager.
//!
//! | Kind | Driver | Hardware |
//! |---|---|---|
//! | `indicator_light` | [`IndicatorLight`] | one LED line |
//! | `light_tower` | [`LightTower`] | several LED lines |
//! | `motor` | [`SingleMotor`] | one H-bridge |
//! | `cat_steer` | [`CatSteer`] | two H-bridges |
//! | `range_finder` | [`RangeFinder`] | trigger and echo lines |
//! | `drivetrain` | [`Drivetrain`] | microcontroller on a serial port |
//!
//! [`DeviceConfig`] describes any of them declaratively and builds the boxed
//! device.

pub mod cat_steer;
pub mod config;
pub mod drivetrain;
pub mod lights;
pub mod motor;
pub mod range_finder;

pub use cat_steer::{CatSteer, CatSteerConfig, SteerCommand};
pub use config::DeviceConfig;
pub use drivetrain::{DriveCommand, DriveState, Drivetrain, DrivetrainConfig};
pub use lights::{
    IndicatorLight, IndicatorLightConfig, LightCommand, LightTower, LightTowerConfig, RollState, TowerCommand,
};
pub use motor::{MotorCommand, MotorConfig, SingleMotor};
pub use range_finder::{RangeCommand, RangeFinder, RangeFinderConfig};
