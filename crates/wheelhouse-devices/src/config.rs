//! Declarative device descriptions and the factory that builds them.
//!
//! ```toml
//! [[devices]]
//! kind = "cat_steer"
//! name = "tracks"
//! left_forward_line = 5
//! left_reverse_line = 6
//! right_forward_line = 13
//! right_reverse_line = 19
//! max_speed = 5.0
//! ```

use serde::{Deserialize, Serialize};
use tracing::debug;
use wheelhouse_hal::PinArbiter;
use wheelhouse_middleware::{Device, ManagedDevice};
use wheelhouse_serial::PortProvider;
use wheelhouse_types::{BotError, CONTROLLER, ROBOT, WARN};

use crate::cat_steer::{CatSteer, CatSteerConfig};
use crate::drivetrain::{Drivetrain, DrivetrainConfig};
use crate::lights::{IndicatorLight, IndicatorLightConfig, LightTower, LightTowerConfig};
use crate::motor::{MotorConfig, SingleMotor};
use crate::range_finder::{RangeFinder, RangeFinderConfig};

/// Names the bus already uses for routing.
const RESERVED_NAMES: [&str; 4] = [ROBOT, CONTROLLER, WARN, "manager"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeviceConfig {
    IndicatorLight(IndicatorLightConfig),
    LightTower(LightTowerConfig),
    Motor(MotorConfig),
    CatSteer(CatSteerConfig),
    RangeFinder(RangeFinderConfig),
    Drivetrain(DrivetrainConfig),
}

impl DeviceConfig {
    pub fn name(&self) -> &str {
        match self {
            DeviceConfig::IndicatorLight(c) => &c.name,
            DeviceConfig::LightTower(c) => &c.name,
            DeviceConfig::Motor(c) => &c.name,
            DeviceConfig::CatSteer(c) => &c.name,
            DeviceConfig::RangeFinder(c) => &c.name,
            DeviceConfig::Drivetrain(c) => &c.name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DeviceConfig::IndicatorLight(_) => "indicator_light",
            DeviceConfig::LightTower(_) => "light_tower",
            DeviceConfig::Motor(_) => "motor",
            DeviceConfig::CatSteer(_) => "cat_steer",
            DeviceConfig::RangeFinder(_) => "range_finder",
            DeviceConfig::Drivetrain(_) => "drivetrain",
        }
    }

    /// Construct the device. GPIO devices share `arbiter`; serial devices
    /// look for their board through `ports`.
    ///
    /// # Errors
    ///
    /// [`BotError::Configuration`] for an empty or reserved name, or for
    /// calibration values the device rejects.
    pub fn build(&self, arbiter: &PinArbiter, ports: &dyn PortProvider) -> Result<Box<dyn ManagedDevice>, BotError> {
        let name = self.name();
        if name.trim().is_empty() || RESERVED_NAMES.contains(&name) {
            return Err(BotError::Configuration(format!(
                "{} device cannot be called {name:?}",
                self.kind()
            )));
        }
        debug!(device = name, kind = self.kind(), "building device");
        let device = match self {
            DeviceConfig::IndicatorLight(c) => Device::new(name, IndicatorLight::new(arbiter, c)).boxed(),
            DeviceConfig::LightTower(c) => Device::new(name, LightTower::new(arbiter, c)?).boxed(),
            DeviceConfig::Motor(c) => Device::new(name, SingleMotor::new(arbiter, c)).boxed(),
            DeviceConfig::CatSteer(c) => Device::new(name, CatSteer::new(arbiter, c)?).boxed(),
            DeviceConfig::RangeFinder(c) => Device::new(name, RangeFinder::new(arbiter, c)).boxed(),
            DeviceConfig::Drivetrain(c) => Device::new(name, Drivetrain::new(c, ports)?).boxed(),
        };
        Ok(device)
    }
}
