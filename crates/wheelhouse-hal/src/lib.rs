//! `wheelhouse-hal` – hardware lines and the drivers built on them.
//!
//! # Modules
//!
//! - [`gpio`] – [`GpioBackend`], the seam to real or simulated hardware.
//! - [`arbiter`] – [`PinArbiter`], the single ownership table every line
//!   goes through, and the [`Pin`] handle.
//! - [`motor`] – two-line H-bridge [`Motor`].
//! - [`led`] – PWM-dimmed [`Led`].
//! - [`rangefinder`] – [`UltrasonicRange`] with an iteration-bounded echo
//!   timeout.
//! - [`sim`] – [`SimGpio`], a recording backend for tests and off-target runs.
//!
//! With the `rpi` feature, `RppalGpio` drives Raspberry Pi BCM lines.

pub mod arbiter;
pub mod gpio;
pub mod led;
pub mod motor;
pub mod rangefinder;
#[cfg(feature = "rpi")]
pub mod rppal_backend;
pub mod sim;

pub use arbiter::{Pin, PinArbiter, PinConfig};
pub use gpio::{Direction, GpioBackend, Level, PwmSettings};
pub use led::{LED_PWM, Led};
pub use motor::{Motor, MotorState};
pub use rangefinder::{DEFAULT_TIMEOUT_ITERATIONS, RANGE_TIMEOUT, UltrasonicRange};
#[cfg(feature = "rpi")]
pub use rppal_backend::RppalGpio;
pub use sim::{GpioOp, SimGpio};
