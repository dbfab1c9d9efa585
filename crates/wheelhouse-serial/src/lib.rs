//! `wheelhouse-serial` – the microcontroller side of the robot.
//!
//! # Modules
//!
//! - [`framing`] – escaped separator/terminator command framing
//!   ([`FrameCodec`], incremental [`FrameReader`]).
//! - [`link`] – [`SerialLink`] and [`PortProvider`], with a `serialport`
//!   implementation and an in-memory scripted one.
//! - [`bridge`] – discovery handshake and request/reply calls ([`Bridge`]).

pub mod bridge;
pub mod framing;
pub mod link;

pub use bridge::{Bridge, BridgeConfig, BridgeState, WHO_ARE_YOU};
pub use framing::{Field, Frame, FrameCodec, FrameReader, RETURN_SUFFIX, return_name};
pub use link::{PortProvider, ScriptedDevice, ScriptedPorts, SerialLink, SystemPorts};
