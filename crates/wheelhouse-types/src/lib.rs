//! `wheelhouse-types` – shared vocabulary of the Wheelhouse robot runtime.
//!
//! Every other crate in the workspace speaks in these types:
//!
//! - [`Message`] / [`Payload`] – the addressed, timestamped unit that moves
//!   across the bus, plus its JSON wire form.
//! - [`OwnerToken`] – the per-command credential used to claim hardware lines.
//! - [`ManagerId`] – identity of the [`DeviceManager`] a device is bound to.
//! - [`LineOwner`] – the tri-state ownership of a single physical line.
//! - [`BotError`] – the recoverable error taxonomy.
//!
//! [`DeviceManager`]: https://docs.rs/wheelhouse-middleware

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod message;

pub use message::{now_ms, Args, Message, Payload, CONTROLLER, ROBOT, WARN};

/// Largest value an [`OwnerToken`] may take (tokens are 63-bit).
pub const MAX_TOKEN: u64 = (1 << 63) - 1;

/// Credential that identifies who is currently driving a hardware line.
///
/// Every command carries one (its message id), so the lines touched while
/// executing that command are owned by the command itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerToken(u64);

impl OwnerToken {
    /// Wrap a raw token, truncating it to 63 bits.
    pub const fn new(raw: u64) -> Self {
        Self(raw & MAX_TOKEN)
    }

    /// Draw a fresh random 63-bit token.
    pub fn random() -> Self {
        Self(rand::random::<u64>() >> 1)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for OwnerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a device manager. Devices remember which manager claimed them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ManagerId(Uuid);

impl ManagerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ManagerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ManagerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ownership state of one physical line in the arbiter table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LineOwner {
    /// Hardware has never been configured (or was torn down).
    Uninitialized,
    /// Configured and available to any owner.
    Free,
    /// Held exclusively by the given token.
    Owned(OwnerToken),
}

impl fmt::Display for LineOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineOwner::Uninitialized => write!(f, "nobody (uninitialized)"),
            LineOwner::Free => write!(f, "nobody (free)"),
            LineOwner::Owned(token) => write!(f, "{token}"),
        }
    }
}

/// Error taxonomy for the runtime.
///
/// Every variant is recoverable: the device boundary converts these into
/// `warn` messages on the bus instead of letting them reach the manager.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BotError {
    /// Two owners contended for the same line.
    #[error("line {line} owned by {current}, not {requested}")]
    Ownership {
        line: u8,
        current: LineOwner,
        requested: OwnerToken,
    },

    /// The request makes no sense for the line's present hardware state.
    #[error("hardware conflict on line {line}: {details}")]
    HardwareConflict { line: u8, details: String },

    /// Bad device list, duplicate name, or invalid device argument.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Serial timeout, unexpected reply, or unreachable microcontroller.
    #[error("communication error: {0}")]
    Communication(String),

    /// Malformed wire message or mangled command payload.
    #[error("malformed message: {0}")]
    MessageFormat(String),

    /// The hardware backend itself failed (e.g. the GPIO device is missing).
    #[error("hardware fault on {component}: {details}")]
    Hardware { component: String, details: String },
}

impl BotError {
    /// Shorthand for an ownership failure.
    pub fn ownership(line: u8, current: LineOwner, requested: OwnerToken) -> Self {
        BotError::Ownership {
            line,
            current,
            requested,
        }
    }

    /// Every taxonomy member can be retried or reported. Fatal conditions are
    /// panics, never `BotError`s.
    pub fn is_recoverable(&self) -> bool {
        true
    }
}
