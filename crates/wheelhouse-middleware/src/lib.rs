//! `wheelhouse-middleware` – moves messages between the operator and the
//! devices.
//!
//! # Modules
//!
//! - [`mailbox`] – [`Mailbox`], a device's ordered outbound queue.
//! - [`device`] – the [`Driver`] seam and the [`Device`] wrapper that turns
//!   payloads into typed commands and failures into warnings.
//! - [`retry`] – [`RetryGuard`], bounded exponential backoff for failed
//!   commands.
//! - [`manager`] – [`DeviceManager`], the registry plus the polling dispatch
//!   loop, and its [`ExternalPort`].

pub mod device;
pub mod mailbox;
pub mod manager;
pub mod retry;

pub use device::{Device, Driver, ManagedDevice};
pub use mailbox::Mailbox;
pub use manager::{DeviceManager, ExternalPort, Inbound, ManagerConfig};
pub use retry::{RetryGuard, RetryPolicy};
