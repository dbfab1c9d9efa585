//! [`DeviceManager`] – the dispatch loop.
//!
//! The manager owns the device registry and one central queue. Each tick:
//!
//! 1. Pull everything waiting on the external inbound channel into the queue.
//!    Wire strings that fail to parse become warnings and are dropped.
//! 2. Take exactly as many messages as the queue held at that point. A message
//!    whose delay has not elapsed goes to the back of the queue; a ready one
//!    is dispatched to the device named in `destination_device`, or forwarded
//!    to the external consumer when it is not addressed to `robot` or names
//!    no device.
//! 3. Drain every device mailbox. Messages for `robot` re-enter the queue and
//!    are looked at on the next tick; everything else goes out.
//!
//! A delayed message is therefore dispatched on the first tick at or after
//! its ready time, and a self-scheduled message waits at least one poll
//! interval.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};
use wheelhouse_types::{BotError, ManagerId, Message, OwnerToken, ROBOT, now_ms};

use crate::device::ManagedDevice;
use crate::retry::RetryPolicy;

const MANAGER_DEVICE: &str = "manager";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Sleep between ticks in [`DeviceManager::run`]; also the worst-case
    /// extra latency of a delayed message.
    pub poll_interval_ms: u64,
    pub retry: RetryPolicy,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 50,
            retry: RetryPolicy::default(),
        }
    }
}

/// Something arriving from outside the process.
#[derive(Debug, Clone)]
pub enum Inbound {
    Message(Message),
    /// A message still in wire form.
    Wire(String),
}

impl From<Message> for Inbound {
    fn from(message: Message) -> Self {
        Inbound::Message(message)
    }
}

impl From<String> for Inbound {
    fn from(raw: String) -> Self {
        Inbound::Wire(raw)
    }
}

/// The external consumer's end of the manager: send commands in, receive
/// everything the robot emits.
pub struct ExternalPort {
    pub inbound: UnboundedSender<Inbound>,
    pub outbound: UnboundedReceiver<Message>,
}

pub struct DeviceManager {
    id: ManagerId,
    config: ManagerConfig,
    stop_token: OwnerToken,
    devices: BTreeMap<String, Box<dyn ManagedDevice>>,
    queue: VecDeque<Message>,
    inbound: UnboundedReceiver<Inbound>,
    outbound: UnboundedSender<Message>,
}

impl DeviceManager {
    pub fn new(config: ManagerConfig) -> (Self, ExternalPort) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let manager = Self {
            id: ManagerId::new(),
            config,
            stop_token: OwnerToken::random(),
            devices: BTreeMap::new(),
            queue: VecDeque::new(),
            inbound: inbound_rx,
            outbound: outbound_tx,
        };
        let port = ExternalPort {
            inbound: inbound_tx,
            outbound: outbound_rx,
        };
        (manager, port)
    }

    pub fn id(&self) -> ManagerId {
        self.id
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    // ── Registry ────────────────────────────────────────────────────────────

    /// Register and claim `device`.
    ///
    /// # Errors
    ///
    /// [`BotError::Configuration`] for a duplicate name or a device claimed
    /// by another manager. The error is also reported on the bus, and the
    /// device is dropped; loading continues with the next one.
    pub fn load(&mut self, mut device: Box<dyn ManagedDevice>) -> Result<(), BotError> {
        let name = device.name().to_string();
        let outcome = if self.devices.contains_key(&name) {
            Err(BotError::Configuration(format!("duplicate device name {name}")))
        } else {
            device.connect(self.id)
        };
        if let Err(err) = outcome {
            warn!(device = %name, %err, "device not loaded");
            self.emit_warning(format!("{name} not loaded: {err}"));
            return Err(err);
        }
        device.set_retry_policy(self.config.retry);
        // Whatever the device reported while it was being built.
        self.route_outputs(device.drain());
        info!(device = %name, "device loaded");
        self.devices.insert(name, device);
        Ok(())
    }

    /// Load every device, reporting (not propagating) individual failures.
    /// Returns the number loaded.
    pub fn load_all(&mut self, devices: impl IntoIterator<Item = Box<dyn ManagedDevice>>) -> usize {
        devices
            .into_iter()
            .map(|device| self.load(device))
            .filter(Result::is_ok)
            .count()
    }

    /// Remove `name`, stop it, and release its claim.
    ///
    /// The device leaves the registry before `stop` runs, so nothing more is
    /// dispatched to it; by the time this returns its hardware is released.
    pub fn unload(&mut self, name: &str) -> Result<(), BotError> {
        let mut device = self
            .devices
            .remove(name)
            .ok_or_else(|| BotError::Configuration(format!("device {name} is not loaded")))?;
        let stopped = device.stop(self.stop_token);
        if let Err(err) = &stopped {
            warn!(device = %name, %err, "device did not stop cleanly");
            self.emit_warning(format!("{name} did not stop cleanly: {err}"));
        }
        device.disconnect();
        let leftovers: Vec<Message> = device
            .drain()
            .into_iter()
            .filter(|message| !message.is_self_addressed())
            .collect();
        self.route_outputs(leftovers);
        info!(device = %name, "device unloaded");
        stopped
    }

    /// Unload every device.
    pub fn unload_all(&mut self) {
        let names: Vec<String> = self.devices.keys().cloned().collect();
        for name in names {
            let _ = self.unload(&name);
        }
    }

    pub fn device_names(&self) -> Vec<&str> {
        self.devices.keys().map(String::as_str).collect()
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.devices.contains_key(name)
    }

    // ── Queue ───────────────────────────────────────────────────────────────

    /// Put `message` on the central queue directly.
    pub fn submit(&mut self, message: Message) {
        self.queue.push_back(message);
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Messages waiting on the central queue, front first.
    pub fn queued(&self) -> impl Iterator<Item = &Message> {
        self.queue.iter()
    }

    fn emit(&self, message: Message) {
        if self.outbound.send(message).is_err() {
            debug!("external consumer gone; dropping message");
        }
    }

    /// Send a warning from the manager straight to the external consumer.
    pub fn emit_warning(&self, text: String) {
        self.emit(Message::warning(text).sent_by(ROBOT, MANAGER_DEVICE));
    }

    fn route_outputs(&mut self, messages: Vec<Message>) {
        for message in messages {
            if message.is_self_addressed() {
                self.queue.push_back(message);
            } else {
                self.emit(message);
            }
        }
    }

    fn pull_inbound(&mut self) {
        while let Ok(inbound) = self.inbound.try_recv() {
            match inbound {
                Inbound::Message(message) => self.queue.push_back(message),
                Inbound::Wire(raw) => match Message::from_wire(&raw) {
                    Ok(message) => self.queue.push_back(message),
                    Err(err) => {
                        warn!(%err, "dropping malformed inbound message");
                        self.emit_warning(format!("dropped malformed message: {err}"));
                    }
                },
            }
        }
    }

    // ── Loop ────────────────────────────────────────────────────────────────

    /// One pass at the current wall-clock time.
    pub fn tick(&mut self) -> usize {
        self.tick_at(now_ms())
    }

    /// One pass, treating `now_ms` as the current time. Returns the number of
    /// messages dispatched or forwarded.
    pub fn tick_at(&mut self, now_ms: i64) -> usize {
        self.pull_inbound();

        let mut handled = 0;
        for _ in 0..self.queue.len() {
            let Some(message) = self.queue.pop_front() else {
                break;
            };
            if !message.is_ready(now_ms) {
                self.queue.push_back(message);
                continue;
            }
            handled += 1;
            if message.destination != ROBOT || message.destination_device.is_empty() {
                self.emit(message);
                continue;
            }
            match self.devices.get_mut(&message.destination_device) {
                Some(device) => {
                    debug!(device = %message.destination_device, message_id = message.id, payload = %message.payload, "dispatch");
                    device.dispatch(&message, now_ms);
                }
                None => {
                    warn!(device = %message.destination_device, "message for unknown device");
                    self.emit_warning(format!(
                        "device {} not loaded; dropped {}",
                        message.destination_device, message.payload
                    ));
                }
            }
        }

        let outputs: Vec<Message> = self
            .devices
            .values()
            .flat_map(|device| device.drain())
            .collect();
        self.route_outputs(outputs);
        handled
    }

    /// Tick every poll interval until `shutdown` is set, then unload every
    /// device. Blocks the calling thread.
    pub fn run(mut self, shutdown: Arc<AtomicBool>) {
        let interval = Duration::from_millis(self.config.poll_interval_ms);
        info!(manager = %self.id, devices = self.devices.len(), poll_interval_ms = self.config.poll_interval_ms, "manager running");
        while !shutdown.load(Ordering::SeqCst) {
            self.tick();
            thread::sleep(interval);
        }
        info!(manager = %self.id, "shutting down");
        self.unload_all();
    }
}

impl Drop for DeviceManager {
    fn drop(&mut self) {
        if !self.devices.is_empty() {
            self.unload_all();
        }
    }
}
