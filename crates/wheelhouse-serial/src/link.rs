//! Byte links to microcontrollers and the providers that enumerate them.
//!
//! [`SystemPorts`] talks to real serial devices through `serialport`;
//! [`ScriptedPorts`] is an in-memory stand-in whose "microcontrollers" answer
//! framed commands with a closure, for tests and simulation.

use std::collections::VecDeque;
use std::fmt;
use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::debug;
use wheelhouse_types::BotError;

use crate::framing::{Field, Frame, FrameCodec, FrameReader};

// ─────────────────────────────────────────────────────────────────────────────
// Traits
// ─────────────────────────────────────────────────────────────────────────────

/// An open, bidirectional byte link. Dropping it closes the port.
pub trait SerialLink: Send {
    fn port_name(&self) -> &str;

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), BotError>;

    /// Read whatever is available. `Ok(0)` means the read timed out.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, BotError>;
}

/// Enumerates candidate ports and opens them.
pub trait PortProvider: Send + Sync {
    fn candidates(&self) -> Result<Vec<String>, BotError>;

    fn open(&self, path: &str, baud_rate: u32, timeout: Duration) -> Result<Box<dyn SerialLink>, BotError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// serialport
// ─────────────────────────────────────────────────────────────────────────────

/// Ports reported by the operating system, optionally narrowed to names with
/// a given prefix (e.g. `/dev/ttyACM`).
#[derive(Debug, Clone, Default)]
pub struct SystemPorts {
    pub prefix: Option<String>,
}

impl SystemPorts {
    pub fn new(prefix: Option<String>) -> Self {
        Self { prefix }
    }
}

impl PortProvider for SystemPorts {
    fn candidates(&self) -> Result<Vec<String>, BotError> {
        let ports = serialport::available_ports()
            .map_err(|e| BotError::Communication(format!("cannot list serial ports: {e}")))?;
        Ok(ports
            .into_iter()
            .map(|port| port.port_name)
            .filter(|name| self.prefix.as_deref().is_none_or(|prefix| name.starts_with(prefix)))
            .collect())
    }

    fn open(&self, path: &str, baud_rate: u32, timeout: Duration) -> Result<Box<dyn SerialLink>, BotError> {
        let port = serialport::new(path, baud_rate)
            .timeout(timeout)
            .open()
            .map_err(|e| BotError::Communication(format!("cannot open {path}: {e}")))?;
        debug!(path, baud_rate, "serial port opened");
        Ok(Box::new(SystemLink {
            name: path.to_string(),
            port,
        }))
    }
}

struct SystemLink {
    name: String,
    port: Box<dyn serialport::SerialPort>,
}

impl SerialLink for SystemLink {
    fn port_name(&self) -> &str {
        &self.name
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), BotError> {
        self.port
            .write_all(bytes)
            .and_then(|()| self.port.flush())
            .map_err(|e| BotError::Communication(format!("write to {} failed: {e}", self.name)))
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, BotError> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(BotError::Communication(format!(
                "read from {} failed: {e}",
                self.name
            ))),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory microcontrollers
// ─────────────────────────────────────────────────────────────────────────────

type Responder = dyn Fn(&Frame) -> Option<Frame> + Send + Sync;

/// A fake microcontroller: every frame written to it is logged and passed to
/// a responder whose reply (if any) becomes readable.
#[derive(Clone)]
pub struct ScriptedDevice {
    codec: FrameCodec,
    responder: Arc<Responder>,
    received: Arc<Mutex<Vec<Frame>>>,
    opened: Arc<AtomicUsize>,
    open_links: Arc<AtomicUsize>,
}

impl fmt::Debug for ScriptedDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedDevice")
            .field("opened", &self.times_opened())
            .field("open_links", &self.open_links())
            .finish_non_exhaustive()
    }
}

impl ScriptedDevice {
    pub fn new(responder: impl Fn(&Frame) -> Option<Frame> + Send + Sync + 'static) -> Self {
        Self {
            codec: FrameCodec::default(),
            responder: Arc::new(responder),
            received: Arc::new(Mutex::new(Vec::new())),
            opened: Arc::new(AtomicUsize::new(0)),
            open_links: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A device that never answers.
    pub fn silent() -> Self {
        Self::new(|_| None)
    }

    /// A device that answers `who_are_you` with `name` and ignores everything
    /// else.
    pub fn named(name: &str) -> Self {
        let name = name.to_string();
        Self::new(move |frame| {
            (frame.command == "who_are_you")
                .then(|| Frame::new("who_are_you_return", vec![Field::Text(name.clone())]))
        })
    }

    fn received_log(&self) -> MutexGuard<'_, Vec<Frame>> {
        self.received.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every frame the host has sent, oldest first.
    pub fn received(&self) -> Vec<Frame> {
        self.received_log().clone()
    }

    pub fn times_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Links to this device that have not been dropped.
    pub fn open_links(&self) -> usize {
        self.open_links.load(Ordering::SeqCst)
    }
}

struct ScriptedLink {
    name: String,
    device: ScriptedDevice,
    reader: FrameReader,
    pending: VecDeque<u8>,
}

impl SerialLink for ScriptedLink {
    fn port_name(&self) -> &str {
        &self.name
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), BotError> {
        for frame in self.reader.push(bytes) {
            let reply = (self.device.responder)(&frame);
            self.device.received_log().push(frame);
            if let Some(reply) = reply {
                self.pending
                    .extend(self.device.codec.encode(&reply.command, &reply.fields));
            }
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, BotError> {
        let n = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Drop for ScriptedLink {
    fn drop(&mut self) {
        self.device.open_links.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Ordered set of in-memory ports, each backed by a [`ScriptedDevice`].
#[derive(Debug, Clone, Default)]
pub struct ScriptedPorts {
    ports: Vec<(String, ScriptedDevice)>,
}

impl ScriptedPorts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_port(mut self, path: &str, device: ScriptedDevice) -> Self {
        self.ports.push((path.to_string(), device));
        self
    }

    pub fn device(&self, path: &str) -> Option<&ScriptedDevice> {
        self.ports
            .iter()
            .find(|(name, _)| name == path)
            .map(|(_, device)| device)
    }
}

impl PortProvider for ScriptedPorts {
    fn candidates(&self) -> Result<Vec<String>, BotError> {
        Ok(self.ports.iter().map(|(name, _)| name.clone()).collect())
    }

    fn open(&self, path: &str, _baud_rate: u32, _timeout: Duration) -> Result<Box<dyn SerialLink>, BotError> {
        let device = self
            .device(path)
            .ok_or_else(|| BotError::Communication(format!("cannot open {path}: no such port")))?
            .clone();
        device.opened.fetch_add(1, Ordering::SeqCst);
        device.open_links.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedLink {
            name: path.to_string(),
            reader: device.codec.reader(),
            device,
            pending: VecDeque::new(),
        }))
    }
}
