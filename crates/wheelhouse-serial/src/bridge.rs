//! [`Bridge`] – finds a microcontroller and exchanges framed commands with it.
//!
//! ```text
//!              explicit path opens          probe answers with our name
//! Searching ───────────────────────▶ Bound ◀──────────────────────────── Searching
//!     │
//!     └── path fails to open, or no candidate answers ──▶ Unbound
//! ```
//!
//! Probing opens each candidate in turn, sends `who_are_you`, and reads one
//! reply. The first port whose `who_are_you_return` names the configured
//! device is kept; every other link is closed as soon as it has been probed,
//! and ports after the match are never opened.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use wheelhouse_types::BotError;

use crate::framing::{Field, Frame, FrameCodec, FrameReader, return_name};
use crate::link::{PortProvider, SerialLink};

pub const WHO_ARE_YOU: &str = "who_are_you";

/// Connection parameters for one microcontroller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Name the firmware reports in `who_are_you_return`.
    pub internal_device_name: String,
    /// Skip discovery and open this port directly.
    #[serde(default)]
    pub device_path: Option<String>,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// How long to wait for one reply.
    #[serde(default = "default_reply_timeout_ms")]
    pub reply_timeout_ms: u64,
    #[serde(default)]
    pub codec: FrameCodec,
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_reply_timeout_ms() -> u64 {
    500
}

impl BridgeConfig {
    pub fn new(internal_device_name: impl Into<String>) -> Self {
        Self {
            internal_device_name: internal_device_name.into(),
            device_path: None,
            baud_rate: default_baud_rate(),
            reply_timeout_ms: default_reply_timeout_ms(),
            codec: FrameCodec::default(),
        }
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeState {
    Searching,
    Bound { port: String },
    Unbound,
}

pub struct Bridge {
    config: BridgeConfig,
    state: BridgeState,
    link: Option<Box<dyn SerialLink>>,
    reader: FrameReader,
}

impl Bridge {
    /// Locate and bind the microcontroller. Never fails: a device that cannot
    /// be found leaves the bridge [`BridgeState::Unbound`].
    pub fn connect(config: BridgeConfig, ports: &dyn PortProvider) -> Self {
        let mut bridge = Self {
            reader: config.codec.reader(),
            config,
            state: BridgeState::Searching,
            link: None,
        };
        let found = match bridge.config.device_path.clone() {
            Some(path) => bridge.open_direct(ports, &path),
            None => bridge.discover(ports),
        };
        bridge.state = match found {
            Some(link) => {
                let port = link.port_name().to_string();
                info!(
                    device = %bridge.config.internal_device_name,
                    port = %port,
                    baud = bridge.config.baud_rate,
                    "microcontroller bound"
                );
                bridge.link = Some(link);
                BridgeState::Bound { port }
            }
            None => {
                warn!(device = %bridge.config.internal_device_name, "microcontroller not found");
                BridgeState::Unbound
            }
        };
        bridge
    }

    fn open_direct(&self, ports: &dyn PortProvider, path: &str) -> Option<Box<dyn SerialLink>> {
        ports
            .open(path, self.config.baud_rate, self.config.reply_timeout())
            .inspect_err(|err| debug!(path, %err, "explicit port failed to open"))
            .ok()
    }

    fn discover(&mut self, ports: &dyn PortProvider) -> Option<Box<dyn SerialLink>> {
        let candidates = ports
            .candidates()
            .inspect_err(|err| debug!(%err, "port enumeration failed"))
            .unwrap_or_default();
        for path in candidates {
            let mut link = match ports.open(&path, self.config.baud_rate, self.config.reply_timeout()) {
                Ok(link) => link,
                Err(err) => {
                    debug!(path = %path, %err, "skipping candidate");
                    continue;
                }
            };
            self.reader.reset();
            match self.probe(link.as_mut()) {
                Ok(Some(name)) if name == self.config.internal_device_name => return Some(link),
                Ok(Some(name)) => debug!(path = %path, reported = %name, "candidate is another device"),
                Ok(None) => debug!(path = %path, "candidate did not identify itself"),
                Err(err) => debug!(path = %path, %err, "probe failed"),
            }
        }
        None
    }

    fn probe(&mut self, link: &mut dyn SerialLink) -> Result<Option<String>, BotError> {
        link.write_all(&self.config.codec.encode(WHO_ARE_YOU, &[]))?;
        let reply = Self::read_frame(&mut self.reader, link, self.config.reply_timeout())?;
        Ok(reply
            .filter(|frame| frame.is_reply_to(WHO_ARE_YOU))
            .and_then(|frame| frame.field(0).map(Field::as_text)))
    }

    fn read_frame(
        reader: &mut FrameReader,
        link: &mut dyn SerialLink,
        timeout: Duration,
    ) -> Result<Option<Frame>, BotError> {
        let deadline = Instant::now() + timeout;
        let mut buf = [0u8; 256];
        loop {
            let n = link.read(&mut buf)?;
            if n == 0 {
                return Ok(None);
            }
            // Bytes after the first frame belong to nobody; a reply is one frame.
            if let Some(frame) = reader.push(&buf[..n]).into_iter().next() {
                return Ok(Some(frame));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
        }
    }

    pub fn state(&self) -> &BridgeState {
        &self.state
    }

    pub fn is_bound(&self) -> bool {
        matches!(self.state, BridgeState::Bound { .. })
    }

    pub fn port(&self) -> Option<&str> {
        match &self.state {
            BridgeState::Bound { port } => Some(port),
            _ => None,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    fn link(&mut self) -> Result<&mut Box<dyn SerialLink>, BotError> {
        self.link.as_mut().ok_or_else(|| {
            BotError::Communication(format!("{} is not connected", self.config.internal_device_name))
        })
    }

    pub fn send(&mut self, command: &str, fields: &[Field]) -> Result<(), BotError> {
        let bytes = self.config.codec.encode(command, fields);
        self.link()?.write_all(&bytes)
    }

    /// Next frame from the device, or `None` after the reply timeout.
    pub fn receive(&mut self) -> Result<Option<Frame>, BotError> {
        let timeout = self.config.reply_timeout();
        let link = self
            .link
            .as_mut()
            .ok_or_else(|| BotError::Communication(format!("{} is not connected", self.config.internal_device_name)))?;
        Self::read_frame(&mut self.reader, link.as_mut(), timeout)
    }

    /// Send `command` and wait for its `<command>_return`.
    ///
    /// # Errors
    ///
    /// [`BotError::Communication`] when unbound, on I/O failure, when no reply
    /// arrives, or when the reply is for some other command.
    pub fn call(&mut self, command: &str, fields: &[Field]) -> Result<Frame, BotError> {
        self.send(command, fields)?;
        match self.receive()? {
            Some(frame) if frame.is_reply_to(command) => Ok(frame),
            Some(frame) => Err(BotError::Communication(format!(
                "expected {}, received {frame}",
                return_name(command)
            ))),
            None => Err(BotError::Communication(format!(
                "no reply to {command} from {}",
                self.config.internal_device_name
            ))),
        }
    }
}
