//! [`Message`] – the addressed, timestamped unit carried by the bus.
//!
//! # Addressing
//!
//! | Field | Meaning |
//! |---|---|
//! | `destination` | [`ROBOT`] loops the message back into the manager queue; anything else goes to the external consumer. |
//! | `destination_device` | Name of the target device, [`WARN`] for warnings, empty for unaddressed output. |
//! | `source` / `source_device` | Who produced the message. |
//! | `arrival_time` | Milliseconds since the Unix epoch, stamped at construction. |
//! | `delay` | Milliseconds to hold the message before it may be dispatched. |
//! | `id` | Random 63-bit token; doubles as the ownership credential of the command. |
//! | `payload` | A bare command key, or `[key, {named args}]`. |
//!
//! A message is dispatchable once the wall clock reaches
//! `arrival_time + delay`.
//!
//! # Wire format
//!
//! Messages cross the process boundary as flat JSON objects holding exactly
//! the fields above. [`Message::from_wire`] rejects unknown fields and
//! re-stamps `arrival_time` with the local clock, so the delay always counts
//! from when *this* process received the message.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{BotError, OwnerToken, MAX_TOKEN};

/// Destination that loops a message back into the manager queue.
pub const ROBOT: &str = "robot";
/// Default destination for anything meant for the operator interface.
pub const CONTROLLER: &str = "controller";
/// Virtual sink for warnings.
pub const WARN: &str = "warn";

/// Named command arguments.
pub type Args = serde_json::Map<String, Value>;

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ─────────────────────────────────────────────────────────────────────────────
// Payload
// ─────────────────────────────────────────────────────────────────────────────

/// What a message carries: a command key with optional named arguments.
///
/// On the wire a bare key is a JSON string and the argument form is a
/// two-element array `["setspeed", {"speed": 0}]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Key(String),
    KeyArgs(String, Args),
}

impl Payload {
    /// A bare command key.
    pub fn command(key: impl Into<String>) -> Self {
        Payload::Key(key.into())
    }

    /// A command key plus named arguments.
    pub fn with_args<K, I>(key: impl Into<String>, args: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Payload::KeyArgs(
            key.into(),
            args.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        )
    }

    pub fn key(&self) -> &str {
        match self {
            Payload::Key(key) | Payload::KeyArgs(key, _) => key,
        }
    }

    pub fn args(&self) -> Option<&Args> {
        match self {
            Payload::Key(_) => None,
            Payload::KeyArgs(_, args) => Some(args),
        }
    }

    /// Decode the payload into a device's command enum.
    ///
    /// Command enums use serde's externally tagged layout, so `"forward"`
    /// decodes a unit variant and `["setspeed", {"speed": 1.0}]` decodes a
    /// struct variant. A bare key also matches a struct variant whose fields
    /// all have defaults.
    ///
    /// # Errors
    ///
    /// [`BotError::MessageFormat`] for unknown keys or mistyped arguments.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, BotError> {
        let args = self.args().cloned().unwrap_or_default();
        if args.is_empty()
            && let Ok(command) = serde_json::from_value(Value::String(self.key().to_string()))
        {
            return Ok(command);
        }
        let mut tagged = serde_json::Map::new();
        tagged.insert(self.key().to_string(), Value::Object(args));
        serde_json::from_value(Value::Object(tagged))
            .map_err(|e| BotError::MessageFormat(format!("mangled command ({self}): {e}")))
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Key(key) => write!(f, "{key}"),
            Payload::KeyArgs(key, args) => write!(f, "{key} {}", Value::Object(args.clone())),
        }
    }
}

impl From<&str> for Payload {
    fn from(key: &str) -> Self {
        Payload::command(key)
    }
}

impl From<String> for Payload {
    fn from(key: String) -> Self {
        Payload::Key(key)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Message
// ─────────────────────────────────────────────────────────────────────────────

/// An addressed, timestamped, optionally delayed bus message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub destination: String,
    pub destination_device: String,
    pub source: String,
    pub source_device: String,
    /// Milliseconds since the Unix epoch.
    pub arrival_time: i64,
    /// Milliseconds.
    pub delay: u64,
    pub id: u64,
    pub payload: Payload,
}

/// Inbound wire shape. `arrival_time` is accepted but discarded.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct WireMessage {
    destination: String,
    #[serde(default)]
    destination_device: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    source_device: String,
    #[serde(default)]
    #[allow(dead_code)]
    arrival_time: Option<i64>,
    #[serde(default)]
    delay: u64,
    #[serde(default)]
    id: Option<u64>,
    payload: Payload,
}

impl Message {
    /// A message for the operator interface, stamped now, with a fresh id.
    pub fn new(payload: impl Into<Payload>) -> Self {
        Self {
            destination: CONTROLLER.to_string(),
            destination_device: String::new(),
            source: ROBOT.to_string(),
            source_device: String::new(),
            arrival_time: now_ms(),
            delay: 0,
            id: OwnerToken::random().get(),
            payload: payload.into(),
        }
    }

    /// A warning addressed to the virtual [`WARN`] sink.
    pub fn warning(text: impl Into<String>) -> Self {
        Self::new(Payload::Key(text.into())).addressed_to(CONTROLLER, WARN)
    }

    pub fn addressed_to(mut self, destination: &str, destination_device: &str) -> Self {
        self.destination = destination.to_string();
        self.destination_device = destination_device.to_string();
        self
    }

    pub fn sent_by(mut self, source: &str, source_device: &str) -> Self {
        self.source = source.to_string();
        self.source_device = source_device.to_string();
        self
    }

    pub fn delayed(mut self, delay_ms: u64) -> Self {
        self.delay = delay_ms;
        self
    }

    /// Override the arrival stamp (tests and replay).
    pub fn arrived_at(mut self, arrival_ms: i64) -> Self {
        self.arrival_time = arrival_ms;
        self
    }

    pub fn with_id(mut self, id: OwnerToken) -> Self {
        self.id = id.get();
        self
    }

    /// Earliest wall-clock time (ms) at which the message may be dispatched.
    pub fn ready_time(&self) -> i64 {
        self.arrival_time
            .saturating_add(i64::try_from(self.delay).unwrap_or(i64::MAX))
    }

    pub fn is_ready(&self, now_ms: i64) -> bool {
        now_ms >= self.ready_time()
    }

    /// `true` when the message loops back into the manager queue.
    pub fn is_self_addressed(&self) -> bool {
        self.destination == ROBOT
    }

    pub fn is_warning(&self) -> bool {
        self.destination_device == WARN
    }

    /// The ownership credential of the command this message carries.
    pub fn owner(&self) -> OwnerToken {
        OwnerToken::new(self.id)
    }

    /// Serialize to the flat JSON wire form.
    pub fn to_wire(&self) -> Result<String, BotError> {
        serde_json::to_string(self).map_err(|e| BotError::MessageFormat(e.to_string()))
    }

    /// Parse the JSON wire form, re-stamping `arrival_time` with the local
    /// clock. A missing `id` gets a fresh token.
    ///
    /// # Errors
    ///
    /// [`BotError::MessageFormat`] for invalid JSON, unknown or mistyped
    /// fields, a negative delay, or an id wider than 63 bits.
    pub fn from_wire(raw: &str) -> Result<Self, BotError> {
        let wire: WireMessage =
            serde_json::from_str(raw).map_err(|e| BotError::MessageFormat(e.to_string()))?;
        let id = match wire.id {
            Some(id) if id > MAX_TOKEN => {
                return Err(BotError::MessageFormat(format!(
                    "message id {id} does not fit in 63 bits"
                )));
            }
            Some(id) => id,
            None => OwnerToken::random().get(),
        };
        Ok(Self {
            destination: wire.destination,
            destination_device: wire.destination_device,
            source: wire.source,
            source_device: wire.source_device,
            arrival_time: now_ms(),
            delay: wire.delay,
            id,
            payload: wire.payload,
        })
    }
}
