//! Escaped field/command framing used on the microcontroller link.
//!
//! A command is its name followed by zero or more fields, each preceded by
//! the separator, and closed by the terminator:
//!
//! ```text
//! set_speed,1.5,-1.5;
//! who_are_you_return,drive/,train;
//! ```
//!
//! Separator, terminator, or escape bytes inside a field are prefixed with
//! the escape byte on the way out and unescaped on the way in. Incoming field
//! text is read as an integer if it parses as one, then as a float, and kept
//! as text otherwise.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Suffix a microcontroller appends to a command's name in its reply.
pub const RETURN_SUFFIX: &str = "_return";

/// Name of the reply to `command`.
pub fn return_name(command: &str) -> String {
    format!("{command}{RETURN_SUFFIX}")
}

/// One field of a framed command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Field {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Field {
    /// Integer first, then float, then text.
    pub fn parse(raw: &str) -> Self {
        if let Ok(value) = raw.parse::<i64>() {
            Field::Int(value)
        } else if let Ok(value) = raw.parse::<f64>() {
            Field::Float(value)
        } else {
            Field::Text(raw.to_string())
        }
    }

    /// Numeric value of an `Int` or `Float` field.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Field::Int(value) => Some(*value as f64),
            Field::Float(value) => Some(*value),
            Field::Text(_) => None,
        }
    }

    /// The field as text. Numbers are rendered, so a device that replies
    /// with a numeric-looking name still compares equal.
    pub fn as_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Int(value) => write!(f, "{value}"),
            Field::Float(value) => write!(f, "{value}"),
            Field::Text(value) => f.write_str(value),
        }
    }
}

impl From<i64> for Field {
    fn from(value: i64) -> Self {
        Field::Int(value)
    }
}

impl From<f64> for Field {
    fn from(value: f64) -> Self {
        Field::Float(value)
    }
}

impl From<&str> for Field {
    fn from(value: &str) -> Self {
        Field::Text(value.to_string())
    }
}

/// A decoded command: its name and its fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub command: String,
    pub fields: Vec<Field>,
}

impl Frame {
    pub fn new(command: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            command: command.into(),
            fields,
        }
    }

    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    /// Whether this frame is the reply to `command`.
    pub fn is_reply_to(&self, command: &str) -> bool {
        self.command
            .strip_suffix(RETURN_SUFFIX)
            .is_some_and(|base| base == command)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command)?;
        for field in &self.fields {
            write!(f, ",{field}")?;
        }
        Ok(())
    }
}

/// The three control bytes of the line protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameCodec {
    pub separator: char,
    pub terminator: char,
    pub escape: char,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self {
            separator: ',',
            terminator: ';',
            escape: '/',
        }
    }
}

impl FrameCodec {
    fn escape_into(&self, out: &mut String, raw: &str) {
        for c in raw.chars() {
            if c == self.separator || c == self.terminator || c == self.escape {
                out.push(self.escape);
            }
            out.push(c);
        }
    }

    /// Bytes for one complete command, terminator included.
    pub fn encode(&self, command: &str, fields: &[Field]) -> Vec<u8> {
        let mut out = String::new();
        self.escape_into(&mut out, command);
        for field in fields {
            out.push(self.separator);
            self.escape_into(&mut out, &field.to_string());
        }
        out.push(self.terminator);
        out.into_bytes()
    }

    pub fn reader(&self) -> FrameReader {
        FrameReader::new(*self)
    }
}

/// Incremental decoder. Feed it bytes as they arrive; it returns every frame
/// completed by them and buffers the rest, including a UTF-8 sequence cut
/// short by the end of a read. Invalid bytes decode as U+FFFD.
#[derive(Debug, Clone)]
pub struct FrameReader {
    codec: FrameCodec,
    undecoded: Vec<u8>,
    current: String,
    fields: Vec<String>,
    escaped: bool,
}

impl FrameReader {
    pub fn new(codec: FrameCodec) -> Self {
        Self {
            codec,
            undecoded: Vec::new(),
            current: String::new(),
            fields: Vec::new(),
            escaped: false,
        }
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<Frame> {
        let mut buffer = std::mem::take(&mut self.undecoded);
        buffer.extend_from_slice(bytes);

        let mut frames = Vec::new();
        let mut rest = buffer.as_slice();
        while !rest.is_empty() {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    text.chars().for_each(|c| self.feed(c, &mut frames));
                    break;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    String::from_utf8_lossy(valid)
                        .chars()
                        .for_each(|c| self.feed(c, &mut frames));
                    match err.error_len() {
                        Some(len) => {
                            self.feed(char::REPLACEMENT_CHARACTER, &mut frames);
                            rest = &after[len..];
                        }
                        None => {
                            self.undecoded = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        frames
    }

    fn feed(&mut self, c: char, frames: &mut Vec<Frame>) {
        if self.escaped {
            self.current.push(c);
            self.escaped = false;
        } else if c == self.codec.escape {
            self.escaped = true;
        } else if c == self.codec.separator {
            self.fields.push(std::mem::take(&mut self.current));
        } else if c == self.codec.terminator {
            self.fields.push(std::mem::take(&mut self.current));
            if let Some(frame) = self.finish() {
                frames.push(frame);
            }
        } else {
            self.current.push(c);
        }
    }

    fn finish(&mut self) -> Option<Frame> {
        let mut parts = std::mem::take(&mut self.fields).into_iter();
        // Line endings between commands are noise, not part of the name.
        let command = parts.next()?.trim().to_string();
        if command.is_empty() {
            return None;
        }
        Some(Frame {
            command,
            fields: parts.map(|raw| Field::parse(&raw)).collect(),
        })
    }

    /// Drop any partially received command.
    pub fn reset(&mut self) {
        self.undecoded.clear();
        self.current.clear();
        self.fields.clear();
        self.escaped = false;
    }
}
