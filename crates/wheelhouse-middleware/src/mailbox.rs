//! [`Mailbox`] – a device's outbound message queue.
//!
//! The only channel through which a device talks to the rest of the system.
//! Clones share the queue, so a driver may hand one to a hardware thread.
//! Messages are drained in the order they were pushed.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use wheelhouse_types::{CONTROLLER, Message, Payload, ROBOT};

#[derive(Debug, Clone)]
pub struct Mailbox {
    device: Arc<str>,
    queue: Arc<Mutex<Vec<Message>>>,
}

impl Mailbox {
    pub fn new(device: &str) -> Self {
        Self {
            device: Arc::from(device),
            queue: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Name of the owning device; stamped as `source_device` on every message.
    pub fn device(&self) -> &str {
        &self.device
    }

    fn queue(&self) -> MutexGuard<'_, Vec<Message>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue a fully formed message.
    pub fn push(&self, message: Message) {
        self.queue().push(message);
    }

    /// Output for the operator interface.
    pub fn report(&self, payload: impl Into<Payload>) {
        self.push(
            Message::new(payload)
                .addressed_to(CONTROLLER, "")
                .sent_by(ROBOT, &self.device),
        );
    }

    /// A warning for the `warn` sink.
    pub fn warn(&self, text: impl Into<String>) {
        self.push(Message::warning(text).sent_by(ROBOT, &self.device));
    }

    /// Ask the manager to send `payload` back to this device after `delay_ms`.
    pub fn schedule(&self, payload: impl Into<Payload>, delay_ms: u64) {
        self.push(
            Message::new(payload)
                .addressed_to(ROBOT, &self.device)
                .sent_by(ROBOT, &self.device)
                .delayed(delay_ms),
        );
    }

    /// Take everything queued so far.
    pub fn drain(&self) -> Vec<Message> {
        std::mem::take(&mut *self.queue())
    }

    pub fn len(&self) -> usize {
        self.queue().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue().is_empty()
    }
}
