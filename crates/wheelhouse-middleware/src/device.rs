//! Devices: a [`Driver`] wrapped with a [`Mailbox`], a manager claim, and
//! command dispatch.
//!
//! A driver declares its command set as a serde enum (`Driver::Command`).
//! [`Device::dispatch`] decodes the message payload into that enum, executes
//! it with the message id as the ownership credential, and reports the
//! outcome through the mailbox:
//!
//! | Outcome | Mailbox receives |
//! |---|---|
//! | success | an echo of the payload |
//! | unknown key, bad arguments, driver error, or driver panic | a warning, then a delayed retry addressed to `robot` |
//! | retries exhausted | a final "giving up" warning |
//!
//! Errors never leave the device; the manager only ever sees messages.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use wheelhouse_types::{BotError, ManagerId, Message, OwnerToken, ROBOT};

use crate::mailbox::Mailbox;
use crate::retry::{RetryGuard, RetryPolicy};

/// Hardware-facing half of a device.
pub trait Driver: Send {
    /// Externally tagged serde enum of the commands this driver accepts.
    type Command: DeserializeOwned;

    /// Run one command. `owner` must be used for every line the command
    /// touches.
    fn execute(&mut self, command: Self::Command, owner: OwnerToken, mailbox: &Mailbox) -> Result<(), BotError>;

    /// Put the hardware in a safe state and release everything it holds.
    fn stop(&mut self, owner: OwnerToken) -> Result<(), BotError>;

    /// Called once when the device is created, e.g. to report connection
    /// status.
    fn on_attach(&mut self, _mailbox: &Mailbox) {}
}

/// Object-safe view of a device, as held by the manager.
pub trait ManagedDevice: Send {
    fn name(&self) -> &str;

    fn claimed_by(&self) -> Option<ManagerId>;

    /// Bind to `manager`. Re-connecting to the same manager is allowed.
    ///
    /// # Errors
    ///
    /// [`BotError::Configuration`] if another manager holds the device.
    fn connect(&mut self, manager: ManagerId) -> Result<(), BotError>;

    fn disconnect(&mut self);

    fn set_retry_policy(&mut self, policy: RetryPolicy);

    /// Execute the command in `message`; `now_ms` stamps any retry.
    fn dispatch(&mut self, message: &Message, now_ms: i64);

    fn drain(&self) -> Vec<Message>;

    fn stop(&mut self, owner: OwnerToken) -> Result<(), BotError>;
}

pub struct Device<D: Driver> {
    name: String,
    driver: D,
    mailbox: Mailbox,
    claimed_by: Option<ManagerId>,
    retries: RetryGuard,
}

impl<D: Driver> Device<D> {
    pub fn new(name: &str, mut driver: D) -> Self {
        let mailbox = Mailbox::new(name);
        driver.on_attach(&mailbox);
        Self {
            name: name.to_string(),
            driver,
            mailbox,
            claimed_by: None,
            retries: RetryGuard::default(),
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    /// Box for handing to a manager.
    pub fn boxed(self) -> Box<dyn ManagedDevice>
    where
        D: 'static,
    {
        Box::new(self)
    }

    fn retry(&mut self, message: &Message, now_ms: i64) {
        match self.retries.record_failure(message.id) {
            Some(delay) => {
                debug!(device = %self.name, message_id = message.id, delay, "scheduling retry");
                let mut retry = message.clone().arrived_at(now_ms).delayed(delay);
                retry.destination = ROBOT.to_string();
                retry.destination_device = self.name.clone();
                self.mailbox.push(retry);
            }
            None => {
                warn!(device = %self.name, message_id = message.id, "retries exhausted");
                self.mailbox.warn(format!(
                    "{}: giving up on {} after {} retries",
                    self.name,
                    message.payload,
                    self.retries.policy().max_attempts
                ));
            }
        }
    }
}

impl<D: Driver> ManagedDevice for Device<D> {
    fn name(&self) -> &str {
        &self.name
    }

    fn claimed_by(&self) -> Option<ManagerId> {
        self.claimed_by
    }

    fn connect(&mut self, manager: ManagerId) -> Result<(), BotError> {
        match self.claimed_by {
            Some(current) if current != manager => Err(BotError::Configuration(format!(
                "device {} already claimed by manager {current}",
                self.name
            ))),
            _ => {
                self.claimed_by = Some(manager);
                Ok(())
            }
        }
    }

    fn disconnect(&mut self) {
        self.claimed_by = None;
    }

    fn set_retry_policy(&mut self, policy: RetryPolicy) {
        self.retries.set_policy(policy);
    }

    fn dispatch(&mut self, message: &Message, now_ms: i64) {
        let owner = message.owner();
        let outcome = message.payload.decode::<D::Command>().and_then(|command| {
            let driver = &mut self.driver;
            let mailbox = &self.mailbox;
            panic::catch_unwind(AssertUnwindSafe(|| driver.execute(command, owner, mailbox)))
                .unwrap_or_else(|cause| {
                    Err(BotError::Hardware {
                        component: self.name.clone(),
                        details: format!("driver panicked: {}", panic_text(cause.as_ref())),
                    })
                })
        });
        match outcome {
            Ok(()) => {
                self.retries.record_success(message.id);
                self.mailbox.report(message.payload.clone());
            }
            Err(err) => {
                warn!(device = %self.name, message_id = message.id, %err, "command failed");
                self.mailbox
                    .warn(format!("{}: {} failed: {err}", self.name, message.payload));
                self.retry(message, now_ms);
            }
        }
    }

    fn drain(&self) -> Vec<Message> {
        self.mailbox.drain()
    }

    fn stop(&mut self, owner: OwnerToken) -> Result<(), BotError> {
        self.driver.stop(owner)
    }
}

fn panic_text(cause: &(dyn Any + Send)) -> &str {
    if let Some(text) = cause.downcast_ref::<&str>() {
        text
    } else if let Some(text) = cause.downcast_ref::<String>() {
        text
    } else {
        "unknown cause"
    }
}
