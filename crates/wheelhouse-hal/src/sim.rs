//! In-process GPIO backend for tests and off-target runs.
//!
//! [`SimGpio`] records every mutating call as a [`GpioOp`] so tests can
//! assert on the exact hardware traffic a driver produced, lets a test
//! script the levels an input line will report, and can be told to fail a
//! chosen call once.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use wheelhouse_hal::{GpioOp, Level, PinArbiter, SimGpio};
//! use wheelhouse_types::OwnerToken;
//!
//! let sim = Arc::new(SimGpio::new());
//! let arbiter = PinArbiter::new(sim.clone());
//! let owner = OwnerToken::new(1);
//!
//! arbiter.acquire(4, owner).unwrap();
//! arbiter.set_state(4, owner, Level::High).unwrap();
//! assert!(sim.ops().contains(&GpioOp::Write(4, Level::High)));
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use wheelhouse_types::BotError;

use crate::gpio::{Direction, GpioBackend, Level, PwmSettings};

/// One recorded backend call. Reads are not recorded.
#[derive(Debug, Clone, PartialEq)]
pub enum GpioOp {
    Setup(u8, Direction),
    Write(u8, Level),
    StartPwm(u8, PwmSettings),
    StopPwm(u8),
    Cleanup(u8),
}

impl GpioOp {
    pub fn line(&self) -> u8 {
        match self {
            GpioOp::Setup(line, _)
            | GpioOp::Write(line, _)
            | GpioOp::StartPwm(line, _)
            | GpioOp::StopPwm(line)
            | GpioOp::Cleanup(line) => *line,
        }
    }

    pub fn is_pwm(&self) -> bool {
        matches!(self, GpioOp::StartPwm(..) | GpioOp::StopPwm(_))
    }
}

type FaultMatcher = Box<dyn Fn(&GpioOp) -> bool + Send>;

#[derive(Default)]
struct SimState {
    ops: Vec<GpioOp>,
    scripted: HashMap<u8, VecDeque<Level>>,
    resting: HashMap<u8, Level>,
    faults: Vec<FaultMatcher>,
}

/// Recording, scriptable GPIO backend. Succeeds unless a fault was armed
/// with [`SimGpio::fail_next`].
#[derive(Default)]
pub struct SimGpio {
    state: Mutex<SimState>,
}

impl SimGpio {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of every recorded call, oldest first.
    pub fn ops(&self) -> Vec<GpioOp> {
        self.state().ops.clone()
    }

    /// Recorded PWM calls (start or stop) on any line.
    pub fn pwm_ops(&self) -> Vec<GpioOp> {
        self.state().ops.iter().filter(|op| op.is_pwm()).cloned().collect()
    }

    pub fn clear_ops(&self) {
        self.state().ops.clear();
    }

    /// Queue levels that successive reads of `line` will return, in order.
    pub fn script_input(&self, line: u8, levels: impl IntoIterator<Item = Level>) {
        self.state()
            .scripted
            .entry(line)
            .or_default()
            .extend(levels);
    }

    /// Level reported once the script for `line` is exhausted (default low).
    pub fn set_resting_level(&self, line: u8, level: Level) {
        self.state().resting.insert(line, level);
    }

    /// Make the next call matching `matches` fail once. A failed call is
    /// not recorded.
    pub fn fail_next(&self, matches: impl Fn(&GpioOp) -> bool + Send + 'static) {
        self.state().faults.push(Box::new(matches));
    }

    fn record(&self, op: GpioOp) -> Result<(), BotError> {
        let mut state = self.state();
        if let Some(index) = state.faults.iter().position(|matches| matches(&op)) {
            state.faults.remove(index);
            return Err(BotError::Hardware {
                component: format!("sim line {}", op.line()),
                details: format!("injected failure on {op:?}"),
            });
        }
        state.ops.push(op);
        Ok(())
    }
}

impl GpioBackend for SimGpio {
    fn setup(&self, line: u8, direction: Direction) -> Result<(), BotError> {
        self.record(GpioOp::Setup(line, direction))
    }

    fn write(&self, line: u8, level: Level) -> Result<(), BotError> {
        self.record(GpioOp::Write(line, level))
    }

    fn read(&self, line: u8) -> Result<Level, BotError> {
        let mut state = self.state();
        if let Some(level) = state.scripted.get_mut(&line).and_then(VecDeque::pop_front) {
            return Ok(level);
        }
        Ok(state.resting.get(&line).copied().unwrap_or(Level::Low))
    }

    fn start_pwm(&self, line: u8, pwm: PwmSettings) -> Result<(), BotError> {
        self.record(GpioOp::StartPwm(line, pwm))
    }

    fn stop_pwm(&self, line: u8) -> Result<(), BotError> {
        self.record(GpioOp::StopPwm(line))
    }

    fn cleanup(&self, line: u8) -> Result<(), BotError> {
        self.record(GpioOp::Cleanup(line))
    }
}
