//! [`PinArbiter`] – exclusive ownership of physical lines.
//!
//! Every line has one entry in a table guarded by a single mutex. An entry is
//! [`LineOwner::Uninitialized`], [`LineOwner::Free`], or
//! [`LineOwner::Owned`] by an [`OwnerToken`]. Only the current holder may
//! change a line's level or PWM state.
//!
//! # Rules
//!
//! | Call | Line state | Result |
//! |---|---|---|
//! | `acquire` | `Uninitialized` | hardware setup, drive low, then `Owned` |
//! | `acquire` | `Free` | `Owned` |
//! | `acquire` | `Owned` by same token | no-op |
//! | `acquire` | `Owned` by other token | [`BotError::Ownership`], table unchanged |
//! | `release` | `Owned` by same token | `Free` |
//! | `release` | anything else | no-op |
//! | `shutdown` | not owned by another token | safe state, cleanup, `Uninitialized` |
//!
//! [`PinArbiter::acquire_all`] claims several lines in order and rolls back
//! whatever it took if a later claim fails, so a composite actuator never
//! keeps partial ownership.
//!
//! The arbiter is cheap to clone; clones share the table and the backend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};
use wheelhouse_types::{BotError, LineOwner, OwnerToken};

use crate::gpio::{Direction, GpioBackend, Level, PwmSettings};

// ─────────────────────────────────────────────────────────────────────────────
// Table entry
// ─────────────────────────────────────────────────────────────────────────────

/// Static parameters of a line, supplied when a [`Pin`] is created.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PinConfig {
    pub direction: Direction,
    pub pwm: PwmSettings,
}

impl PinConfig {
    pub fn output() -> Self {
        Self {
            direction: Direction::Output,
            pwm: PwmSettings::default(),
        }
    }

    pub fn input() -> Self {
        Self {
            direction: Direction::Input,
            pwm: PwmSettings::default(),
        }
    }

    pub fn with_pwm(mut self, frequency: f64, duty_cycle: f64) -> Self {
        self.pwm = PwmSettings {
            frequency,
            duty_cycle,
        };
        self
    }
}

impl Default for PinConfig {
    fn default() -> Self {
        Self::output()
    }
}

struct LineEntry {
    owner: LineOwner,
    config: PinConfig,
    pwm_running: bool,
}

impl LineEntry {
    fn new(config: PinConfig) -> Self {
        Self {
            owner: LineOwner::Uninitialized,
            config,
            pwm_running: false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PinArbiter
// ─────────────────────────────────────────────────────────────────────────────

/// Process-wide line ownership table plus the backend that drives the lines.
#[derive(Clone)]
pub struct PinArbiter {
    table: Arc<Mutex<HashMap<u8, LineEntry>>>,
    backend: Arc<dyn GpioBackend>,
}

impl PinArbiter {
    pub fn new(backend: Arc<dyn GpioBackend>) -> Self {
        Self {
            table: Arc::new(Mutex::new(HashMap::new())),
            backend,
        }
    }

    fn table(&self) -> MutexGuard<'_, HashMap<u8, LineEntry>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Obtain a handle to `line`. The first handle for a line registers its
    /// configuration; later handles share the existing entry.
    pub fn pin(&self, line: u8, config: PinConfig) -> Pin {
        let mut table = self.table();
        let entry = table.entry(line).or_insert_with(|| LineEntry::new(config));
        if entry.config.direction != config.direction {
            warn!(
                line,
                existing = ?entry.config.direction,
                requested = ?config.direction,
                "line already registered with a different direction; keeping the first"
            );
        }
        Pin {
            line,
            arbiter: self.clone(),
        }
    }

    /// Current owner of `line`. Unknown lines are `Uninitialized`.
    pub fn owner(&self, line: u8) -> LineOwner {
        self.table()
            .get(&line)
            .map_or(LineOwner::Uninitialized, |entry| entry.owner)
    }

    pub fn is_pwm_running(&self, line: u8) -> bool {
        self.table().get(&line).is_some_and(|entry| entry.pwm_running)
    }

    /// Claim `line` for `owner`. Re-entrant for the current holder.
    ///
    /// First-time setup runs outside the table lock: the line is reserved
    /// for `owner` first, and handed back to `Uninitialized` (with the
    /// hardware torn down again) if setup fails.
    ///
    /// # Errors
    ///
    /// [`BotError::Ownership`] when another token holds the line, or the
    /// backend's error when first-time setup fails. The table is unchanged
    /// in both cases.
    pub fn acquire(&self, line: u8, owner: OwnerToken) -> Result<(), BotError> {
        let direction = {
            let mut table = self.table();
            let entry = table
                .entry(line)
                .or_insert_with(|| LineEntry::new(PinConfig::default()));
            match entry.owner {
                LineOwner::Owned(current) if current == owner => return Ok(()),
                LineOwner::Owned(_) => return Err(BotError::ownership(line, entry.owner, owner)),
                LineOwner::Free => {
                    entry.owner = LineOwner::Owned(owner);
                    return Ok(());
                }
                LineOwner::Uninitialized => {
                    entry.owner = LineOwner::Owned(owner);
                    entry.config.direction
                }
            }
        };

        if let Err(err) = self.initialize(line, direction) {
            if let Some(entry) = self.table().get_mut(&line)
                && entry.owner == LineOwner::Owned(owner)
            {
                entry.owner = LineOwner::Uninitialized;
            }
            return Err(err);
        }
        debug!(line, %owner, "line initialized");
        Ok(())
    }

    /// Configure the hardware for `line` and drive outputs low.
    fn initialize(&self, line: u8, direction: Direction) -> Result<(), BotError> {
        self.backend.setup(line, direction)?;
        if direction == Direction::Output
            && let Err(err) = self.backend.write(line, Level::Low)
        {
            if let Err(cleanup) = self.backend.cleanup(line) {
                warn!(line, %cleanup, "cleanup after failed setup also failed");
            }
            return Err(err);
        }
        Ok(())
    }

    /// Claim every line in `lines`, in order, and return the ones `owner` did
    /// not already hold. Releasing exactly those undoes the claim, so claims
    /// nest. If any claim fails, the lines this call took are released before
    /// the error is returned.
    pub fn acquire_all(&self, lines: &[u8], owner: OwnerToken) -> Result<Vec<u8>, BotError> {
        let mut newly_claimed = Vec::with_capacity(lines.len());
        for &line in lines {
            let already_held = self.owner(line) == LineOwner::Owned(owner);
            if let Err(err) = self.acquire(line, owner) {
                for &claimed in newly_claimed.iter().rev() {
                    self.release(claimed, owner);
                }
                return Err(err);
            }
            if !already_held {
                newly_claimed.push(line);
            }
        }
        Ok(newly_claimed)
    }

    /// Give `line` back. Releasing a line you do not hold does nothing.
    pub fn release(&self, line: u8, owner: OwnerToken) {
        if let Some(entry) = self.table().get_mut(&line)
            && entry.owner == LineOwner::Owned(owner)
        {
            entry.owner = LineOwner::Free;
        }
    }

    pub fn release_all(&self, lines: &[u8], owner: OwnerToken) {
        for &line in lines {
            self.release(line, owner);
        }
    }

    /// Run `f` against the entry of `line` if `owner` holds it.
    fn with_owned<T>(
        &self,
        line: u8,
        owner: OwnerToken,
        f: impl FnOnce(&mut LineEntry, &dyn GpioBackend) -> Result<T, BotError>,
    ) -> Result<T, BotError> {
        let mut table = self.table();
        match table.get_mut(&line) {
            Some(entry) if entry.owner == LineOwner::Owned(owner) => f(entry, &*self.backend),
            Some(entry) => Err(BotError::ownership(line, entry.owner, owner)),
            None => Err(BotError::ownership(line, LineOwner::Uninitialized, owner)),
        }
    }

    /// Drive an owned output line to `level`.
    ///
    /// # Errors
    ///
    /// [`BotError::Ownership`] if `owner` does not hold the line;
    /// [`BotError::HardwareConflict`] if PWM is running or the line is an
    /// input.
    pub fn set_state(&self, line: u8, owner: OwnerToken, level: Level) -> Result<(), BotError> {
        self.with_owned(line, owner, |entry, backend| {
            if entry.config.direction == Direction::Input {
                return Err(BotError::HardwareConflict {
                    line,
                    details: "cannot drive an input line".to_string(),
                });
            }
            if entry.pwm_running {
                return Err(BotError::HardwareConflict {
                    line,
                    details: format!("cannot set {level:?}: pulse width modulation running"),
                });
            }
            backend.write(line, level)
        })
    }

    /// Sample an owned input line.
    pub fn read(&self, line: u8, owner: OwnerToken) -> Result<Level, BotError> {
        self.with_owned(line, owner, |entry, backend| {
            if entry.config.direction == Direction::Output {
                return Err(BotError::HardwareConflict {
                    line,
                    details: "cannot sample an output line".to_string(),
                });
            }
            backend.read(line)
        })
    }

    /// Start PWM with the line's configured settings. No-op if running.
    pub fn start_pwm(&self, line: u8, owner: OwnerToken) -> Result<(), BotError> {
        self.with_owned(line, owner, |entry, backend| {
            if entry.config.direction == Direction::Input {
                return Err(BotError::HardwareConflict {
                    line,
                    details: "cannot modulate an input line".to_string(),
                });
            }
            if !entry.pwm_running {
                backend.start_pwm(line, entry.config.pwm)?;
                entry.pwm_running = true;
            }
            Ok(())
        })
    }

    /// Stop PWM. No-op if it was not running.
    pub fn stop_pwm(&self, line: u8, owner: OwnerToken) -> Result<(), BotError> {
        self.with_owned(line, owner, |entry, backend| {
            if entry.pwm_running {
                backend.stop_pwm(line)?;
                entry.pwm_running = false;
            }
            Ok(())
        })
    }

    /// Change the PWM frequency, reconfiguring the hardware if PWM is running.
    pub fn change_frequency(&self, line: u8, owner: OwnerToken, frequency: f64) -> Result<(), BotError> {
        if !(frequency > 0.0 && frequency.is_finite()) {
            return Err(BotError::Configuration(format!(
                "pwm frequency {frequency} must be positive"
            )));
        }
        self.with_owned(line, owner, |entry, backend| {
            let pwm = PwmSettings {
                frequency,
                ..entry.config.pwm
            };
            if entry.pwm_running {
                backend.start_pwm(line, pwm)?;
            }
            entry.config.pwm = pwm;
            Ok(())
        })
    }

    /// Change the PWM duty cycle (percent), reconfiguring the hardware if PWM
    /// is running.
    pub fn change_duty_cycle(&self, line: u8, owner: OwnerToken, duty_cycle: f64) -> Result<(), BotError> {
        if !(0.0..=100.0).contains(&duty_cycle) {
            return Err(BotError::Configuration(format!(
                "duty cycle {duty_cycle} outside 0..=100"
            )));
        }
        self.with_owned(line, owner, |entry, backend| {
            let pwm = PwmSettings {
                duty_cycle,
                ..entry.config.pwm
            };
            if entry.pwm_running {
                backend.start_pwm(line, pwm)?;
            }
            entry.config.pwm = pwm;
            Ok(())
        })
    }

    /// Put `line` in its safe state, tear down its hardware configuration and
    /// reset it to `Uninitialized`. Idempotent.
    ///
    /// # Errors
    ///
    /// [`BotError::Ownership`] when another token holds the line. Backend
    /// failures are reported after the entry has been reset anyway.
    ///
    /// # Panics
    ///
    /// If the table records PWM on an uninitialized line: ownership
    /// bookkeeping has already been violated and continuing would drive
    /// hardware nobody owns.
    pub fn shutdown(&self, line: u8, owner: OwnerToken) -> Result<(), BotError> {
        let mut table = self.table();
        let Some(entry) = table.get_mut(&line) else {
            return Ok(());
        };
        match entry.owner {
            LineOwner::Owned(current) if current != owner => {
                return Err(BotError::ownership(line, entry.owner, owner));
            }
            LineOwner::Uninitialized => {
                assert!(
                    !entry.pwm_running,
                    "line {line}: pwm recorded on an uninitialized line"
                );
                return Ok(());
            }
            _ => {}
        }

        let mut outcome = Ok(());
        if entry.pwm_running {
            outcome = outcome.and(self.backend.stop_pwm(line));
        }
        if entry.config.direction == Direction::Output {
            outcome = outcome.and(self.backend.write(line, Level::Low));
        }
        outcome = outcome.and(self.backend.cleanup(line));
        entry.pwm_running = false;
        entry.owner = LineOwner::Uninitialized;
        debug!(line, %owner, "line shut down");
        outcome
    }

    /// Shut down every line in `lines`, continuing past failures and
    /// returning the first one.
    pub fn shutdown_all(&self, lines: &[u8], owner: OwnerToken) -> Result<(), BotError> {
        lines
            .iter()
            .map(|&line| self.shutdown(line, owner))
            .fold(Ok(()), Result::and)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Pin handle
// ─────────────────────────────────────────────────────────────────────────────

/// Handle to one line in a [`PinArbiter`]. Handles for the same line share
/// one table entry.
#[derive(Clone)]
pub struct Pin {
    line: u8,
    arbiter: PinArbiter,
}

impl Pin {
    pub fn line(&self) -> u8 {
        self.line
    }

    pub fn owner(&self) -> LineOwner {
        self.arbiter.owner(self.line)
    }

    pub fn acquire(&self, owner: OwnerToken) -> Result<(), BotError> {
        self.arbiter.acquire(self.line, owner)
    }

    pub fn release(&self, owner: OwnerToken) {
        self.arbiter.release(self.line, owner);
    }

    /// Acquire, run `f`, release. The release happens even when `f` fails.
    pub fn with_claim<T>(
        &self,
        owner: OwnerToken,
        f: impl FnOnce(&Pin) -> Result<T, BotError>,
    ) -> Result<T, BotError> {
        self.acquire(owner)?;
        let result = f(self);
        self.release(owner);
        result
    }

    pub fn set_high(&self, owner: OwnerToken) -> Result<(), BotError> {
        self.arbiter.set_state(self.line, owner, Level::High)
    }

    pub fn set_low(&self, owner: OwnerToken) -> Result<(), BotError> {
        self.arbiter.set_state(self.line, owner, Level::Low)
    }

    pub fn read(&self, owner: OwnerToken) -> Result<Level, BotError> {
        self.arbiter.read(self.line, owner)
    }

    pub fn start_pwm(&self, owner: OwnerToken) -> Result<(), BotError> {
        self.arbiter.start_pwm(self.line, owner)
    }

    pub fn stop_pwm(&self, owner: OwnerToken) -> Result<(), BotError> {
        self.arbiter.stop_pwm(self.line, owner)
    }

    pub fn set_frequency(&self, frequency: f64, owner: OwnerToken) -> Result<(), BotError> {
        self.arbiter.change_frequency(self.line, owner, frequency)
    }

    pub fn set_duty_cycle(&self, duty_cycle: f64, owner: OwnerToken) -> Result<(), BotError> {
        self.arbiter.change_duty_cycle(self.line, owner, duty_cycle)
    }

    pub fn is_pwm_running(&self) -> bool {
        self.arbiter.is_pwm_running(self.line)
    }

    pub fn shutdown(&self, owner: OwnerToken) -> Result<(), BotError> {
        self.arbiter.shutdown(self.line, owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{GpioOp, SimGpio};

    const A: OwnerToken = OwnerToken::new(100);
    const B: OwnerToken = OwnerToken::new(200);

    fn arbiter() -> (Arc<SimGpio>, PinArbiter) {
        let sim = Arc::new(SimGpio::new());
        (sim.clone(), PinArbiter::new(sim))
    }

    #[test]
    fn first_acquire_initializes_hardware_once() {
        let (sim, arb) = arbiter();
        let pin = arb.pin(5, PinConfig::output());
        assert_eq!(pin.owner(), LineOwner::Uninitialized);

        pin.acquire(A).unwrap();
        pin.release(A);
        pin.acquire(A).unwrap();

        let setups = sim
            .ops()
            .iter()
            .filter(|op| matches!(op, GpioOp::Setup(5, Direction::Output)))
            .count();
        assert_eq!(setups, 1);
        assert_eq!(sim.ops()[1], GpioOp::Write(5, Level::Low));
        assert_eq!(pin.owner(), LineOwner::Owned(A));
    }

    #[test]
    fn failed_first_write_undoes_setup_and_stays_uninitialized() {
        let (sim, arb) = arbiter();
        sim.fail_next(|op| matches!(op, GpioOp::Write(5, _)));

        assert!(matches!(arb.acquire(5, A), Err(BotError::Hardware { .. })));
        assert_eq!(arb.owner(5), LineOwner::Uninitialized);
        assert_eq!(
            sim.ops(),
            vec![GpioOp::Setup(5, Direction::Output), GpioOp::Cleanup(5)]
        );

        // The next claim starts from scratch and can be taken by anyone.
        arb.acquire(5, B).unwrap();
        assert_eq!(arb.owner(5), LineOwner::Owned(B));
        assert_eq!(sim.ops()[2], GpioOp::Setup(5, Direction::Output));
    }

    #[test]
    fn failed_setup_leaves_the_line_uninitialized() {
        let (sim, arb) = arbiter();
        sim.fail_next(|op| matches!(op, GpioOp::Setup(5, _)));

        assert!(arb.acquire(5, A).is_err());
        assert_eq!(arb.owner(5), LineOwner::Uninitialized);
        assert!(sim.ops().is_empty());
    }

    #[test]
    fn acquire_is_reentrant_for_the_same_owner() {
        let (_, arb) = arbiter();
        arb.acquire(5, A).unwrap();
        arb.acquire(5, A).unwrap();
        assert_eq!(arb.owner(5), LineOwner::Owned(A));
    }

    #[test]
    fn contended_acquire_fails_and_leaves_owner_unchanged() {
        let (_, arb) = arbiter();
        arb.acquire(5, A).unwrap();

        let err = arb.acquire(5, B).unwrap_err();
        assert_eq!(
            err,
            BotError::Ownership {
                line: 5,
                current: LineOwner::Owned(A),
                requested: B,
            }
        );
        assert_eq!(arb.owner(5), LineOwner::Owned(A));
    }

    #[test]
    fn releasing_a_line_you_do_not_hold_is_a_noop() {
        let (_, arb) = arbiter();
        arb.acquire(5, A).unwrap();
        arb.release(5, B);
        assert_eq!(arb.owner(5), LineOwner::Owned(A));

        arb.release(6, B);
        assert_eq!(arb.owner(6), LineOwner::Uninitialized);
    }

    #[test]
    fn composite_acquire_rolls_back_the_first_line() {
        let (_, arb) = arbiter();
        arb.acquire(2, A).unwrap();
        arb.release(2, A);
        arb.acquire(3, B).unwrap();

        let result = arb.acquire_all(&[2, 3], A);
        assert!(matches!(result, Err(BotError::Ownership { line: 3, .. })));
        assert_eq!(arb.owner(2), LineOwner::Free);
        assert_eq!(arb.owner(3), LineOwner::Owned(B));
    }

    #[test]
    fn nested_claims_report_only_new_lines() {
        let (_, arb) = arbiter();
        arb.acquire(2, A).unwrap();
        let claimed = arb.acquire_all(&[2, 3], A).unwrap();
        assert_eq!(claimed, vec![3]);

        arb.release_all(&claimed, A);
        assert_eq!(arb.owner(2), LineOwner::Owned(A));
        assert_eq!(arb.owner(3), LineOwner::Free);
    }

    #[test]
    fn composite_rollback_keeps_lines_held_before_the_call() {
        let (_, arb) = arbiter();
        arb.acquire(2, A).unwrap();
        arb.acquire(3, B).unwrap();

        assert!(arb.acquire_all(&[2, 3], A).is_err());
        assert_eq!(arb.owner(2), LineOwner::Owned(A));
    }

    #[test]
    fn mutations_require_ownership() {
        let (_, arb) = arbiter();
        arb.acquire(5, A).unwrap();

        assert!(matches!(
            arb.set_state(5, B, Level::High),
            Err(BotError::Ownership { .. })
        ));
        assert!(matches!(arb.start_pwm(5, B), Err(BotError::Ownership { .. })));
        assert!(matches!(
            arb.change_duty_cycle(5, B, 20.0),
            Err(BotError::Ownership { .. })
        ));
        assert!(matches!(
            arb.set_state(9, A, Level::High),
            Err(BotError::Ownership { .. })
        ));
    }

    #[test]
    fn level_change_during_pwm_is_a_hardware_conflict() {
        let (_, arb) = arbiter();
        arb.acquire(5, A).unwrap();
        arb.start_pwm(5, A).unwrap();

        assert!(matches!(
            arb.set_state(5, A, Level::High),
            Err(BotError::HardwareConflict { line: 5, .. })
        ));
        assert_eq!(arb.owner(5), LineOwner::Owned(A));
    }

    #[test]
    fn pwm_reconfiguration_only_touches_hardware_while_running() {
        let (sim, arb) = arbiter();
        arb.acquire(5, A).unwrap();
        sim.clear_ops();

        arb.change_duty_cycle(5, A, 40.0).unwrap();
        assert!(sim.pwm_ops().is_empty());

        arb.start_pwm(5, A).unwrap();
        arb.start_pwm(5, A).unwrap();
        arb.change_frequency(5, A, 200.0).unwrap();

        assert_eq!(
            sim.pwm_ops(),
            vec![
                GpioOp::StartPwm(5, PwmSettings { frequency: 50.0, duty_cycle: 40.0 }),
                GpioOp::StartPwm(5, PwmSettings { frequency: 200.0, duty_cycle: 40.0 }),
            ]
        );
        assert_eq!(arb.owner(5), LineOwner::Owned(A));
    }

    #[test]
    fn duty_cycle_outside_percent_range_is_rejected() {
        let (_, arb) = arbiter();
        arb.acquire(5, A).unwrap();
        assert!(matches!(
            arb.change_duty_cycle(5, A, 140.0),
            Err(BotError::Configuration(_))
        ));
    }

    #[test]
    fn input_lines_can_be_read_but_not_driven() {
        let (sim, arb) = arbiter();
        let echo = arb.pin(7, PinConfig::input());
        sim.script_input(7, [Level::High]);
        echo.acquire(A).unwrap();

        assert_eq!(echo.read(A).unwrap(), Level::High);
        assert!(matches!(echo.set_high(A), Err(BotError::HardwareConflict { .. })));
        assert!(!sim.ops().contains(&GpioOp::Write(7, Level::Low)));
    }

    #[test]
    fn shutdown_resets_to_uninitialized_and_is_idempotent() {
        let (sim, arb) = arbiter();
        arb.acquire(5, A).unwrap();
        arb.start_pwm(5, A).unwrap();
        sim.clear_ops();

        arb.shutdown(5, A).unwrap();
        arb.shutdown(5, A).unwrap();

        assert_eq!(arb.owner(5), LineOwner::Uninitialized);
        assert!(!arb.is_pwm_running(5));
        assert_eq!(
            sim.ops(),
            vec![
                GpioOp::StopPwm(5),
                GpioOp::Write(5, Level::Low),
                GpioOp::Cleanup(5),
            ]
        );
    }

    #[test]
    fn shutdown_of_a_line_held_by_someone_else_fails() {
        let (_, arb) = arbiter();
        arb.acquire(5, A).unwrap();
        assert!(matches!(arb.shutdown(5, B), Err(BotError::Ownership { .. })));
        assert_eq!(arb.owner(5), LineOwner::Owned(A));
    }

    #[test]
    fn shutdown_of_a_free_line_is_allowed() {
        let (_, arb) = arbiter();
        arb.acquire(5, A).unwrap();
        arb.release(5, A);
        arb.shutdown(5, B).unwrap();
        assert_eq!(arb.owner(5), LineOwner::Uninitialized);
    }

    #[test]
    fn pins_for_the_same_line_share_one_entry() {
        let (_, arb) = arbiter();
        let first = arb.pin(8, PinConfig::output());
        let second = arb.pin(8, PinConfig::output());
        first.acquire(A).unwrap();
        assert_eq!(second.owner(), LineOwner::Owned(A));
        assert!(second.acquire(B).is_err());
    }

    #[test]
    fn concurrent_acquires_grant_exactly_one_owner() {
        let (_, arb) = arbiter();
        let handles: Vec<_> = (1..=8)
            .map(|n| {
                let arb = arb.clone();
                std::thread::spawn(move || arb.acquire(12, OwnerToken::new(n)).is_ok())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
