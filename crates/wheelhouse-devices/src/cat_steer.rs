//! Differential ("cat") drive: two motors that pivot by running opposite ways.
//!
//! Speed is given in user units in `[0, max_speed]` and mapped linearly onto
//! the PWM duty cycle:
//!
//! ```text
//! duty = speed * max_duty / max_speed
//! ```
//!
//! `forward` and `reverse` run at the last accepted drive speed, `left` and
//! `right` at the configured turn speed. With soft start enabled every
//! drive or turn command first holds `burst_duty` for `burst_settle_ms`, then
//! drops to the steady duty; the calling thread blocks for the whole burst.

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};
use wheelhouse_hal::{Motor, PinArbiter, PwmSettings};
use wheelhouse_middleware::{Driver, Mailbox};
use wheelhouse_types::{BotError, OwnerToken, Payload};

fn default_pwm_frequency() -> f64 {
    100.0
}

fn default_max_duty() -> f64 {
    35.0
}

fn default_max_speed() -> f64 {
    5.0
}

fn default_turn_speed() -> f64 {
    1.5
}

fn default_soft_start() -> bool {
    true
}

fn default_burst_duty() -> f64 {
    100.0
}

fn default_burst_settle_ms() -> u64 {
    150
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatSteerConfig {
    pub name: String,
    pub left_forward_line: u8,
    pub left_reverse_line: u8,
    pub right_forward_line: u8,
    pub right_reverse_line: u8,
    #[serde(default = "default_pwm_frequency")]
    pub pwm_frequency: f64,
    #[serde(default = "default_max_duty")]
    pub max_duty: f64,
    /// Initial drive speed.
    #[serde(default)]
    pub speed: f64,
    #[serde(default = "default_max_speed")]
    pub max_speed: f64,
    #[serde(default = "default_turn_speed")]
    pub turn_speed: f64,
    #[serde(default = "default_soft_start")]
    pub soft_start: bool,
    #[serde(default = "default_burst_duty")]
    pub burst_duty: f64,
    #[serde(default = "default_burst_settle_ms")]
    pub burst_settle_ms: u64,
}

impl CatSteerConfig {
    pub fn validate(&self) -> Result<(), BotError> {
        let bad = |what: String| Err(BotError::Configuration(format!("cat steer {}: {what}", self.name)));
        if !(self.max_speed > 0.0) {
            return bad(format!("max_speed {} must be positive", self.max_speed));
        }
        if !(0.0..=100.0).contains(&self.max_duty) || !(0.0..=100.0).contains(&self.burst_duty) {
            return bad("duty cycles must lie in 0..=100".to_string());
        }
        for (label, speed) in [("speed", self.speed), ("turn_speed", self.turn_speed)] {
            if !(0.0..=self.max_speed).contains(&speed) {
                return bad(format!("{label} {speed} outside 0..={}", self.max_speed));
            }
        }
        let mut lines = [
            self.left_forward_line,
            self.left_reverse_line,
            self.right_forward_line,
            self.right_reverse_line,
        ];
        lines.sort_unstable();
        if lines.windows(2).any(|pair| pair[0] == pair[1]) {
            return bad("motor lines must be distinct".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SteerCommand {
    Forward,
    Reverse,
    Left,
    Right,
    Brake,
    Coast,
    #[serde(rename = "setspeed")]
    SetSpeed { speed: f64 },
}

type MotorOp = fn(&mut Motor, OwnerToken) -> Result<(), BotError>;

pub struct CatSteer {
    arbiter: PinArbiter,
    left: Motor,
    right: Motor,
    max_duty: f64,
    max_speed: f64,
    turn_speed: f64,
    /// Speed the motors currently run at.
    speed: f64,
    /// Last accepted `setspeed`.
    drive_speed: f64,
    turning: bool,
    soft_start: bool,
    burst_duty: f64,
    burst_settle: Duration,
}

impl CatSteer {
    pub fn new(arbiter: &PinArbiter, config: &CatSteerConfig) -> Result<Self, BotError> {
        config.validate()?;
        let pwm = PwmSettings {
            frequency: config.pwm_frequency,
            duty_cycle: config.max_duty,
        };
        Ok(Self {
            arbiter: arbiter.clone(),
            left: Motor::new(arbiter, config.left_forward_line, config.left_reverse_line, pwm),
            right: Motor::new(arbiter, config.right_forward_line, config.right_reverse_line, pwm),
            max_duty: config.max_duty,
            max_speed: config.max_speed,
            turn_speed: config.turn_speed,
            speed: config.speed,
            drive_speed: config.speed,
            turning: false,
            soft_start: config.soft_start,
            burst_duty: config.burst_duty,
            burst_settle: Duration::from_millis(config.burst_settle_ms),
        })
    }

    /// Duty cycle for the current speed.
    pub fn duty(&self) -> f64 {
        self.duty_for(self.speed)
    }

    fn duty_for(&self, speed: f64) -> f64 {
        speed * self.max_duty / self.max_speed
    }

    pub fn drive_speed(&self) -> f64 {
        self.drive_speed
    }

    fn lines(&self) -> [u8; 4] {
        let [lf, lr] = self.left.lines();
        let [rf, rr] = self.right.lines();
        [lf, lr, rf, rr]
    }

    /// Hold all four lines for `f`, so the pair moves under one claim.
    fn with_both<T>(
        &mut self,
        owner: OwnerToken,
        f: impl FnOnce(&mut Self) -> Result<T, BotError>,
    ) -> Result<T, BotError> {
        let claimed = self.arbiter.acquire_all(&self.lines(), owner)?;
        let result = f(self);
        self.arbiter.release_all(&claimed, owner);
        result
    }

    fn set_duty(&mut self, duty: f64, owner: OwnerToken) -> Result<(), BotError> {
        self.left.set_duty_cycle(duty, owner)?;
        self.right.set_duty_cycle(duty, owner)
    }

    fn burst_start(&mut self, duty: f64, owner: OwnerToken) -> Result<(), BotError> {
        self.set_duty(self.burst_duty, owner)?;
        thread::sleep(self.burst_settle);
        self.set_duty(duty, owner)
    }

    /// Put each motor in its own state, then bring the pair up to `speed`.
    /// `speed` and the turning flag only change once all of that worked.
    fn move_pair(
        &mut self,
        left: MotorOp,
        right: MotorOp,
        speed: f64,
        turning: bool,
        owner: OwnerToken,
    ) -> Result<(), BotError> {
        left(&mut self.left, owner)?;
        right(&mut self.right, owner)?;
        let duty = self.duty_for(speed);
        debug!(speed, duty, turning, "cat steer moving");
        if self.soft_start {
            self.burst_start(duty, owner)?;
        } else {
            self.set_duty(duty, owner)?;
        }
        self.speed = speed;
        self.turning = turning;
        Ok(())
    }

    fn halt(&mut self, op: MotorOp, owner: OwnerToken) -> Result<(), BotError> {
        op(&mut self.left, owner)?;
        op(&mut self.right, owner)?;
        self.turning = false;
        Ok(())
    }

    fn set_speed(&mut self, speed: f64, owner: OwnerToken, mailbox: &Mailbox) -> Result<(), BotError> {
        if !(0.0..=self.max_speed).contains(&speed) {
            warn!(speed, max_speed = self.max_speed, "rejecting speed");
            mailbox.warn(format!("speed {speed:.3} is invalid"));
            mailbox.schedule(Payload::with_args("setspeed", [("speed", json!(0))]), 0);
            return Ok(());
        }
        let running = if self.turning { self.speed } else { speed };
        let duty = self.duty_for(running);
        self.with_both(owner, |steer| steer.set_duty(duty, owner))?;
        self.drive_speed = speed;
        self.speed = running;
        Ok(())
    }
}

impl Driver for CatSteer {
    type Command = SteerCommand;

    fn execute(&mut self, command: SteerCommand, owner: OwnerToken, mailbox: &Mailbox) -> Result<(), BotError> {
        match command {
            SteerCommand::SetSpeed { speed } => self.set_speed(speed, owner, mailbox),
            SteerCommand::Forward => self.with_both(owner, |s| {
                s.move_pair(Motor::forward, Motor::forward, s.drive_speed, false, owner)
            }),
            SteerCommand::Reverse => self.with_both(owner, |s| {
                s.move_pair(Motor::reverse, Motor::reverse, s.drive_speed, false, owner)
            }),
            SteerCommand::Left => self.with_both(owner, |s| {
                s.move_pair(Motor::reverse, Motor::forward, s.turn_speed, true, owner)
            }),
            SteerCommand::Right => self.with_both(owner, |s| {
                s.move_pair(Motor::forward, Motor::reverse, s.turn_speed, true, owner)
            }),
            SteerCommand::Brake => self.with_both(owner, |s| s.halt(Motor::brake, owner)),
            SteerCommand::Coast => self.with_both(owner, |s| s.halt(Motor::coast, owner)),
        }
    }

    fn stop(&mut self, owner: OwnerToken) -> Result<(), BotError> {
        let left = self.left.shutdown(owner);
        let right = self.right.shutdown(owner);
        self.turning = false;
        left.and(right)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use wheelhouse_hal::{GpioOp, SimGpio};
    use wheelhouse_types::{BotError, LineOwner};

    use super::*;

    const A: OwnerToken = OwnerToken::new(21);

    fn config() -> CatSteerConfig {
        CatSteerConfig {
            name: "tracks".to_string(),
            left_forward_line: 5,
            left_reverse_line: 6,
            right_forward_line: 13,
            right_reverse_line: 19,
            pwm_frequency: 100.0,
            max_duty: 35.0,
            speed: 0.0,
            max_speed: 5.0,
            turn_speed: 1.5,
            soft_start: false,
            burst_duty: 100.0,
            burst_settle_ms: 0,
        }
    }

    fn steer(config: CatSteerConfig) -> (Arc<SimGpio>, PinArbiter, CatSteer) {
        let sim = Arc::new(SimGpio::new());
        let arbiter = PinArbiter::new(sim.clone());
        let steer = CatSteer::new(&arbiter, &config).unwrap();
        (sim, arbiter, steer)
    }

    fn duty_writes(sim: &SimGpio) -> Vec<f64> {
        sim.pwm_ops()
            .into_iter()
            .filter_map(|op| match op {
                GpioOp::StartPwm(_, pwm) => Some(pwm.duty_cycle),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn speed_scales_linearly_onto_duty() {
        let (_, _, mut steer) = steer(config());
        let mailbox = Mailbox::new("tracks");
        steer
            .execute(SteerCommand::SetSpeed { speed: 2.5 }, A, &mailbox)
            .unwrap();
        assert!((steer.duty() - 17.5).abs() < 1e-9);
        assert!(mailbox.is_empty());
    }

    #[test]
    fn left_pivots_and_uses_turn_speed() {
        let (_, arbiter, mut steer) = steer(config());
        let mailbox = Mailbox::new("tracks");
        steer.execute(SteerCommand::SetSpeed { speed: 4.0 }, A, &mailbox).unwrap();
        steer.execute(SteerCommand::Left, A, &mailbox).unwrap();

        assert!(arbiter.is_pwm_running(6));
        assert!(!arbiter.is_pwm_running(5));
        assert!(arbiter.is_pwm_running(13));
        assert!(!arbiter.is_pwm_running(19));
        assert!((steer.duty() - 1.5 * 7.0).abs() < 1e-9);

        steer.execute(SteerCommand::Forward, A, &mailbox).unwrap();
        assert!((steer.duty() - 28.0).abs() < 1e-9);
    }

    #[test]
    fn out_of_range_speed_warns_and_schedules_zero() {
        let (sim, _, mut steer) = steer(config());
        let mailbox = Mailbox::new("tracks");
        sim.clear_ops();

        steer.execute(SteerCommand::SetSpeed { speed: 7.0 }, A, &mailbox).unwrap();

        assert!(sim.ops().is_empty());
        assert_eq!(steer.drive_speed(), 0.0);
        let out = mailbox.drain();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].payload.key(), "speed 7.000 is invalid");
        assert!(out[1].is_self_addressed());
        assert_eq!(out[1].delay, 0);
        assert_eq!(
            out[1].payload.decode::<SteerCommand>().unwrap(),
            SteerCommand::SetSpeed { speed: 0.0 }
        );
    }

    #[test]
    fn failed_pivot_keeps_the_previous_speed_and_heading() {
        let (sim, _, mut steer) = steer(config());
        let mailbox = Mailbox::new("tracks");
        steer.execute(SteerCommand::SetSpeed { speed: 4.0 }, A, &mailbox).unwrap();
        steer.execute(SteerCommand::Forward, A, &mailbox).unwrap();

        sim.fail_next(|op| matches!(op, GpioOp::StartPwm(6, _)));
        assert!(steer.execute(SteerCommand::Left, A, &mailbox).is_err());
        assert!((steer.duty() - 28.0).abs() < 1e-9);

        // Still driving straight, so a new speed applies at once.
        steer.execute(SteerCommand::SetSpeed { speed: 2.0 }, A, &mailbox).unwrap();
        assert!((steer.duty() - 14.0).abs() < 1e-9);
    }

    #[test]
    fn failed_speed_change_is_not_remembered() {
        let (sim, _, mut steer) = steer(config());
        let mailbox = Mailbox::new("tracks");
        steer.execute(SteerCommand::SetSpeed { speed: 4.0 }, A, &mailbox).unwrap();
        steer.execute(SteerCommand::Forward, A, &mailbox).unwrap();

        sim.fail_next(|op| matches!(op, GpioOp::StartPwm(..)));
        assert!(steer.execute(SteerCommand::SetSpeed { speed: 1.0 }, A, &mailbox).is_err());
        assert_eq!(steer.drive_speed(), 4.0);
        assert!((steer.duty() - 28.0).abs() < 1e-9);
    }

    #[test]
    fn soft_start_bursts_before_settling() {
        let mut cfg = config();
        cfg.soft_start = true;
        cfg.speed = 5.0;
        let (sim, _, mut steer) = steer(cfg);
        sim.clear_ops();

        steer.execute(SteerCommand::Reverse, A, &Mailbox::new("tracks")).unwrap();

        let duties = duty_writes(&sim);
        let burst = duties.iter().position(|&d| d == 100.0).unwrap();
        assert!(duties[burst..].iter().any(|&d| d == 35.0));
        assert_eq!(*duties.last().unwrap(), 35.0);
    }

    #[test]
    fn a_held_line_blocks_the_whole_pair() {
        let (sim, arbiter, mut steer) = steer(config());
        arbiter.acquire(19, OwnerToken::new(77)).unwrap();
        sim.clear_ops();

        let err = steer
            .execute(SteerCommand::Forward, A, &Mailbox::new("tracks"))
            .unwrap_err();
        assert!(matches!(err, BotError::Ownership { line: 19, .. }));
        assert!(sim.pwm_ops().is_empty());
        assert_eq!(arbiter.owner(5), LineOwner::Free);
    }

    #[test]
    fn stop_tears_down_all_four_lines() {
        let (_, arbiter, mut steer) = steer(config());
        steer.execute(SteerCommand::Brake, A, &Mailbox::new("tracks")).unwrap();
        steer.stop(A).unwrap();
        for line in [5, 6, 13, 19] {
            assert_eq!(arbiter.owner(line), LineOwner::Uninitialized);
        }
    }

    #[test]
    fn validation_rejects_shared_lines_and_bad_speeds() {
        let mut shared = config();
        shared.right_reverse_line = 5;
        assert!(shared.validate().is_err());

        let mut slow = config();
        slow.max_speed = 0.0;
        assert!(slow.validate().is_err());

        let mut fast_turn = config();
        fast_turn.turn_speed = 9.0;
        assert!(fast_turn.validate().is_err());
    }
}
