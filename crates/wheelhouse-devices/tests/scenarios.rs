//! End-to-end behaviour through a manager, with simulated GPIO and serial
//! ports.

use std::sync::Arc;

use serde_json::json;
use wheelhouse_devices::{
    CatSteerConfig, DeviceConfig, DrivetrainConfig, IndicatorLightConfig, MotorConfig, RangeFinderConfig,
};
use wheelhouse_hal::{PinArbiter, SimGpio};
use wheelhouse_middleware::{DeviceManager, ExternalPort, ManagerConfig};
use wheelhouse_serial::{BridgeConfig, Field, Frame, ScriptedDevice, ScriptedPorts};
use wheelhouse_types::{LineOwner, Message, Payload, ROBOT, now_ms};

struct Rig {
    sim: Arc<SimGpio>,
    arbiter: PinArbiter,
    manager: DeviceManager,
    port: ExternalPort,
}

fn rig() -> Rig {
    let sim = Arc::new(SimGpio::new());
    let arbiter = PinArbiter::new(sim.clone());
    let (manager, port) = DeviceManager::new(ManagerConfig::default());
    Rig {
        sim,
        arbiter,
        manager,
        port,
    }
}

impl Rig {
    fn load(&mut self, config: DeviceConfig, ports: &ScriptedPorts) {
        let device = config.build(&self.arbiter, ports).unwrap();
        self.manager.load(device).unwrap();
    }

    fn send(&mut self, device: &str, payload: Payload) {
        self.manager
            .submit(Message::new(payload).addressed_to(ROBOT, device));
    }

    fn outbound(&mut self) -> Vec<Message> {
        let mut out = Vec::new();
        while let Ok(message) = self.port.outbound.try_recv() {
            out.push(message);
        }
        out
    }
}

fn cat_steer() -> DeviceConfig {
    DeviceConfig::CatSteer(CatSteerConfig {
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
        soft_start: true,
        burst_duty: 100.0,
        burst_settle_ms: 1,
    })
}

#[test]
fn out_of_range_speed_queues_a_correction_and_leaves_hardware_alone() {
    let mut rig = rig();
    rig.load(cat_steer(), &ScriptedPorts::new());
    rig.sim.clear_ops();

    rig.send("tracks", Payload::with_args("setspeed", [("speed", json!(7))]));
    rig.manager.tick_at(now_ms());

    assert!(rig.sim.ops().is_empty());
    let warnings: Vec<_> = rig.outbound().into_iter().filter(Message::is_warning).collect();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].payload.key(), "speed 7.000 is invalid");

    let queued: Vec<_> = rig.manager.queued().collect();
    assert_eq!(queued.len(), 1);
    assert!(queued[0].is_self_addressed());
    assert_eq!(queued[0].destination_device, "tracks");
    assert_eq!(
        queued[0].payload,
        Payload::with_args("setspeed", [("speed", json!(0))])
    );
}

#[test]
fn correction_is_applied_on_the_next_tick() {
    let mut rig = rig();
    rig.load(cat_steer(), &ScriptedPorts::new());
    rig.send("tracks", Payload::with_args("setspeed", [("speed", json!(-1))]));

    rig.manager.tick_at(now_ms());
    rig.outbound();
    assert_eq!(rig.manager.tick_at(now_ms() + 1), 1);

    let out = rig.outbound();
    assert!(out.iter().all(|m| !m.is_warning()));
    assert!(out.iter().any(|m| m.payload.key() == "setspeed"));
    assert_eq!(rig.manager.queue_len(), 0);
}

#[test]
fn silent_range_finder_warns_once_and_reports_no_reading() {
    let mut rig = rig();
    rig.load(
        DeviceConfig::RangeFinder(RangeFinderConfig {
            name: "sonar".to_string(),
            trigger_line: 23,
            echo_line: 24,
            timeout_iterations: 50,
        }),
        &ScriptedPorts::new(),
    );

    rig.send("sonar", Payload::command("get"));
    rig.manager.tick_at(now_ms());

    let out = rig.outbound();
    let warnings: Vec<_> = out.iter().filter(|m| m.is_warning()).collect();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].payload.key(), "range finder timed out");
    assert!(out.iter().all(|m| m.payload.key().parse::<f64>().is_err()));
    assert_eq!(rig.arbiter.owner(24), LineOwner::Free);
}

#[test]
fn range_finder_reports_a_reading_with_twelve_decimals() {
    let mut rig = rig();
    rig.load(
        DeviceConfig::RangeFinder(RangeFinderConfig {
            name: "sonar".to_string(),
            trigger_line: 23,
            echo_line: 24,
            timeout_iterations: 50,
        }),
        &ScriptedPorts::new(),
    );
    rig.sim
        .script_input(24, [wheelhouse_hal::Level::Low, wheelhouse_hal::Level::High, wheelhouse_hal::Level::High]);

    rig.send("sonar", Payload::command("get"));
    rig.manager.tick_at(now_ms());

    let reading = rig
        .outbound()
        .into_iter()
        .find(|m| m.payload.key().parse::<f64>().is_ok())
        .unwrap();
    let (_, decimals) = reading.payload.key().split_once('.').unwrap();
    assert_eq!(decimals.len(), 12);
}

#[test]
fn echo_arriving_one_sample_past_the_budget_is_a_timeout() {
    use wheelhouse_hal::Level::{High, Low};

    let mut rig = rig();
    rig.load(
        DeviceConfig::RangeFinder(RangeFinderConfig {
            name: "sonar".to_string(),
            trigger_line: 23,
            echo_line: 24,
            timeout_iterations: 2,
        }),
        &ScriptedPorts::new(),
    );
    rig.sim.script_input(24, [Low, Low, High, High, Low]);

    rig.send("sonar", Payload::command("get"));
    rig.manager.tick_at(now_ms());

    let out = rig.outbound();
    assert_eq!(out.iter().filter(|m| m.is_warning()).count(), 1);
    assert!(out.iter().all(|m| m.payload.key().parse::<f64>().is_err()));
}

#[test]
fn unloading_a_motor_uninitializes_its_lines() {
    let mut rig = rig();
    rig.load(
        DeviceConfig::Motor(MotorConfig {
            name: "winch".to_string(),
            forward_line: 17,
            reverse_line: 18,
            frequency: 50.0,
            duty_cycle: 100.0,
        }),
        &ScriptedPorts::new(),
    );
    rig.send("winch", Payload::command("forward"));
    rig.manager.tick_at(now_ms());
    assert!(rig.arbiter.is_pwm_running(17));
    assert_eq!(rig.arbiter.owner(17), LineOwner::Free);

    rig.manager.unload("winch").unwrap();

    assert!(!rig.manager.is_loaded("winch"));
    assert_eq!(rig.arbiter.owner(17), LineOwner::Uninitialized);
    assert_eq!(rig.arbiter.owner(18), LineOwner::Uninitialized);
    assert!(!rig.arbiter.is_pwm_running(17));
}

#[test]
fn flash_turns_off_after_its_delay() {
    let mut rig = rig();
    rig.load(
        DeviceConfig::IndicatorLight(IndicatorLightConfig {
            name: "status".to_string(),
            line: 4,
            frequency: 1.0,
            duty_cycle: 100.0,
        }),
        &ScriptedPorts::new(),
    );

    rig.send("status", Payload::with_args("flash", [("seconds_to_flash", json!(2))]));
    let start = now_ms();
    rig.manager.tick_at(start);
    assert!(rig.arbiter.is_pwm_running(4));

    let off = rig.manager.queued().next().unwrap().clone();
    assert_eq!(off.payload, Payload::command("off"));
    assert_eq!(off.delay, 2000);

    rig.manager.tick_at(off.ready_time() - 1);
    assert!(rig.arbiter.is_pwm_running(4));

    rig.manager.tick_at(off.ready_time());
    assert!(!rig.arbiter.is_pwm_running(4));
    assert_eq!(rig.manager.queue_len(), 0);
}

/// Board that identifies as `name` and acknowledges speed commands.
fn drive_board(name: &'static str) -> ScriptedDevice {
    ScriptedDevice::new(move |frame: &Frame| match frame.command.as_str() {
        "who_are_you" => Some(Frame::new("who_are_you_return", vec![Field::from(name)])),
        "set_speed" => Some(Frame::new("set_speed_return", frame.fields.clone())),
        _ => None,
    })
}

#[test]
fn drivetrain_binds_to_the_second_of_three_ports() {
    let ports = ScriptedPorts::new()
        .with_port("/dev/ttyACM0", drive_board("lights"))
        .with_port("/dev/ttyACM1", drive_board("drive"))
        .with_port("/dev/ttyACM2", drive_board("drive"));
    let mut rig = rig();
    rig.load(
        DeviceConfig::Drivetrain(DrivetrainConfig {
            name: "wheels".to_string(),
            serial: BridgeConfig {
                reply_timeout_ms: 50,
                ..BridgeConfig::new("drive")
            },
            min_speed: 0.0,
            max_speed: 2.0,
            user_unit_to_rps: 0.7596357,
        }),
        &ports,
    );

    let out = rig.outbound();
    assert_eq!(
        out[0].payload.key(),
        "drive connected on /dev/ttyACM1 at 9600 baud."
    );
    assert!(out.iter().all(|m| !m.is_warning()));
    assert_eq!(ports.device("/dev/ttyACM0").unwrap().open_links(), 0);
    assert_eq!(ports.device("/dev/ttyACM2").unwrap().times_opened(), 0);

    rig.send("wheels", Payload::with_args("setspeed", [("speed", json!(1))]));
    rig.send("wheels", Payload::command("forward"));
    rig.manager.tick_at(now_ms());

    let speeds: Vec<_> = ports
        .device("/dev/ttyACM1")
        .unwrap()
        .received()
        .into_iter()
        .filter(|f| f.command == "set_speed")
        .collect();
    assert_eq!(speeds.len(), 3);
    let forward = speeds.last().unwrap();
    assert!((forward.field(0).unwrap().as_f64().unwrap() - 0.7596357).abs() < 1e-6);
}

#[test]
fn missing_board_leaves_a_stub_that_only_warns() {
    let ports = ScriptedPorts::new().with_port("/dev/ttyACM0", drive_board("lights"));
    let mut rig = rig();
    rig.load(
        DeviceConfig::Drivetrain(DrivetrainConfig {
            name: "wheels".to_string(),
            serial: BridgeConfig {
                reply_timeout_ms: 20,
                ..BridgeConfig::new("drive")
            },
            min_speed: 0.0,
            max_speed: 2.0,
            user_unit_to_rps: 0.7596357,
        }),
        &ports,
    );
    let attach = rig.outbound();
    assert_eq!(
        attach[0].payload.key(),
        "Could not find usb device identifying as drive"
    );

    rig.send("wheels", Payload::command("forward"));
    rig.manager.tick_at(now_ms());

    let out = rig.outbound();
    assert!(out.iter().any(|m| m.is_warning() && m.payload.key() == "wheels is not connected"));
    assert_eq!(rig.manager.queue_len(), 0);
}
