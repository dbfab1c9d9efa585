//! `wheelhouse` – runs the robot described by a TOML file.
//!
//! The binary:
//!
//! 1. Loads the robot config (`--config`), applying `WHEELHOUSE_*` overrides.
//! 2. Picks a GPIO backend: Raspberry Pi lines when built with the `rpi`
//!    feature, otherwise (or with `--sim`) the recording simulator.
//! 3. Builds and loads every configured device into a [`DeviceManager`].
//! 4. Bridges the manager to the outside world over stdio: one wire message
//!    per stdin line in, one JSON message per stdout line out.
//! 5. Intercepts **Ctrl-C**, stops every device and exits.

mod config;
mod telemetry;

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use clap::Parser;
use colored::Colorize;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use wheelhouse_hal::{GpioBackend, PinArbiter, SimGpio};
use wheelhouse_middleware::{DeviceManager, Inbound};
use wheelhouse_serial::SystemPorts;
use wheelhouse_types::Message;

#[derive(Parser, Debug)]
#[command(name = "wheelhouse")]
#[command(about = "Message-driven robot runtime", long_about = None)]
struct Args {
    /// Robot description (TOML).
    #[arg(long)]
    config: PathBuf,

    /// Use the simulated GPIO backend even when real hardware is available.
    #[arg(long)]
    sim: bool,

    /// Override the manager poll interval in milliseconds.
    #[arg(long)]
    poll_interval_ms: Option<u64>,
}

fn main() {
    let args = Args::parse();
    telemetry::init_tracing();
    print_banner();

    let mut cfg = match config::load(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}: {}", "Config error".red(), e);
            std::process::exit(1);
        }
    };
    if let Some(ms) = args.poll_interval_ms {
        cfg.poll_interval_ms = ms;
    }
    eprintln!(
        "  Config loaded from {}",
        args.config.display().to_string().bold()
    );

    // ── Hardware ──────────────────────────────────────────────────────────
    let arbiter = PinArbiter::new(gpio_backend(args.sim));
    let ports = SystemPorts::new(cfg.serial_port_prefix.clone());

    // ── Devices ───────────────────────────────────────────────────────────
    let (mut manager, port) = DeviceManager::new(cfg.manager_config());
    for device in &cfg.devices {
        match device.build(&arbiter, &ports) {
            Ok(built) => {
                // Load failures are reported by the manager itself.
                let _ = manager.load(built);
            }
            Err(err) => {
                warn!(device = device.name(), kind = device.kind(), %err, "device not built");
                manager.emit_warning(format!("{} not loaded: {err}", device.name()));
            }
        }
    }
    let names = manager.device_names().join(", ");
    eprintln!(
        "  {} {} device(s) loaded: {}",
        "✓".green().bold(),
        manager.device_names().len(),
        names
    );

    // ── Stdio boundary ────────────────────────────────────────────────────
    spawn_stdin_reader(port.inbound);
    let writer = spawn_stdout_writer(port.outbound);

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!();
        eprintln!("{}", "⚠  Ctrl-C received – stopping devices …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; devices will not be stopped on Ctrl-C");
    }

    manager.run(shutdown);

    // The manager is gone, so the outbound channel is closed and the writer
    // drains what is left.
    if writer.join().is_err() {
        warn!("stdout writer panicked");
    }
    eprintln!("{}", "  ✓ All devices stopped.".green());
}

// ─────────────────────────────────────────────────────────────────────────────
// Hardware selection
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(feature = "rpi")]
fn gpio_backend(sim: bool) -> Arc<dyn GpioBackend> {
    if sim {
        return Arc::new(SimGpio::new());
    }
    match wheelhouse_hal::RppalGpio::open() {
        Ok(gpio) => {
            info!("using Raspberry Pi GPIO");
            Arc::new(gpio)
        }
        Err(err) => {
            warn!(%err, "GPIO unavailable; falling back to simulation");
            Arc::new(SimGpio::new())
        }
    }
}

#[cfg(not(feature = "rpi"))]
fn gpio_backend(sim: bool) -> Arc<dyn GpioBackend> {
    if !sim {
        info!("built without the rpi feature; using simulated GPIO");
    }
    Arc::new(SimGpio::new())
}

// ─────────────────────────────────────────────────────────────────────────────
// Stdio boundary
// ─────────────────────────────────────────────────────────────────────────────

/// Forward each non-blank stdin line to the manager as a wire message.
fn spawn_stdin_reader(inbound: UnboundedSender<Inbound>) {
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if line.trim().is_empty() {
                continue;
            }
            if inbound.send(Inbound::Wire(line)).is_err() {
                break;
            }
        }
        debug!("stdin closed");
    });
}

/// Print each outbound message as one JSON line until the manager goes away.
fn spawn_stdout_writer(mut outbound: UnboundedReceiver<Message>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let stdout = std::io::stdout();
        while let Some(message) = outbound.blocking_recv() {
            match message.to_wire() {
                Ok(line) => {
                    let mut out = stdout.lock();
                    if writeln!(out, "{line}").and_then(|_| out.flush()).is_err() {
                        break;
                    }
                }
                Err(err) => warn!(%err, "could not serialize outbound message"),
            }
        }
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    eprintln!();
    eprintln!(
        "  {} {}",
        "wheelhouse".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    eprintln!("  Message-driven robot runtime");
    eprintln!();
}
