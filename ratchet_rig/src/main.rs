//! # Ratchet Rig
//!
//! Simulated-machine driver for the ratchet_core scheduler: the "external
//! collaborators" of the engine given a concrete shape. It plays three
//! roles the engine deliberately does not own:
//!
//! - **Tick driver**: calls `Scheduler::run()` once per fixed period.
//! - **Hardware subsystems**: simulated launcher/feeder/chassis models
//!   actuated only through commands.
//! - **Command factory / dispatcher**: builds composite routines and
//!   schedules them, including a mid-run cancellation.
//!
//! The rig runs a launch routine, cancels a queued eject routine partway
//! through, and reports ownership and fault state on the way out.

mod config;
mod machine;

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::Parser;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use ratchet_core::{Command, Scheduler, SubsystemId};

use crate::config::RigConfig;
use crate::machine::{IdleHold, eject_routine, machine_with_piece, shoot_routine};

/// Ratchet Rig — simulated machine & tick driver
#[derive(Parser, Debug)]
#[command(name = "ratchet_rig")]
#[command(version)]
#[command(about = "Fixed-tick driver for the ratchet_core command scheduler")]
struct Args {
    /// Path to the rig configuration TOML.
    #[arg(long, default_value = "config/rig.toml")]
    config: PathBuf,

    /// Override the configured number of ticks to run.
    #[arg(long)]
    ticks: Option<u64>,

    /// Run as fast as possible instead of sleeping between ticks.
    #[arg(long)]
    no_sleep: bool,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn init_logging(args: &Args) {
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    if args.json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).compact().init();
    }
}

fn main() {
    let args = Args::parse();
    init_logging(&args);
    info!("Ratchet Rig starting...");

    let config = match RigConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("failed to load {}: {e}", args.config.display());
            process::exit(1);
        }
    };
    let run_ticks = args.ticks.unwrap_or(config.rig.run_ticks);
    let period = Duration::from_millis(config.rig.tick_period_ms);
    info!(
        "rig: {} subsystems, {} ticks @ {}ms",
        config.subsystems.len(),
        run_ticks,
        config.rig.tick_period_ms
    );

    // ── Registration ────────────────────────────────────────────────
    let machine = machine_with_piece();
    let mut sched = Scheduler::new();
    let mut handles: Vec<(String, SubsystemId)> = Vec::new();
    for sub in &config.subsystems {
        let id = sched.register_subsystem(&sub.name);
        if sub.idle_hold {
            // Lowest-priority holder for an otherwise-idle mechanism.
            let hold = Command::action(IdleHold::new(&machine), [id]).named("idle-hold");
            if let Err(e) = sched.set_default_command(id, hold) {
                error!("cannot install idle-hold on '{}': {e}", sub.name);
                process::exit(1);
            }
        }
        handles.push((sub.name.clone(), id));
    }

    let find = |name: &str| {
        handles
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, id)| *id)
    };
    let (Some(launcher), Some(feeder)) = (find("launcher"), find("feeder")) else {
        error!("rig config must define 'launcher' and 'feeder' subsystems");
        process::exit(1);
    };

    // ── Dispatch ────────────────────────────────────────────────────
    let shoot = sched.schedule(shoot_routine(&machine, launcher, feeder));
    info!("scheduled shoot routine as {shoot}");

    // Queued second routine, cancelled mid-run the way an operator mode
    // change would.
    let mut eject = None;
    let cancel_at = run_ticks / 2;

    // ── Tick loop ───────────────────────────────────────────────────
    for _ in 0..run_ticks {
        sched.run();

        if !args.no_sleep {
            std::thread::sleep(period);
        }

        if !sched.is_running(shoot) && eject.is_none() {
            let id = sched.schedule(eject_routine(&machine, launcher, feeder));
            info!("shoot routine done at tick {}; scheduled eject as {id}", sched.tick());
            eject = Some(id);
        }

        if sched.tick() == cancel_at {
            if let Some(id) = eject.filter(|id| sched.is_running(*id)) {
                info!("cancelling {id} at tick {}", sched.tick());
                sched.cancel(id);
            }
        }

        for fault in sched.take_faults() {
            error!(
                "fault in {} '{}' during {}: {}",
                fault.command, fault.label, fault.phase, fault.message
            );
        }
    }

    // ── Shutdown ────────────────────────────────────────────────────
    for (name, id) in &handles {
        match sched.owner_of(*id) {
            Some(owner) => debug!("{name} owned by {owner} at shutdown"),
            None => debug!("{name} idle at shutdown"),
        }
    }
    info!(
        "done: {} ticks, {} commands still running",
        sched.tick(),
        sched.running_count()
    );
    sched.cancel_all();
}
