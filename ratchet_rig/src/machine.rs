//! Simulated machine: a launcher flywheel, a piece-feeding conveyor, and
//! a chassis.
//!
//! Stands in for real hardware behind the scheduler's leaf actions. The
//! models are deliberately crude — first-order spin-up, linear piece
//! travel — but finish on modeled sensor state rather than fixed tick
//! counts, the way the real mechanisms do.

use std::cell::RefCell;
use std::rc::Rc;

use ratchet_core::{Action, Command, SubsystemId};

/// Mutable state of the whole simulated machine, shared by every action
/// through `Rc<RefCell<..>>` (the rig is single-threaded, like the
/// scheduler itself).
#[derive(Debug, Default)]
pub struct SimMachine {
    /// Flywheel speed [rev/s].
    pub flywheel_velocity: f64,
    /// Flywheel setpoint [rev/s]; zero means coasting down.
    pub flywheel_setpoint: f64,
    /// Conveyor motor engaged.
    pub conveyor_running: bool,
    /// Conveyor direction reversed (ejecting).
    pub conveyor_reversed: bool,
    /// Piece position along the feed path, 0.0 (feeder) → 1.0 (launcher).
    pub piece_travel: f64,
    /// A piece is present on the conveyor.
    pub piece_loaded: bool,
    /// Chassis drive command, −1.0 … 1.0.
    pub chassis_command: f64,
}

/// Shared handle to the simulated machine.
pub type Machine = Rc<RefCell<SimMachine>>;

/// A freshly powered-on machine with one piece loaded.
pub fn machine_with_piece() -> Machine {
    Rc::new(RefCell::new(SimMachine {
        piece_loaded: true,
        ..SimMachine::default()
    }))
}

// ─── Leaf actions ───────────────────────────────────────────────────

/// Spin the flywheel up to a target speed; finished once the wheel is
/// within 5% of it. Interruption drops the setpoint so the wheel coasts.
pub struct SpinUp {
    machine: Machine,
    target: f64,
}

impl SpinUp {
    pub fn new(machine: &Machine, target: f64) -> Self {
        Self {
            machine: Rc::clone(machine),
            target,
        }
    }
}

impl Action for SpinUp {
    fn initialize(&mut self) {
        self.machine.borrow_mut().flywheel_setpoint = self.target;
    }
    fn execute(&mut self) {
        let mut m = self.machine.borrow_mut();
        // First-order response toward the setpoint.
        m.flywheel_velocity += (m.flywheel_setpoint - m.flywheel_velocity) * 0.25;
    }
    fn is_finished(&mut self) -> bool {
        self.machine.borrow().flywheel_velocity >= self.target * 0.95
    }
    fn end(&mut self, interrupted: bool) {
        if interrupted {
            self.machine.borrow_mut().flywheel_setpoint = 0.0;
        }
    }
}

/// Run the conveyor forward until the piece reaches the launcher sensor.
pub struct Transport {
    machine: Machine,
}

impl Transport {
    pub fn new(machine: &Machine) -> Self {
        Self {
            machine: Rc::clone(machine),
        }
    }
}

impl Action for Transport {
    fn initialize(&mut self) {
        let mut m = self.machine.borrow_mut();
        m.conveyor_running = true;
        m.conveyor_reversed = false;
    }
    fn execute(&mut self) {
        let mut m = self.machine.borrow_mut();
        if m.piece_loaded {
            m.piece_travel = (m.piece_travel + 0.2).min(1.0);
        }
    }
    fn is_finished(&mut self) -> bool {
        let m = self.machine.borrow();
        !m.piece_loaded || m.piece_travel >= 1.0
    }
    fn end(&mut self, _interrupted: bool) {
        self.machine.borrow_mut().conveyor_running = false;
    }
}

/// Chassis default: hold the drive at zero while nothing else owns it.
pub struct IdleHold {
    machine: Machine,
}

impl IdleHold {
    pub fn new(machine: &Machine) -> Self {
        Self {
            machine: Rc::clone(machine),
        }
    }
}

impl Action for IdleHold {
    fn execute(&mut self) {
        self.machine.borrow_mut().chassis_command = 0.0;
    }
    fn is_finished(&mut self) -> bool {
        false
    }
}

// ─── Routines ───────────────────────────────────────────────────────

/// Launch the loaded piece: spin the flywheel up, feed the piece through
/// (with a tick deadline in case the sensor never trips), then stop
/// everything.
pub fn shoot_routine(machine: &Machine, launcher: SubsystemId, feeder: SubsystemId) -> Command {
    let (m1, m2) = (Rc::clone(machine), Rc::clone(machine));
    Command::sequential(vec![
        Command::action(SpinUp::new(machine, 80.0), [launcher]).named("spin-up"),
        Command::action(Transport::new(machine), [feeder])
            .named("transport")
            .race_with(Command::wait(100)),
        Command::instant(move || {
            let mut m = m1.borrow_mut();
            m.piece_loaded = false;
            m.piece_travel = 0.0;
        }),
        Command::instant(move || m2.borrow_mut().flywheel_setpoint = 0.0),
    ])
    .named("shoot")
}

/// Eject a jammed piece backwards: reverse the conveyor, give it time,
/// then stop everything. Mirrors the hand-built eject sequence the
/// machine's operators use.
pub fn eject_routine(machine: &Machine, launcher: SubsystemId, feeder: SubsystemId) -> Command {
    let (m1, m2) = (Rc::clone(machine), Rc::clone(machine));
    Command::sequential(vec![
        Command::action(SpinUp::new(machine, 10.0), [launcher]).named("spin-down"),
        Command::instant(move || {
            let mut m = m1.borrow_mut();
            m.conveyor_running = true;
            m.conveyor_reversed = true;
        }),
        Command::wait(50),
        Command::instant(move || {
            let mut m = m2.borrow_mut();
            m.conveyor_running = false;
            m.conveyor_reversed = false;
            m.flywheel_setpoint = 0.0;
            m.piece_loaded = false;
            m.piece_travel = 0.0;
        }),
    ])
    .named("eject")
}

// ─── Tests ──────────────────────────────────────────────────────────
