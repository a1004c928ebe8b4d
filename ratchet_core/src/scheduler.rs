//! Scheduler: admission, arbitration, and the per-tick drive.
//!
//! The scheduler owns every scheduled command and the ownership registry
//! mapping each subsystem to the command currently owning it. The registry
//! is the single source of truth for resource ownership; it is mutated
//! only inside `schedule`/`run`/`cancel`, never concurrently.
//!
//! ## Admission
//!
//! `schedule` resolves conflicts in two passes: first every conflicting
//! owner is checked for interruptibility — if any owner refuses, the whole
//! admission is refused with zero side effects. Otherwise every conflicting
//! owner is ended (`interrupted = true`) and its subsystems released before
//! the new command initializes and claims its requirements, all within the
//! same call.
//!
//! ## The tick
//!
//! `run` advances every running command in admission order: `execute`,
//! then `is_finished`; natural finishers are ended and their subsystems
//! released. Afterwards, default commands are installed on subsystems
//! whose requirements are all idle. Default commands carry the lowest
//! implicit priority: they never preempt anything and are always
//! preemptible themselves.
//!
//! ## Fault containment
//!
//! Every user-code hook runs under `catch_unwind`. A panicking command is
//! force-ended, its subsystems released, and a [`CommandFault`] recorded;
//! the remainder of the tick is unaffected.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, error};

use crate::command::{Command, Lifecycle};
use crate::error::{CommandFault, FaultPhase, SchedulerError, panic_message};
use crate::subsystem::SubsystemId;

/// Opaque handle for a scheduled command.
///
/// Returned by [`Scheduler::schedule`]; used to poll, cancel, or retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CommandId(u64);

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "command#{}", self.0)
    }
}

/// One registered subsystem: a name for log output plus the optional
/// default command installed on it.
struct SubsystemSlot {
    name: String,
    default: Option<CommandId>,
}

/// A command tracked by the scheduler. Commands installed as defaults are
/// retained across runs and re-initialized on each installation; everything
/// else is dropped once Ended.
struct Entry {
    command: Command,
    default_for: Option<SubsystemId>,
}

/// The cooperative command scheduler.
///
/// Construct one at process start and drive it from a fixed-period tick
/// source. There is no implicit global instance.
#[derive(Default)]
pub struct Scheduler {
    subsystems: Vec<SubsystemSlot>,
    /// Subsystem → owning command. Absent means idle.
    ownership: BTreeMap<SubsystemId, CommandId>,
    commands: BTreeMap<CommandId, Entry>,
    /// Running commands in admission order; drives tick iteration.
    run_queue: Vec<CommandId>,
    next_id: u64,
    tick: u64,
    faults: Vec<CommandFault>,
}

impl Scheduler {
    /// Create an empty scheduler at tick zero.
    pub fn new() -> Self {
        Self::default()
    }

    // ── Registration ──

    /// Register a subsystem and obtain its handle.
    pub fn register_subsystem(&mut self, name: &str) -> SubsystemId {
        let id = SubsystemId(self.subsystems.len() as u32);
        self.subsystems.push(SubsystemSlot {
            name: name.to_owned(),
            default: None,
        });
        debug!("registered {id} '{name}'");
        id
    }

    /// Name a subsystem was registered with.
    pub fn subsystem_name(&self, subsystem: SubsystemId) -> Option<&str> {
        self.subsystems
            .get(subsystem.0 as usize)
            .map(|slot| slot.name.as_str())
    }

    /// Install `command` as the default for `subsystem`, replacing (and
    /// cancelling) any previous default.
    ///
    /// The command must list `subsystem` among its requirements. It is
    /// retained by the scheduler and scheduled automatically whenever all
    /// of its requirements are idle, starting with the next `run`.
    pub fn set_default_command(
        &mut self,
        subsystem: SubsystemId,
        command: Command,
    ) -> Result<CommandId, SchedulerError> {
        if subsystem.0 as usize >= self.subsystems.len() {
            return Err(SchedulerError::UnknownSubsystem(subsystem));
        }
        if !command.requirements().contains(&subsystem) {
            return Err(SchedulerError::DefaultMissingRequirement {
                subsystem,
                label: command.label().to_owned(),
            });
        }

        if let Some(old) = self.subsystems[subsystem.0 as usize].default.take() {
            self.cancel(old);
            self.commands.remove(&old);
        }

        let id = self.alloc_id();
        debug!(
            "default for {subsystem} '{}': {id} '{}'",
            self.subsystems[subsystem.0 as usize].name,
            command.label()
        );
        self.commands.insert(
            id,
            Entry {
                command,
                default_for: Some(subsystem),
            },
        );
        self.subsystems[subsystem.0 as usize].default = Some(id);
        Ok(id)
    }

    // ── Scheduling ──

    /// Submit a command for admission.
    ///
    /// Always returns a handle. Admission may be refused when a required
    /// subsystem is owned by a non-interruptible command — the command
    /// then stays Pending (poll with [`Scheduler::is_running`], retry
    /// with [`Scheduler::reschedule`], or discard with
    /// [`Scheduler::cancel`]). A refusal is not an error.
    pub fn schedule(&mut self, command: Command) -> CommandId {
        let id = self.alloc_id();
        debug!("scheduling {id} '{}'", command.label());
        self.commands.insert(
            id,
            Entry {
                command,
                default_for: None,
            },
        );
        self.try_admit(id);
        id
    }

    /// Retry admission for a previously refused command.
    ///
    /// A no-op when the command is already Running. Returns whether the
    /// command is Running after the call.
    pub fn reschedule(&mut self, id: CommandId) -> bool {
        self.try_admit(id)
    }

    /// One scheduler tick.
    ///
    /// Advances every running command in admission order, ends natural
    /// finishers and releases their subsystems, then installs default
    /// commands on idle subsystems. Never blocks; a command that needs to
    /// wait does so by reporting `is_finished() == false` across ticks.
    pub fn run(&mut self) {
        self.tick += 1;
        let tick = self.tick;

        for id in self.run_queue.clone() {
            if self.lifecycle(id) != Some(Lifecycle::Running) {
                continue;
            }

            if let Err(payload) = self.guarded(id, |cmd| cmd.execute(tick)) {
                self.fail(id, FaultPhase::Execute, payload);
                continue;
            }

            let finished = match self.guarded(id, |cmd| cmd.is_finished(tick)) {
                Ok(finished) => finished,
                Err(payload) => {
                    self.fail(id, FaultPhase::IsFinished, payload);
                    continue;
                }
            };

            if finished {
                if let Err(payload) = self.guarded(id, |cmd| cmd.end(false)) {
                    self.record_fault(id, FaultPhase::End, payload);
                }
                debug!("{id} finished at tick {tick}");
                self.release(id);
            }
        }

        self.install_defaults();
    }

    /// Force-end a command (`interrupted = true`) and release its
    /// subsystems, regardless of `is_finished`.
    ///
    /// Cancelling a Pending (never-admitted) command discards it without
    /// side effects; cancelling an unknown or already-Ended handle is a
    /// no-op.
    pub fn cancel(&mut self, id: CommandId) {
        let Some(entry) = self.commands.get(&id) else {
            return;
        };
        match entry.command.lifecycle() {
            Lifecycle::Running => {
                debug!("cancelling {id} '{}'", entry.command.label());
                self.interrupt(id);
            }
            Lifecycle::Pending | Lifecycle::Ended => {
                if entry.default_for.is_none() {
                    self.commands.remove(&id);
                }
            }
        }
    }

    /// Cancel every running command.
    pub fn cancel_all(&mut self) {
        for id in self.run_queue.clone() {
            self.cancel(id);
        }
    }

    // ── Observation ──

    /// Whether the command is currently Running.
    pub fn is_running(&self, id: CommandId) -> bool {
        self.lifecycle(id) == Some(Lifecycle::Running)
    }

    /// Lifecycle state of a tracked command. `None` once a finished
    /// command has been dropped (defaults are retained).
    pub fn lifecycle(&self, id: CommandId) -> Option<Lifecycle> {
        self.commands.get(&id).map(|entry| entry.command.lifecycle())
    }

    /// The command currently owning `subsystem`, if any.
    pub fn owner_of(&self, subsystem: SubsystemId) -> Option<CommandId> {
        self.ownership.get(&subsystem).copied()
    }

    /// Ticks elapsed since construction.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Number of currently running commands.
    pub fn running_count(&self) -> usize {
        self.run_queue.len()
    }

    /// Drain the faults recorded since the last call.
    pub fn take_faults(&mut self) -> Vec<CommandFault> {
        std::mem::take(&mut self.faults)
    }

    // ── Internals ──

    fn alloc_id(&mut self) -> CommandId {
        self.next_id += 1;
        CommandId(self.next_id)
    }

    /// Resolve conflicts and admit `id`. Returns whether the command is
    /// Running afterwards.
    fn try_admit(&mut self, id: CommandId) -> bool {
        let Some(entry) = self.commands.get(&id) else {
            return false;
        };
        if entry.command.lifecycle() == Lifecycle::Running {
            return true;
        }
        let reqs = entry.command.requirements().to_vec();

        // Pass 1: every conflicting owner must be interruptible, or the
        // whole admission is refused with zero side effects. Defaults are
        // always presumed interruptible.
        let mut conflicts: Vec<CommandId> = reqs
            .iter()
            .filter_map(|req| self.ownership.get(req).copied())
            .filter(|owner| *owner != id)
            .collect();
        conflicts.sort_unstable();
        conflicts.dedup();

        for owner in &conflicts {
            if let Some(owner_entry) = self.commands.get(owner) {
                if owner_entry.default_for.is_none() && !owner_entry.command.is_interruptible() {
                    debug!(
                        "admission of {id} refused: {owner} '{}' is not interruptible",
                        owner_entry.command.label()
                    );
                    return false;
                }
            }
        }

        // Pass 2: end every conflicting owner before the new command
        // proceeds. The released subsystems are claimable within this
        // same call.
        for owner in conflicts {
            debug!("{owner} interrupted by {id}");
            self.interrupt(owner);
        }

        for req in &reqs {
            self.ownership.insert(*req, id);
        }
        self.run_queue.push(id);

        let tick = self.tick;
        if let Err(payload) = self.guarded(id, |cmd| cmd.initialize(tick)) {
            self.fail(id, FaultPhase::Initialize, payload);
            return false;
        }
        debug!("{id} admitted at tick {tick}");
        true
    }

    /// End `id` as interrupted and release everything it owns.
    fn interrupt(&mut self, id: CommandId) {
        if let Err(payload) = self.guarded(id, |cmd| cmd.end(true)) {
            self.record_fault(id, FaultPhase::End, payload);
        }
        self.release(id);
    }

    /// Release ownership and stop tracking `id`; defaults are retained
    /// for re-installation.
    fn release(&mut self, id: CommandId) {
        self.ownership.retain(|_, owner| *owner != id);
        self.run_queue.retain(|queued| *queued != id);
        let retained = self
            .commands
            .get(&id)
            .is_some_and(|entry| entry.default_for.is_some());
        if !retained {
            self.commands.remove(&id);
        }
    }

    /// Schedule default commands on subsystems whose default exists, is
    /// not already running, and all of whose requirements are idle. A
    /// default never preempts anything.
    fn install_defaults(&mut self) {
        for index in 0..self.subsystems.len() {
            let Some(default_id) = self.subsystems[index].default else {
                continue;
            };
            let Some(entry) = self.commands.get(&default_id) else {
                continue;
            };
            if entry.command.lifecycle() == Lifecycle::Running {
                continue;
            }
            let all_idle = entry
                .command
                .requirements()
                .iter()
                .all(|req| !self.ownership.contains_key(req));
            if all_idle {
                self.try_admit(default_id);
            }
        }
    }

    /// Run one lifecycle hook of `id` with panic containment.
    fn guarded<T>(
        &mut self,
        id: CommandId,
        hook: impl FnOnce(&mut Command) -> T,
    ) -> Result<T, Box<dyn Any + Send>> {
        let Some(entry) = self.commands.get_mut(&id) else {
            // Unknown ids only reach here through internal call paths;
            // treat as an already-released command.
            return Err(Box::new(()));
        };
        panic::catch_unwind(AssertUnwindSafe(|| hook(&mut entry.command)))
    }

    /// Contain a fault: record it, force-end the offender, release its
    /// subsystems, and carry on with the tick.
    fn fail(&mut self, id: CommandId, phase: FaultPhase, payload: Box<dyn Any + Send>) {
        self.record_fault(id, phase, payload);
        if let Err(end_payload) = self.guarded(id, |cmd| cmd.end(true)) {
            self.record_fault(id, FaultPhase::End, end_payload);
        }
        self.release(id);
    }

    fn record_fault(&mut self, id: CommandId, phase: FaultPhase, payload: Box<dyn Any + Send>) {
        let message = panic_message(payload.as_ref());
        let label = self
            .commands
            .get(&id)
            .map(|entry| entry.command.label().to_owned())
            .unwrap_or_default();
        error!("contained panic in {phase} of {id} '{label}': {message}");
        self.faults.push(CommandFault {
            command: id,
            label,
            phase,
            message,
        });
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;

    #[test]
    fn register_issues_sequential_ids() {
        let mut sched = Scheduler::new();
        let a = sched.register_subsystem("launcher");
        let b = sched.register_subsystem("feeder");
        assert_ne!(a, b);
        assert_eq!(sched.subsystem_name(a), Some("launcher"));
        assert_eq!(sched.subsystem_name(b), Some("feeder"));
        assert_eq!(sched.owner_of(a), None);
    }

    #[test]
    fn default_must_require_its_subsystem() {
        let mut sched = Scheduler::new();
        let launcher = sched.register_subsystem("launcher");
        let err = sched
            .set_default_command(launcher, Command::wait(1))
            .unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::DefaultMissingRequirement { subsystem, .. } if subsystem == launcher
        ));
    }

    #[test]
    fn default_on_unknown_subsystem_is_rejected() {
        let mut sched = Scheduler::new();
        let other = Scheduler::new().register_subsystem("phantom");
        // Handle from a different scheduler instance, out of range here.
        let err = sched.set_default_command(other, Command::wait(1)).unwrap_err();
        assert_eq!(err, SchedulerError::UnknownSubsystem(other));
    }

    #[test]
    fn tick_counter_advances_per_run() {
        let mut sched = Scheduler::new();
        assert_eq!(sched.tick(), 0);
        sched.run();
        sched.run();
        assert_eq!(sched.tick(), 2);
    }

    #[test]
    fn cancel_unknown_is_a_noop() {
        let mut sched = Scheduler::new();
        let id = sched.schedule(Command::instant(|| {}));
        sched.run();
        // Finished and dropped; a second cancel must not fault.
        sched.cancel(id);
        assert_eq!(sched.lifecycle(id), None);
    }

    #[test]
    fn finished_instant_is_dropped_after_one_tick() {
        let mut sched = Scheduler::new();
        let id = sched.schedule(Command::instant(|| {}));
        assert!(sched.is_running(id));
        sched.run();
        assert_eq!(sched.lifecycle(id), None);
        assert_eq!(sched.running_count(), 0);
    }
}
