//! Command lifecycle and composition.
//!
//! A [`Command`] is a small state machine: Pending → Running → Ended.
//! Pending → Running happens on admission by the scheduler and fires
//! `initialize` exactly once. While Running, each tick fires `execute` and
//! then evaluates `is_finished`. Running → Ended fires `end` exactly once,
//! either on natural completion (`interrupted = false`) or when the
//! scheduler revokes the command (`interrupted = true`).
//!
//! Composite commands (Sequential, Parallel, Race) hold owned child
//! commands; their requirement set is the union of their children's sets,
//! and their stepping delegates to the active child(ren) so that every
//! child receives a full initialize → execute* → end cycle of its own.
//!
//! Leaf behavior is supplied through the [`Action`] trait; Instant and
//! Wait cover the trivial one-shot and tick-deadline cases without user
//! code.

use crate::subsystem::{SubsystemId, merge_requirements};

// ─── Lifecycle ──────────────────────────────────────────────────────

/// Lifecycle state of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    /// Constructed, not yet admitted by the scheduler.
    #[default]
    Pending,
    /// Admitted; receiving per-tick `execute` calls.
    Running,
    /// Terminal: finished naturally or interrupted.
    Ended,
}

// ─── Leaf behavior ──────────────────────────────────────────────────

/// Behavior of a leaf command over a concrete mechanism.
///
/// Implementations typically capture handles to the hardware (or a
/// simulation of it) and perform actuator writes in `execute`. The
/// scheduler invokes these hooks through [`Command`]; a panic inside any
/// of them is contained per command and never halts the tick loop.
pub trait Action {
    /// Called exactly once when the command is admitted.
    fn initialize(&mut self) {}

    /// Called once per tick while the command is running.
    fn execute(&mut self) {}

    /// Evaluated after `execute` each tick; `true` ends the command
    /// naturally.
    fn is_finished(&mut self) -> bool;

    /// Called exactly once on any exit from Running. `interrupted` is
    /// `true` when the scheduler revoked the command (conflict, cancel,
    /// or contained fault) rather than `is_finished` reporting true.
    fn end(&mut self, interrupted: bool) {
        let _ = interrupted;
    }
}

// ─── Command ────────────────────────────────────────────────────────

/// Tagged behavior of a command.
enum Behavior {
    /// Fires its closure during `initialize`; finished on first check.
    Instant(Box<dyn FnMut()>),
    /// Finished once `ticks` scheduler ticks have elapsed since its own
    /// initialize.
    Wait { ticks: u64, started_at: Option<u64> },
    /// Runs children one after another; only the active child is
    /// initialized.
    Sequential { children: Vec<Command>, index: usize },
    /// Runs all children; finishes when every child has finished.
    Parallel { children: Vec<Command> },
    /// Runs all children; finishes when any child finishes, ending the
    /// rest as interrupted.
    Race { children: Vec<Command> },
    /// User-supplied leaf behavior.
    Act(Box<dyn Action>),
}

/// A composable unit of machine behavior with a declared requirement set.
///
/// The requirement set is fixed for the command's lifetime: a command
/// cannot acquire or release individual subsystems while running. Partial
/// resource use is modeled by composing children with smaller requirement
/// sets instead.
pub struct Command {
    label: String,
    requirements: Vec<SubsystemId>,
    interruptible: bool,
    lifecycle: Lifecycle,
    behavior: Behavior,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("label", &self.label)
            .field("requirements", &self.requirements)
            .field("interruptible", &self.interruptible)
            .field("lifecycle", &self.lifecycle)
            .finish_non_exhaustive()
    }
}

impl Command {
    fn new(label: &str, requirements: Vec<SubsystemId>, behavior: Behavior) -> Self {
        Self {
            label: label.to_owned(),
            requirements,
            interruptible: true,
            lifecycle: Lifecycle::Pending,
            behavior,
        }
    }

    // ── Constructors ──

    /// A command that fires `action` exactly once on admission and
    /// occupies exactly one scheduler tick. No requirements.
    ///
    /// The closure is `FnMut` so the command can be re-run when installed
    /// as a default.
    pub fn instant(action: impl FnMut() + 'static) -> Self {
        Self::new("instant", Vec::new(), Behavior::Instant(Box::new(action)))
    }

    /// A command that does nothing and finishes once `ticks` scheduler
    /// ticks have elapsed since its own initialize. No requirements.
    pub fn wait(ticks: u64) -> Self {
        Self::new(
            &format!("wait({ticks})"),
            Vec::new(),
            Behavior::Wait {
                ticks,
                started_at: None,
            },
        )
    }

    /// A leaf command over user-supplied behavior, exclusively owning
    /// every subsystem in `requirements` while running.
    pub fn action(
        action: impl Action + 'static,
        requirements: impl IntoIterator<Item = SubsystemId>,
    ) -> Self {
        let mut reqs = Vec::new();
        merge_requirements(&mut reqs, &requirements.into_iter().collect::<Vec<_>>());
        Self::new("action", reqs, Behavior::Act(Box::new(action)))
    }

    /// Run `children` one after another. Requirement set is the union of
    /// the children's sets.
    pub fn sequential(children: Vec<Command>) -> Self {
        let reqs = union_of(&children);
        Self::new(
            "sequential",
            reqs,
            Behavior::Sequential { children, index: 0 },
        )
    }

    /// Run `children` together; finished when all of them finish.
    ///
    /// Children must not share a requirement: two concurrent children
    /// commanding the same mechanism is a construction error.
    pub fn parallel(children: Vec<Command>) -> Self {
        debug_assert!(
            disjoint(&children),
            "parallel children share a required subsystem"
        );
        let reqs = union_of(&children);
        Self::new("parallel", reqs, Behavior::Parallel { children })
    }

    /// Run `children` together; finished as soon as any one child
    /// finishes. The remaining children are then ended as interrupted.
    ///
    /// Children must not share a requirement, as for [`Command::parallel`].
    pub fn race(children: Vec<Command>) -> Self {
        debug_assert!(
            disjoint(&children),
            "race children share a required subsystem"
        );
        let reqs = union_of(&children);
        Self::new("race", reqs, Behavior::Race { children })
    }

    // ── Decorators ──

    /// Run `self`, then `next`.
    ///
    /// Appends to the existing group when `self` is already a sequential
    /// composite, otherwise wraps both in a new one.
    pub fn then(mut self, next: Command) -> Self {
        let appendable = self.lifecycle == Lifecycle::Pending
            && matches!(self.behavior, Behavior::Sequential { .. });
        if !appendable {
            return Self::sequential(vec![self, next]);
        }
        merge_requirements(&mut self.requirements, &next.requirements);
        if let Behavior::Sequential { children, .. } = &mut self.behavior {
            children.push(next);
        }
        self
    }

    /// Run `self`, then fire `action` once.
    ///
    /// Sugar for `self.then(Command::instant(action))`.
    pub fn and_then(self, action: impl FnMut() + 'static) -> Self {
        self.then(Command::instant(action))
    }

    /// Run `self` and `other` together; finished when both finish.
    pub fn along_with(self, other: Command) -> Self {
        Self::parallel(vec![self, other])
    }

    /// Run `self` and `other` together; finished when either finishes.
    pub fn race_with(self, other: Command) -> Self {
        Self::race(vec![self, other])
    }

    /// Forbid the scheduler from ending this command to satisfy a
    /// conflicting claim. A conflicting `schedule` call is then refused
    /// outright.
    pub fn noninterruptible(mut self) -> Self {
        self.interruptible = false;
        self
    }

    /// Set the label used in log output.
    pub fn named(mut self, label: &str) -> Self {
        self.label = label.to_owned();
        self
    }

    // ── Accessors ──

    /// Label for log output.
    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The subsystems this command exclusively owns while running.
    /// Sorted, deduplicated, immutable.
    #[inline]
    pub fn requirements(&self) -> &[SubsystemId] {
        &self.requirements
    }

    /// Whether a conflicting claim may end this command mid-run.
    #[inline]
    pub fn is_interruptible(&self) -> bool {
        self.interruptible
    }

    /// Current lifecycle state.
    #[inline]
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    // ── Stepping (driven by the scheduler) ──

    /// Transition to Running and fire the initialize side effect.
    ///
    /// Also resets all internal composite/deadline state, so a retained
    /// command (a default) can be re-admitted after it ended.
    pub(crate) fn initialize(&mut self, tick: u64) {
        self.lifecycle = Lifecycle::Running;
        match &mut self.behavior {
            Behavior::Instant(action) => action(),
            Behavior::Wait { started_at, .. } => *started_at = Some(tick),
            Behavior::Sequential { children, index } => {
                *index = 0;
                if let Some(first) = children.first_mut() {
                    first.initialize(tick);
                }
            }
            Behavior::Parallel { children } | Behavior::Race { children } => {
                for child in children.iter_mut() {
                    child.initialize(tick);
                }
            }
            Behavior::Act(action) => action.initialize(),
        }
    }

    /// One tick of work while Running.
    pub(crate) fn execute(&mut self, tick: u64) {
        match &mut self.behavior {
            Behavior::Instant(_) | Behavior::Wait { .. } => {}
            Behavior::Sequential { children, index } => {
                let Some(child) = children.get_mut(*index) else {
                    return;
                };
                child.execute(tick);
                if child.is_finished(tick) {
                    child.end(false);
                    *index += 1;
                    if let Some(next) = children.get_mut(*index) {
                        // The next child is initialized within this tick
                        // but receives its first execute on the next one.
                        next.initialize(tick);
                    }
                }
            }
            Behavior::Parallel { children } | Behavior::Race { children } => {
                for child in children.iter_mut() {
                    if child.lifecycle == Lifecycle::Running {
                        child.execute(tick);
                        if child.is_finished(tick) {
                            child.end(false);
                        }
                    }
                }
            }
            Behavior::Act(action) => action.execute(),
        }
    }

    /// Whether the command has reached its terminal condition.
    pub(crate) fn is_finished(&mut self, tick: u64) -> bool {
        match &mut self.behavior {
            Behavior::Instant(_) => true,
            Behavior::Wait { ticks, started_at } => match started_at {
                Some(start) => tick.saturating_sub(*start) >= *ticks,
                None => false,
            },
            Behavior::Sequential { children, index } => *index >= children.len(),
            Behavior::Parallel { children } => children
                .iter()
                .all(|child| child.lifecycle == Lifecycle::Ended),
            Behavior::Race { children } => children
                .iter()
                .any(|child| child.lifecycle == Lifecycle::Ended),
            Behavior::Act(action) => action.is_finished(),
        }
    }

    /// Transition to Ended, firing the end side effect exactly once.
    ///
    /// Idempotent: calling this on a Pending or already-Ended command is
    /// a no-op. Any child still Running when a composite ends is cut
    /// short and therefore ends as interrupted, regardless of how the
    /// composite itself ended.
    pub(crate) fn end(&mut self, interrupted: bool) {
        if self.lifecycle != Lifecycle::Running {
            return;
        }
        self.lifecycle = Lifecycle::Ended;
        match &mut self.behavior {
            Behavior::Instant(_) | Behavior::Wait { .. } => {}
            Behavior::Sequential { children, .. }
            | Behavior::Parallel { children }
            | Behavior::Race { children } => {
                for child in children.iter_mut() {
                    if child.lifecycle == Lifecycle::Running {
                        child.end(true);
                    }
                }
            }
            Behavior::Act(action) => action.end(interrupted),
        }
    }
}

/// Union of the children's requirement sets.
fn union_of(children: &[Command]) -> Vec<SubsystemId> {
    let mut reqs = Vec::new();
    for child in children {
        merge_requirements(&mut reqs, &child.requirements);
    }
    reqs
}

/// True when no two children share a required subsystem.
fn disjoint(children: &[Command]) -> bool {
    let total: usize = children.iter().map(|c| c.requirements.len()).sum();
    union_of(children).len() == total
}

// ─── Tests ──────────────────────────────────────────────────────────
