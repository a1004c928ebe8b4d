//! # Ratchet Core
//!
//! Cooperative command-scheduling engine for cyclic (fixed-tick) control of
//! a machine with multiple independently-actuated subsystems. Each subsystem
//! is a mutually-exclusive resource; commands are composable units of
//! behavior that claim subsystems, run across many scheduler ticks, and
//! terminate on a condition.
//!
//! ## Architecture
//!
//! 1. **Subsystem** — an exclusive-access resource handle with an optional
//!    default command.
//! 2. **Command** — the behavioral unit: a small lifecycle state machine
//!    (Pending → Running → Ended) with a declared requirement set.
//! 3. **Composites** — Sequential, Parallel, Race, Wait, Instant; each
//!    composite is itself a command.
//! 4. **Scheduler** — owns the set of running commands, arbitrates
//!    subsystem ownership, and drives the per-tick lifecycle.
//!
//! ## Execution model
//!
//! Single-threaded and cooperative. An external periodic driver calls
//! [`Scheduler::run`] once per fixed tick; commands interleave within the
//! tick callback in admission order and never preempt each other mid-tick.
//! All time is measured in ticks, so behavior is deterministic given a
//! tick count. User code that panics inside a command is contained: the
//! offending command is force-ended, its subsystems released, and a
//! [`CommandFault`] recorded, while the rest of the tick proceeds.

pub mod command;
pub mod error;
pub mod scheduler;
pub mod subsystem;

pub use command::{Action, Command, Lifecycle};
pub use error::{CommandFault, FaultPhase, SchedulerError};
pub use scheduler::{CommandId, Scheduler};
pub use subsystem::SubsystemId;
