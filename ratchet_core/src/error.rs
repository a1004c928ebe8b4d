//! Error and fault types.
//!
//! Admission refusal is deliberately not represented here: a refused
//! `schedule` call is a silent no-op that the caller observes by polling
//! (see [`Scheduler::is_running`](crate::Scheduler::is_running)). The
//! types below cover registration mistakes and contained user-code
//! panics.

use thiserror::Error;

use crate::scheduler::CommandId;
use crate::subsystem::SubsystemId;

/// Errors raised by scheduler registration calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// The subsystem handle was not issued by this scheduler.
    #[error("unknown {0}")]
    UnknownSubsystem(SubsystemId),

    /// A default command must require the subsystem it is installed on.
    #[error("default command '{label}' does not require {subsystem}")]
    DefaultMissingRequirement {
        /// Target subsystem.
        subsystem: SubsystemId,
        /// Label of the offending command.
        label: String,
    },
}

/// Lifecycle hook in which a contained panic occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPhase {
    Initialize,
    Execute,
    IsFinished,
    End,
}

impl std::fmt::Display for FaultPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Initialize => "initialize",
            Self::Execute => "execute",
            Self::IsFinished => "is_finished",
            Self::End => "end",
        };
        f.write_str(name)
    }
}

/// Record of a user-code panic contained by the scheduler.
///
/// The offending command was force-ended and its subsystems released;
/// the tick loop carried on. Drained via
/// [`Scheduler::take_faults`](crate::Scheduler::take_faults).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFault {
    /// The command that panicked.
    pub command: CommandId,
    /// Label of the command at the time of the fault.
    pub label: String,
    /// Which lifecycle hook panicked.
    pub phase: FaultPhase,
    /// Panic payload rendered as text, when it carried one.
    pub message: String,
}

/// Render a panic payload as text.
///
/// Panics raised via `panic!("..")` carry a `&str` or `String`; anything
/// else is opaque.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduler_error_display() {
        let err = SchedulerError::UnknownSubsystem(SubsystemId(7));
        assert_eq!(err.to_string(), "unknown subsystem#7");

        let err = SchedulerError::DefaultMissingRequirement {
            subsystem: SubsystemId(2),
            label: "idle-hold".to_owned(),
        };
        assert!(err.to_string().contains("idle-hold"));
        assert!(err.to_string().contains("subsystem#2"));
    }

    #[test]
    fn panic_message_extracts_strings() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("kaput"));
        assert_eq!(panic_message(payload.as_ref()), "kaput");

        let payload: Box<dyn std::any::Any + Send> = Box::new(42u32);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }

    #[test]
    fn fault_phase_display() {
        assert_eq!(FaultPhase::Initialize.to_string(), "initialize");
        assert_eq!(FaultPhase::IsFinished.to_string(), "is_finished");
    }
}
