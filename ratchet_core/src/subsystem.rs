//! Subsystem identity.
//!
//! A subsystem is a passive resource token: the scheduler consults it only
//! to identify it uniquely for conflict resolution and to retrieve its
//! default command when idle. Hardware side effects belong to the concrete
//! subsystem implementations behind leaf actions, outside this crate.

use std::fmt;

/// Opaque handle for one exclusive-access subsystem.
///
/// Issued by [`Scheduler::register_subsystem`](crate::Scheduler::register_subsystem);
/// the numeric value is an index into the scheduler's registry and has no
/// meaning outside the scheduler that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubsystemId(pub(crate) u32);

impl SubsystemId {
    /// Raw registry index, for log output and diagnostics only.
    #[inline]
    pub const fn index(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for SubsystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subsystem#{}", self.0)
    }
}

/// Merge `extra` into `reqs`, keeping the set sorted and deduplicated.
///
/// Composite commands derive their requirement set as the union of their
/// children's sets; requirement sets are immutable after construction, so
/// this only runs at build time, never per tick.
pub(crate) fn merge_requirements(reqs: &mut Vec<SubsystemId>, extra: &[SubsystemId]) {
    reqs.extend_from_slice(extra);
    reqs.sort_unstable();
    reqs.dedup();
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_index() {
        assert_eq!(SubsystemId(3).to_string(), "subsystem#3");
    }

    #[test]
    fn merge_sorts_and_dedups() {
        let mut reqs = vec![SubsystemId(2), SubsystemId(0)];
        merge_requirements(&mut reqs, &[SubsystemId(1), SubsystemId(2)]);
        assert_eq!(reqs, vec![SubsystemId(0), SubsystemId(1), SubsystemId(2)]);
    }

    #[test]
    fn merge_into_empty() {
        let mut reqs = Vec::new();
        merge_requirements(&mut reqs, &[SubsystemId(5)]);
        assert_eq!(reqs, vec![SubsystemId(5)]);
    }
}
