//! Messages exchanged between the dispatch loop and execution units.

use std::fmt;

use super::{TaskContext, TaskId};

/// Slot plus incarnation of an execution unit.
///
/// A replacement keeps its predecessor's slot but gets a fresh incarnation,
/// so late messages from a terminated unit can be told apart and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct UnitId {
    pub slot: usize,
    pub incarnation: u64,
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.slot, self.incarnation)
    }
}

/// Scheduler → unit.
#[derive(Debug)]
pub(crate) enum UnitRequest<P> {
    /// Run one task.
    Execute { ctx: TaskContext, payload: P },
    /// Out-of-band liveness probe.
    HealthCheck { probe_id: u64 },
}

/// Unit → scheduler.
#[derive(Debug)]
pub(crate) enum UnitEvent<R> {
    /// The resolver finished; `Err` is an explicit failure report.
    Completed {
        unit: UnitId,
        task_id: TaskId,
        outcome: Result<R, String>,
    },
    /// Answer to [`UnitRequest::HealthCheck`].
    HealthCheckResponse { unit: UnitId, probe_id: u64 },
    /// The unit hit an internal fault and is going away.
    Faulted { unit: UnitId, error: String },
    /// The unit's thread ended.
    Exited { unit: UnitId },
}

impl<R> UnitEvent<R> {
    pub(crate) const fn unit(&self) -> UnitId {
        match self {
            Self::Completed { unit, .. }
            | Self::HealthCheckResponse { unit, .. }
            | Self::Faulted { unit, .. }
            | Self::Exited { unit } => *unit,
        }
    }
}
