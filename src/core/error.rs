//! Error types for scheduler operations.

use thiserror::Error;

/// Errors produced by the scheduler and surfaced through task handles.
///
/// Every variant is local to a single task continuation or a single control
/// call; none of them stops the dispatch loop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// No response arrived within the task deadline; the bound unit was replaced.
    #[error("task timed out after {timeout_ms} ms")]
    TaskTimeout {
        /// Deadline that elapsed, in milliseconds.
        timeout_ms: u64,
    },
    /// The execution unit reported an internal fault while the task was bound.
    #[error("execution unit fault: {0}")]
    UnitRuntimeError(String),
    /// The execution unit's thread ended outside scheduler control.
    #[error("execution unit {slot} exited unexpectedly")]
    UnitExitedUnexpectedly {
        /// Slot of the unit that disappeared.
        slot: usize,
    },
    /// The task could not be handed to a unit.
    #[error("dispatch failed: {0}")]
    DispatchFailure(String),
    /// The resolver completed and reported a failure.
    #[error("task failed: {0}")]
    TaskFailed(String),
    /// The optional queue depth limit was reached.
    #[error("queue full: {0} tasks waiting")]
    QueueFull(usize),
    /// The scheduler no longer accepts or runs work.
    #[error("scheduler is shut down")]
    PoolShutdown,
    /// A scale request outside `[1, max]`.
    #[error("invalid scale target {requested}: must be between 1 and {max}")]
    InvalidScale {
        /// Requested capacity.
        requested: usize,
        /// Configured maximum capacity.
        max: usize,
    },
    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The async runtime or a unit thread could not be started.
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl SchedulerError {
    /// Whether this error is a deadline expiry.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::TaskTimeout { .. })
    }

    /// Whether the failure came from the unit or transport rather than the resolver.
    #[must_use]
    pub const fn is_unit_fault(&self) -> bool {
        matches!(
            self,
            Self::UnitRuntimeError(_) | Self::UnitExitedUnexpectedly { .. } | Self::DispatchFailure(_)
        )
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
