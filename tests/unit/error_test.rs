//! Tests for error types

use metadata_offload::core::SchedulerError;

#[test]
fn test_error_display() {
    assert_eq!(
        SchedulerError::TaskTimeout { timeout_ms: 30_000 }.to_string(),
        "task timed out after 30000 ms"
    );
    assert_eq!(
        SchedulerError::TaskFailed("no match".into()).to_string(),
        "task failed: no match"
    );
    assert_eq!(SchedulerError::QueueFull(8).to_string(), "queue full: 8 tasks waiting");
    assert_eq!(SchedulerError::PoolShutdown.to_string(), "scheduler is shut down");
    assert_eq!(
        SchedulerError::InvalidScale { requested: 9, max: 4 }.to_string(),
        "invalid scale target 9: must be between 1 and 4"
    );
    assert_eq!(
        SchedulerError::UnitExitedUnexpectedly { slot: 2 }.to_string(),
        "execution unit 2 exited unexpectedly"
    );
}

#[test]
fn test_error_classification() {
    assert!(SchedulerError::TaskTimeout { timeout_ms: 1 }.is_timeout());
    assert!(!SchedulerError::PoolShutdown.is_timeout());

    assert!(SchedulerError::UnitRuntimeError("boom".into()).is_unit_fault());
    assert!(SchedulerError::UnitExitedUnexpectedly { slot: 0 }.is_unit_fault());
    assert!(SchedulerError::DispatchFailure("closed".into()).is_unit_fault());
    assert!(!SchedulerError::TaskFailed("nope".into()).is_unit_fault());
}

#[test]
fn test_error_converts_into_anyhow() {
    let err: anyhow::Error = SchedulerError::PoolShutdown.into();
    assert_eq!(
        err.downcast_ref::<SchedulerError>(),
        Some(&SchedulerError::PoolShutdown)
    );
}
