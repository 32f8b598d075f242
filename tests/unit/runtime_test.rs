//! Tests for the API-facing models

use async_trait::async_trait;
use metadata_offload::config::PoolConfig;
use metadata_offload::core::{AppResult, Priority, Resolver, Scheduler, TaskContext, TaskKind};
use metadata_offload::runtime::{health_report, submit_request, SubmissionRequest};

#[derive(Clone)]
struct Doubler;

#[async_trait]
impl Resolver<u64, u64> for Doubler {
    async fn resolve(&self, payload: u64, _ctx: TaskContext) -> AppResult<u64> {
        Ok(payload * 2)
    }
}

#[test]
fn test_submission_request_defaults_priority() {
    let req: SubmissionRequest<u64> =
        serde_json::from_str(r#"{"kind": "extract-metadata", "payload": 4}"#).unwrap();
    assert_eq!(req.kind, TaskKind::ExtractMetadata);
    assert_eq!(req.priority, Priority::Normal);
    assert_eq!(req.payload, 4);
}

#[tokio::test]
async fn test_submit_request_runs_on_scheduler() {
    let scheduler: Scheduler<u64, u64> =
        Scheduler::new(PoolConfig::new().with_initial_capacity(1), Doubler).unwrap();

    let req: SubmissionRequest<u64> =
        serde_json::from_str(r#"{"kind": "resolve-song", "priority": "high", "payload": 21}"#).unwrap();
    assert_eq!(submit_request(&scheduler, req).await, Ok(42));

    let report = health_report(&scheduler).await;
    assert!(report.ok);
    assert!(report.accepting);
    assert_eq!(report.stats.tasks_processed, 1);
    assert_eq!(report.stats.total_units, 1);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["stats"]["total_units"], 1);

    scheduler.shutdown().await;
    let report = health_report(&scheduler).await;
    assert!(!report.ok);
    assert!(!report.accepting);
}
