//! API-facing request/response models.

use serde::{Deserialize, Serialize};

use crate::core::{PoolStats, Priority, Scheduler, TaskHandle, TaskKind};

/// Task submission payload, as received from a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionRequest<P> {
    /// What to do.
    pub kind: TaskKind,
    /// Queue lane; normal when omitted.
    #[serde(default)]
    pub priority: Priority,
    /// Opaque payload for the resolver.
    pub payload: P,
}

/// Health response for a monitoring endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    /// At least one probed unit answered.
    pub ok: bool,
    /// New submissions are accepted.
    pub accepting: bool,
    /// Snapshot taken alongside the probe.
    pub stats: PoolStats,
}

/// Submit a decoded request.
pub fn submit_request<P, R>(scheduler: &Scheduler<P, R>, req: SubmissionRequest<P>) -> TaskHandle<R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    scheduler.submit(req.kind, req.payload, req.priority)
}

/// Probe the pool and bundle the result with current stats.
pub async fn health_report<P, R>(scheduler: &Scheduler<P, R>) -> HealthReport
where
    P: Send + 'static,
    R: Send + 'static,
{
    let ok = scheduler.health_check().await;
    HealthReport {
        ok,
        accepting: scheduler.is_accepting(),
        stats: scheduler.stats(),
    }
}
