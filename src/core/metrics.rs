//! Running counters and point-in-time pool snapshots.
//!
//! The collector is write-only from the dispatch loop's point of view; it
//! never feeds back into scheduling.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::util::memory::resident_memory_bytes;

/// Snapshot of pool occupancy and task throughput.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Live execution units.
    pub total_units: usize,
    /// Units waiting for work.
    pub idle_units: usize,
    /// Units running a task.
    pub busy_units: usize,
    /// Tasks waiting in either lane.
    pub queued_tasks: usize,
    /// Tasks waiting in the priority lane.
    pub queued_priority: usize,
    /// Tasks waiting in the normal lane.
    pub queued_normal: usize,
    /// Tasks settled after dispatch, whatever the outcome.
    pub tasks_processed: u64,
    /// Mean submit-to-settle latency in milliseconds.
    pub average_latency_ms: f64,
    /// Failed share of processed tasks, `0.0..=1.0`.
    pub error_rate: f64,
    /// Tasks that hit their deadline.
    pub timeouts: u64,
    /// Units replaced after a fault or timeout.
    pub unit_replacements: u64,
    /// Resident memory of the process, where the platform reports it.
    pub memory_bytes: Option<u64>,
}

/// Lock-free counters shared between the dispatch loop and readers.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    tasks_processed: AtomicU64,
    total_latency_us: AtomicU64,
    errors: AtomicU64,
    timeouts: AtomicU64,
    unit_replacements: AtomicU64,
    total_units: AtomicUsize,
    idle_units: AtomicUsize,
    busy_units: AtomicUsize,
    queued_priority: AtomicUsize,
    queued_normal: AtomicUsize,
}

/// Pool occupancy published after every dispatch loop turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Occupancy {
    pub total: usize,
    pub idle: usize,
    pub busy: usize,
    pub queued_priority: usize,
    pub queued_normal: usize,
}

impl MetricsCollector {
    /// Record a settled task.
    pub fn record_task(&self, latency: Duration, success: bool) {
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.tasks_processed.fetch_add(1, Ordering::Relaxed);
        self.total_latency_us.fetch_add(micros, Ordering::Relaxed);
        if !success {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a deadline expiry. Also counts as a failed task.
    pub fn record_timeout(&self, latency: Duration) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
        self.record_task(latency, false);
    }

    /// Record a unit replacement.
    pub fn record_replacement(&self) {
        self.unit_replacements.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn publish(&self, occupancy: Occupancy) {
        self.total_units.store(occupancy.total, Ordering::Relaxed);
        self.idle_units.store(occupancy.idle, Ordering::Relaxed);
        self.busy_units.store(occupancy.busy, Ordering::Relaxed);
        self.queued_priority
            .store(occupancy.queued_priority, Ordering::Relaxed);
        self.queued_normal.store(occupancy.queued_normal, Ordering::Relaxed);
    }

    /// Point-in-time snapshot including process memory.
    #[must_use]
    pub fn snapshot(&self) -> PoolStats {
        let processed = self.tasks_processed.load(Ordering::Relaxed);
        let latency_us = self.total_latency_us.load(Ordering::Relaxed);
        let errors = self.errors.load(Ordering::Relaxed);
        let queued_priority = self.queued_priority.load(Ordering::Relaxed);
        let queued_normal = self.queued_normal.load(Ordering::Relaxed);

        #[allow(clippy::cast_precision_loss)]
        let (average_latency_ms, error_rate) = if processed == 0 {
            (0.0, 0.0)
        } else {
            (
                latency_us as f64 / processed as f64 / 1000.0,
                errors as f64 / processed as f64,
            )
        };

        PoolStats {
            total_units: self.total_units.load(Ordering::Relaxed),
            idle_units: self.idle_units.load(Ordering::Relaxed),
            busy_units: self.busy_units.load(Ordering::Relaxed),
            queued_tasks: queued_priority + queued_normal,
            queued_priority,
            queued_normal,
            tasks_processed: processed,
            average_latency_ms,
            error_rate,
            timeouts: self.timeouts.load(Ordering::Relaxed),
            unit_replacements: self.unit_replacements.load(Ordering::Relaxed),
            memory_bytes: resident_memory_bytes(),
        }
    }
}
