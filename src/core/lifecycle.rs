//! Pool lifecycle: start-up sizing, scaling, health probes, and the
//! shutdown drain.

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::PoolConfig;

use super::dispatcher::Dispatcher;
use super::protocol::UnitRequest;
use super::{Resolver, SchedulerError};

/// Initial unit count for `config` on this host.
#[must_use]
pub fn initial_capacity(config: &PoolConfig) -> usize {
    initial_capacity_for(config, num_cpus::get())
}

/// Initial unit count given `host_parallelism` logical CPUs.
///
/// An explicit `initial_capacity` wins, then the declared instance size, then
/// one unit per CPU minus one left for the caller. The result always lies in
/// `1..=max_capacity`.
#[must_use]
pub fn initial_capacity_for(config: &PoolConfig, host_parallelism: usize) -> usize {
    let wanted = config
        .initial_capacity
        .or_else(|| config.instance_size.map(|size| size.capacity_hint()))
        .unwrap_or_else(|| host_parallelism.saturating_sub(1));
    wanted.clamp(1, config.max_capacity.max(1))
}

/// Outcome of a [`scale`](crate::core::Scheduler::scale) call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleReport {
    /// Target capacity before the call.
    pub previous: usize,
    /// Target capacity after the call.
    pub target: usize,
    /// Units spawned immediately.
    pub spawned: usize,
    /// Idle units retired immediately.
    pub retired: usize,
    /// Busy units that will retire once their task settles.
    pub pending_retirements: usize,
}

/// Outcome of a shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownReport {
    /// Every in-flight task settled before the drain window closed.
    pub drained: bool,
    /// In-flight tasks settled with `PoolShutdown` at forced termination.
    pub abandoned: usize,
    /// Queued tasks rejected without running.
    pub rejected: usize,
}

impl ShutdownReport {
    /// Report for a scheduler whose loop is already gone.
    #[must_use]
    pub const fn stopped() -> Self {
        Self {
            drained: true,
            abandoned: 0,
            rejected: 0,
        }
    }
}

pub(crate) struct PendingProbe {
    pub id: u64,
    pub deadline: Instant,
    pub reply: oneshot::Sender<bool>,
}

pub(crate) struct Drain {
    pub deadline: Instant,
    pub rejected: usize,
}

impl<P, R, E> Dispatcher<P, R, E>
where
    P: Send + 'static,
    R: Send + 'static,
    E: Resolver<P, R>,
{
    pub(super) fn scale(&mut self, target: usize) -> Result<ScaleReport, SchedulerError> {
        if self.drain.is_some() {
            return Err(SchedulerError::PoolShutdown);
        }
        let max = self.config.max_capacity;
        if !(1..=max).contains(&target) {
            return Err(SchedulerError::InvalidScale {
                requested: target,
                max,
            });
        }

        let previous = self.pool.target();
        let (spawned, retired) = self.pool.set_target(target);
        let report = ScaleReport {
            previous,
            target,
            spawned,
            retired,
            pending_retirements: self.pool.excess(),
        };
        info!(
            previous,
            target,
            spawned,
            retired,
            pending = report.pending_retirements,
            "unit pool scaled"
        );
        Ok(report)
    }

    pub(super) fn start_health_check(&mut self, reply: oneshot::Sender<bool>) {
        if self.drain.is_some() {
            let _ = reply.send(false);
            return;
        }

        let id = self.next_probe_id;
        self.next_probe_id += 1;

        let mut sent = 0;
        for slot in self.pool.sample_idle(self.config.health_check_sample) {
            match self.pool.send(slot, UnitRequest::HealthCheck { probe_id: id }) {
                Ok(()) => sent += 1,
                Err(e) => debug!(slot, error = %e, "health probe not delivered"),
            }
        }

        if sent == 0 {
            warn!("health check found no idle unit to probe");
            let _ = reply.send(false);
            return;
        }

        debug!(probe_id = id, sent, "health probe sent");
        self.probes.push(PendingProbe {
            id,
            deadline: Instant::now() + self.config.health_check_timeout(),
            reply,
        });
    }

    /// The first answer settles the probe; later ones find nothing to do.
    pub(super) fn on_probe_response(&mut self, probe_id: u64) {
        if let Some(pos) = self.probes.iter().position(|p| p.id == probe_id) {
            let probe = self.probes.swap_remove(pos);
            let _ = probe.reply.send(true);
        }
    }

    pub(super) fn expire_probes(&mut self, now: Instant) {
        let (expired, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.probes)
            .into_iter()
            .partition(|p| p.deadline <= now);
        self.probes = pending;
        for probe in expired {
            warn!(probe_id = probe.id, "health probe timed out");
            let _ = probe.reply.send(false);
        }
    }

    /// Stop accepting work and reject everything still queued. Repeat calls
    /// are no-ops.
    pub(super) fn begin_shutdown(&mut self) {
        if self.drain.is_some() {
            return;
        }

        let mut rejected = 0;
        for task in self.queues.drain() {
            task.reject(SchedulerError::PoolShutdown);
            rejected += 1;
        }
        for probe in self.probes.drain(..) {
            let _ = probe.reply.send(false);
        }

        info!(
            rejected,
            in_flight = self.in_flight.len(),
            drain_timeout_ms = self.config.drain_timeout_ms,
            "scheduler shutting down"
        );
        self.drain = Some(Drain {
            deadline: Instant::now() + self.config.drain_timeout(),
            rejected,
        });
    }

    /// Finish the drain once nothing is in flight or the window has closed.
    pub(super) fn advance_drain(&mut self, now: Instant) {
        let Some(drain) = self.drain.as_ref() else {
            return;
        };
        if !self.in_flight.is_empty() && now < drain.deadline {
            return;
        }
        let rejected = drain.rejected;

        let drained = self.in_flight.is_empty();
        let abandoned = self.in_flight.len();
        for (_, assignment) in self.in_flight.drain() {
            warn!(task_id = %assignment.task_id, unit = %assignment.unit, "task abandoned at shutdown");
            assignment
                .continuation
                .settle(assignment.task_id, Err(SchedulerError::PoolShutdown));
        }

        self.pool.terminate_all();
        let report = ShutdownReport {
            drained,
            abandoned,
            rejected,
        };
        info!(drained, abandoned, rejected, "scheduler stopped");
        self.report.send_replace(Some(report));
        self.finished = true;
    }
}
