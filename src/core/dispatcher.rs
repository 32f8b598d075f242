//! The single event loop that owns the queues, the unit pool, and every
//! in-flight binding.
//!
//! Callers reach the loop through a command channel and units report back
//! through an event channel, so every dispatch decision is made on one task
//! and a freed unit can never be claimed twice.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use crate::config::PoolConfig;

use super::lifecycle::{Drain, PendingProbe, ScaleReport, ShutdownReport};
use super::metrics::{MetricsCollector, Occupancy};
use super::protocol::{UnitEvent, UnitId, UnitRequest};
use super::queue::DispatchQueues;
use super::task::{Continuation, Task};
use super::unit_pool::UnitPool;
use super::{Resolver, SchedulerError, TaskId};

/// Caller → loop.
pub(crate) enum Command<P, R> {
    Submit(Task<P, R>),
    Scale {
        target: usize,
        reply: oneshot::Sender<Result<ScaleReport, SchedulerError>>,
    },
    HealthCheck {
        reply: oneshot::Sender<bool>,
    },
    Shutdown,
}

/// A task bound to a busy unit.
pub(crate) struct Assignment<R> {
    pub unit: UnitId,
    pub task_id: TaskId,
    pub submitted_at: Instant,
    pub deadline: Instant,
    pub continuation: Continuation<R>,
}

pub(crate) struct Dispatcher<P, R, E> {
    pub(super) config: PoolConfig,
    pub(super) pool: UnitPool<P, R, E>,
    pub(super) queues: DispatchQueues<P, R>,
    /// Keyed by unit slot.
    pub(super) in_flight: HashMap<usize, Assignment<R>>,
    pub(super) probes: Vec<PendingProbe>,
    pub(super) next_probe_id: u64,
    pub(super) drain: Option<Drain>,
    pub(super) metrics: Arc<MetricsCollector>,
    /// Set once, when the drain completes.
    pub(super) report: watch::Sender<Option<ShutdownReport>>,
    pub(super) finished: bool,
}

impl<P, R, E> Dispatcher<P, R, E>
where
    P: Send + 'static,
    R: Send + 'static,
    E: Resolver<P, R>,
{
    pub fn new(
        config: PoolConfig,
        pool: UnitPool<P, R, E>,
        metrics: Arc<MetricsCollector>,
        report: watch::Sender<Option<ShutdownReport>>,
    ) -> Self {
        let queues = DispatchQueues::new(config.max_queue_depth);
        let dispatcher = Self {
            config,
            pool,
            queues,
            in_flight: HashMap::new(),
            probes: Vec::new(),
            next_probe_id: 0,
            drain: None,
            metrics,
            report,
            finished: false,
        };
        dispatcher.publish();
        dispatcher
    }

    /// Run until shutdown completes. Dropping every command sender starts
    /// the shutdown drain.
    pub async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command<P, R>>,
        mut events: mpsc::UnboundedReceiver<UnitEvent<R>>,
    ) {
        let mut callers_gone = false;

        while !self.finished {
            let wake_at = self.next_wakeup();
            tokio::select! {
                command = commands.recv(), if !callers_gone => match command {
                    Some(command) => self.on_command(command),
                    None => {
                        debug!("all scheduler handles dropped, draining");
                        callers_gone = true;
                        self.begin_shutdown();
                    }
                },
                Some(event) = events.recv() => self.on_unit_event(event),
                () = sleep_until_opt(wake_at) => {}
            }
            self.tick(Instant::now());
        }

        debug!("dispatch loop stopped");
    }

    fn tick(&mut self, now: Instant) {
        self.expire_deadlines(now);
        self.expire_probes(now);
        if self.drain.is_some() {
            self.advance_drain(now);
        } else {
            self.pool.refill();
            self.dispatch();
        }
        self.publish();
    }

    fn next_wakeup(&self) -> Option<Instant> {
        self.in_flight
            .values()
            .map(|a| a.deadline)
            .chain(self.probes.iter().map(|p| p.deadline))
            .chain(self.drain.as_ref().map(|d| d.deadline))
            .min()
    }

    fn on_command(&mut self, command: Command<P, R>) {
        match command {
            Command::Submit(task) => self.enqueue(task),
            Command::Scale { target, reply } => {
                let report = self.scale(target);
                self.publish();
                let _ = reply.send(report);
            }
            Command::HealthCheck { reply } => self.start_health_check(reply),
            Command::Shutdown => self.begin_shutdown(),
        }
    }

    fn enqueue(&mut self, task: Task<P, R>) {
        if self.drain.is_some() {
            task.reject(SchedulerError::PoolShutdown);
            return;
        }
        debug!(task_id = %task.id, kind = ?task.kind, priority = ?task.priority, "task queued");
        if let Err((task, error)) = self.queues.push(task) {
            warn!(task_id = %task.id, error = %error, "task rejected");
            task.reject(error);
        }
    }

    /// Bind queued tasks to idle units until one side runs out.
    fn dispatch(&mut self) {
        while !self.queues.is_empty() {
            let Some(unit) = self.pool.take_idle() else {
                break;
            };
            if self.pool.has_exited(unit.slot) {
                // Left out of the idle set; its exit notice triggers replacement.
                debug!(unit = %unit, "skipping exited unit");
                continue;
            }
            let Some(task) = self.queues.pop() else {
                self.pool.restore_idle(unit.slot);
                break;
            };

            let ctx = task.context();
            let Task {
                id,
                kind,
                priority,
                payload,
                submitted_at,
                continuation,
            } = task;

            match self.pool.send(unit.slot, UnitRequest::Execute { ctx, payload }) {
                Ok(()) => {
                    self.pool.mark_busy(unit.slot);
                    debug!(task_id = %id, unit = %unit, ?kind, ?priority, "task dispatched");
                    self.in_flight.insert(
                        unit.slot,
                        Assignment {
                            unit,
                            task_id: id,
                            submitted_at,
                            deadline: Instant::now() + self.config.task_timeout(),
                            continuation,
                        },
                    );
                }
                Err(error) => {
                    // Never marked busy. A closed channel means the thread is
                    // on its way out; its exit notice replaces it.
                    self.pool.restore_idle(unit.slot);
                    warn!(task_id = %id, unit = %unit, error = %error, "dispatch failed");
                    self.metrics.record_task(submitted_at.elapsed(), false);
                    continuation.settle(id, Err(error));
                    break;
                }
            }
        }
    }

    fn on_unit_event(&mut self, event: UnitEvent<R>) {
        let unit = event.unit();
        if !self.pool.is_current(unit) {
            debug!(unit = %unit, "ignoring message from a terminated unit");
            return;
        }
        match event {
            UnitEvent::Completed {
                unit,
                task_id,
                outcome,
            } => self.on_completed(unit, task_id, outcome),
            UnitEvent::HealthCheckResponse { probe_id, .. } => self.on_probe_response(probe_id),
            UnitEvent::Faulted { unit, error } => {
                self.on_unit_lost(unit, SchedulerError::UnitRuntimeError(error));
            }
            UnitEvent::Exited { unit } => {
                self.on_unit_lost(unit, SchedulerError::UnitExitedUnexpectedly { slot: unit.slot });
            }
        }
    }

    fn take_assignment(&mut self, unit: UnitId, task_id: Option<TaskId>) -> Option<Assignment<R>> {
        let bound = self.in_flight.get(&unit.slot)?;
        if bound.unit != unit || task_id.is_some_and(|id| id != bound.task_id) {
            return None;
        }
        self.in_flight.remove(&unit.slot)
    }

    fn on_completed(&mut self, unit: UnitId, task_id: TaskId, outcome: Result<R, String>) {
        let Some(assignment) = self.take_assignment(unit, Some(task_id)) else {
            debug!(unit = %unit, task_id = %task_id, "completion for a task no longer bound");
            return;
        };

        self.pool.release(unit.slot);
        let result = outcome.map_err(SchedulerError::TaskFailed);
        self.metrics
            .record_task(assignment.submitted_at.elapsed(), result.is_ok());
        self.publish();

        match &result {
            Ok(_) => debug!(task_id = %task_id, unit = %unit, "task completed"),
            Err(error) => debug!(task_id = %task_id, unit = %unit, error = %error, "task reported failure"),
        }
        assignment.continuation.settle(task_id, result);
    }

    /// A unit faulted or vanished: fail whatever it held, then replace it.
    fn on_unit_lost(&mut self, unit: UnitId, error: SchedulerError) {
        let assignment = self.take_assignment(unit, None);
        warn!(unit = %unit, error = %error, busy = assignment.is_some(), "execution unit lost");

        self.replace_unit(unit.slot);
        self.publish();

        if let Some(assignment) = assignment {
            self.metrics
                .record_task(assignment.submitted_at.elapsed(), false);
            assignment.continuation.settle(assignment.task_id, Err(error));
        }
    }

    fn expire_deadlines(&mut self, now: Instant) {
        let expired: Vec<usize> = self
            .in_flight
            .iter()
            .filter(|(_, a)| a.deadline <= now)
            .map(|(slot, _)| *slot)
            .collect();

        for slot in expired {
            let Some(assignment) = self.in_flight.remove(&slot) else {
                continue;
            };
            let timeout_ms = self.config.task_timeout_ms;
            warn!(
                task_id = %assignment.task_id,
                unit = %assignment.unit,
                timeout_ms,
                "task deadline expired, replacing unit"
            );

            self.replace_unit(slot);
            self.metrics.record_timeout(assignment.submitted_at.elapsed());
            self.publish();
            assignment
                .continuation
                .settle(assignment.task_id, Err(SchedulerError::TaskTimeout { timeout_ms }));
        }
    }

    /// Swap in a fresh unit, or just drop the slot while shutting down.
    pub(super) fn replace_unit(&mut self, slot: usize) {
        if self.drain.is_some() {
            self.pool.remove(slot);
        } else if self.pool.replace(slot) {
            self.metrics.record_replacement();
        }
    }

    pub(super) fn publish(&self) {
        let (queued_priority, queued_normal) = self.queues.depths();
        self.metrics.publish(Occupancy {
            total: self.pool.live(),
            idle: self.pool.idle_count(),
            busy: self.pool.busy_count(),
            queued_priority,
            queued_normal,
        });
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
