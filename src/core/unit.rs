//! Execution units: dedicated OS threads that run one task at a time.
//!
//! Each unit owns its own single-threaded tokio runtime, blocks on a
//! crossbeam channel for requests, and reports back over the scheduler's
//! event channel. A unit shares nothing with the scheduler except those two
//! channels and a kill signal.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, warn};

use super::protocol::{UnitEvent, UnitId, UnitRequest};
use super::{Resolver, SchedulerError};

/// Where a unit stands in the pool partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnitStatus {
    Idle,
    Busy,
    Terminating,
}

/// Scheduler-side handle to a running unit.
pub(crate) struct ExecutionUnit<P> {
    pub id: UnitId,
    pub status: UnitStatus,
    requests: Sender<UnitRequest<P>>,
    kill: watch::Sender<bool>,
    thread: JoinHandle<()>,
}

impl<P> ExecutionUnit<P> {
    /// Hand a request to the unit.
    pub fn send(&self, request: UnitRequest<P>) -> Result<(), SchedulerError> {
        self.requests
            .send(request)
            .map_err(|_| SchedulerError::DispatchFailure(format!("unit {} channel closed", self.id)))
    }

    /// Whether the unit's thread has already ended.
    pub fn has_exited(&self) -> bool {
        self.thread.is_finished()
    }

    /// Swap in a request sender whose receiver is already gone. The old
    /// sender is returned so the thread keeps waiting on it.
    #[cfg(test)]
    pub fn sever_requests(&mut self) -> Sender<UnitRequest<P>> {
        let (closed, _) = unbounded();
        std::mem::replace(&mut self.requests, closed)
    }

    /// Best-effort stop: abandon any in-progress resolver call and close the
    /// request channel. The thread is detached; it exits at its next await
    /// point or channel receive.
    pub fn terminate(mut self) {
        self.status = UnitStatus::Terminating;
        debug!(unit = %self.id, status = ?self.status, "terminating execution unit");
        self.kill.send_replace(true);
        drop(self.requests);
    }
}

/// Sends [`UnitEvent::Exited`] however the unit thread ends.
struct ExitNotice<R> {
    unit: UnitId,
    events: mpsc::UnboundedSender<UnitEvent<R>>,
}

impl<R> Drop for ExitNotice<R> {
    fn drop(&mut self) {
        let _ = self.events.send(UnitEvent::Exited { unit: self.unit });
    }
}

/// Spawn a unit thread running `resolver`.
pub(crate) fn spawn_unit<P, R, E>(
    id: UnitId,
    resolver: E,
    events: mpsc::UnboundedSender<UnitEvent<R>>,
    stack_size: usize,
) -> Result<ExecutionUnit<P>, SchedulerError>
where
    P: Send + 'static,
    R: Send + 'static,
    E: Resolver<P, R>,
{
    let (requests, inbox) = unbounded::<UnitRequest<P>>();
    let (kill, killed) = watch::channel(false);

    let thread = thread::Builder::new()
        .name(format!("metadata-unit-{id}"))
        .stack_size(stack_size)
        .spawn(move || unit_main(id, &resolver, &inbox, killed, events))
        .map_err(|e| SchedulerError::Runtime(format!("failed to spawn unit {id}: {e}")))?;

    debug!(unit = %id, "execution unit started");
    Ok(ExecutionUnit {
        id,
        status: UnitStatus::Idle,
        requests,
        kill,
        thread,
    })
}

fn unit_main<P, R, E>(
    id: UnitId,
    resolver: &E,
    inbox: &Receiver<UnitRequest<P>>,
    mut killed: watch::Receiver<bool>,
    events: mpsc::UnboundedSender<UnitEvent<R>>,
) where
    P: Send + 'static,
    R: Send + 'static,
    E: Resolver<P, R>,
{
    let _exit = ExitNotice {
        unit: id,
        events: events.clone(),
    };

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(unit = %id, error = %e, "failed to create unit runtime");
            let _ = events.send(UnitEvent::Faulted {
                unit: id,
                error: format!("runtime construction failed: {e}"),
            });
            return;
        }
    };

    // Blocks until work arrives; a closed channel means the pool let go of us.
    while let Ok(request) = inbox.recv() {
        match request {
            UnitRequest::HealthCheck { probe_id } => {
                let _ = events.send(UnitEvent::HealthCheckResponse { unit: id, probe_id });
            }
            UnitRequest::Execute { ctx, payload } => {
                let run = catch_unwind(AssertUnwindSafe(|| {
                    rt.block_on(async {
                        tokio::select! {
                            outcome = resolver.resolve(payload, ctx) => Some(outcome),
                            _ = killed.wait_for(|k| *k) => None,
                        }
                    })
                }));

                match run {
                    Ok(Some(outcome)) => {
                        let outcome = outcome.map_err(|e| format!("{e:#}"));
                        let _ = events.send(UnitEvent::Completed {
                            unit: id,
                            task_id: ctx.id,
                            outcome,
                        });
                    }
                    Ok(None) => {
                        debug!(unit = %id, task_id = %ctx.id, "unit terminated mid-task");
                        return;
                    }
                    Err(panic) => {
                        let message = panic_message(panic.as_ref());
                        warn!(unit = %id, task_id = %ctx.id, error = %message, "resolver panicked");
                        let _ = events.send(UnitEvent::Faulted {
                            unit: id,
                            error: message,
                        });
                        return;
                    }
                }
            }
        }
    }

    debug!(unit = %id, "unit channel closed, exiting");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload.downcast_ref::<&str>().map_or_else(
        || {
            payload
                .downcast_ref::<String>()
                .cloned()
                .unwrap_or_else(|| "unknown panic".to_string())
        },
        |s| (*s).to_string(),
    )
}
