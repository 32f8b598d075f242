//! Public scheduler handle.
//!
//! A [`Scheduler`] is a thin front for the dispatch loop: every method turns
//! into a command message, so callers never block and never touch pool state
//! directly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info};

use crate::config::PoolConfig;

use super::dispatcher::{Command, Dispatcher};
use super::lifecycle::{initial_capacity, ScaleReport, ShutdownReport};
use super::metrics::{MetricsCollector, PoolStats};
use super::task::Task;
use super::unit_pool::UnitPool;
use super::{Availability, Priority, Resolver, SchedulerError, TaskHandle, TaskKind};

/// Offloads resolver work onto a fixed pool of execution units.
///
/// `P` is the payload handed to the resolver, `R` the value it produces.
pub struct Scheduler<P, R> {
    commands: mpsc::UnboundedSender<Command<P, R>>,
    accepting: AtomicBool,
    metrics: Arc<MetricsCollector>,
    report: watch::Receiver<Option<ShutdownReport>>,
    config: PoolConfig,
    event_loop: Mutex<Option<JoinHandle<()>>>,
}

impl<P, R> Scheduler<P, R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    /// Start a scheduler on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::InvalidConfig`] if `config` does not validate,
    /// [`SchedulerError::Runtime`] outside a tokio runtime or if a unit
    /// thread cannot be spawned.
    pub fn new<E>(config: PoolConfig, resolver: E) -> Result<Self, SchedulerError>
    where
        E: Resolver<P, R>,
    {
        let handle = Handle::try_current()
            .map_err(|e| SchedulerError::Runtime(format!("no tokio runtime: {e}")))?;
        Self::with_handle(config, resolver, &handle)
    }

    /// Start a scheduler whose dispatch loop runs on `handle`.
    ///
    /// # Errors
    ///
    /// See [`new`](Self::new).
    pub fn with_handle<E>(config: PoolConfig, resolver: E, handle: &Handle) -> Result<Self, SchedulerError>
    where
        E: Resolver<P, R>,
    {
        config.validate().map_err(SchedulerError::InvalidConfig)?;

        let capacity = initial_capacity(&config);
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (events, events_rx) = mpsc::unbounded_channel();
        let (report_tx, report) = watch::channel(None);

        let mut pool = UnitPool::new(resolver, events, config.thread_stack_size);
        if let Err(e) = pool.start(capacity) {
            pool.terminate_all();
            return Err(e);
        }

        let metrics = Arc::new(MetricsCollector::default());
        let dispatcher = Dispatcher::new(config.clone(), pool, Arc::clone(&metrics), report_tx);
        let event_loop = handle.spawn(dispatcher.run(commands_rx, events_rx));

        info!(
            capacity,
            max_capacity = config.max_capacity,
            task_timeout_ms = config.task_timeout_ms,
            "scheduler started"
        );

        Ok(Self {
            commands,
            accepting: AtomicBool::new(true),
            metrics,
            report,
            config,
            event_loop: Mutex::new(Some(event_loop)),
        })
    }

    /// Queue `payload` for the resolver and return a handle to its result.
    ///
    /// Never blocks. After shutdown has begun the handle settles at once with
    /// [`SchedulerError::PoolShutdown`].
    pub fn submit(&self, kind: TaskKind, payload: P, priority: Priority) -> TaskHandle<R> {
        let (task, handle) = Task::new(kind, payload, priority);
        if !self.is_accepting() {
            task.reject(SchedulerError::PoolShutdown);
            return handle;
        }
        if let Err(mpsc::error::SendError(Command::Submit(task))) =
            self.commands.send(Command::Submit(task))
        {
            task.reject(SchedulerError::PoolShutdown);
        }
        handle
    }

    /// Resolve a song lookup.
    pub fn resolve_song(&self, payload: P, priority: Priority) -> TaskHandle<R> {
        self.submit(TaskKind::ResolveSong, payload, priority)
    }

    /// Run every item and return the ones that succeeded, in completion
    /// order. Failed items are dropped from the result, never surfaced as an
    /// error.
    pub async fn process_batch<I>(&self, items: I, priority: Priority) -> Vec<R>
    where
        I: IntoIterator<Item = P>,
    {
        let mut pending = JoinSet::new();
        for item in items {
            pending.spawn(self.submit(TaskKind::BatchItem, item, priority));
        }

        let mut results = Vec::with_capacity(pending.len());
        let mut failed = 0usize;
        while let Some(joined) = pending.join_next().await {
            match joined {
                Ok(Ok(value)) => results.push(value),
                Ok(Err(e)) => {
                    failed += 1;
                    debug!(error = %e, "batch item failed");
                }
                Err(e) => {
                    failed += 1;
                    debug!(error = %e, "batch item join failed");
                }
            }
        }
        if failed > 0 {
            debug!(succeeded = results.len(), failed, "batch finished with failures");
        }
        results
    }

    /// High-priority availability probe. Any failure, timeout included,
    /// reads as unavailable.
    pub async fn verify(&self, payload: P) -> bool
    where
        R: Availability,
    {
        match self
            .submit(TaskKind::VerifyAvailability, payload, Priority::High)
            .await
        {
            Ok(value) => value.is_available(),
            Err(e) => {
                debug!(error = %e, "verification failed, reporting unavailable");
                false
            }
        }
    }

    /// Extract metadata at normal priority.
    ///
    /// # Errors
    ///
    /// Whatever settled the task: a resolver failure, timeout, unit fault, or
    /// shutdown.
    pub async fn extract_metadata(&self, payload: P) -> Result<R, SchedulerError> {
        self.submit(TaskKind::ExtractMetadata, payload, Priority::Normal)
            .await
    }

    /// Change the target unit count.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::InvalidScale`] outside `1..=max_capacity`,
    /// [`SchedulerError::PoolShutdown`] once shutdown has begun.
    pub async fn scale(&self, target: usize) -> Result<ScaleReport, SchedulerError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Scale { target, reply })
            .map_err(|_| SchedulerError::PoolShutdown)?;
        rx.await.map_err(|_| SchedulerError::PoolShutdown)?
    }

    /// Probe a sample of idle units; `true` if any answers in time.
    pub async fn health_check(&self) -> bool {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::HealthCheck { reply }).is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Current occupancy and throughput counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.metrics.snapshot()
    }

    /// Stop accepting work, reject queued tasks, wait for in-flight tasks up
    /// to the drain timeout, then terminate every unit.
    ///
    /// Safe to call more than once or concurrently; every call returns the
    /// same report.
    pub async fn shutdown(&self) -> ShutdownReport {
        self.accepting.store(false, Ordering::SeqCst);
        let _ = self.commands.send(Command::Shutdown);

        let mut report = self.report.clone();
        let settled = report
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|r| *r);

        let event_loop = self.event_loop.lock().take();
        if let Some(event_loop) = event_loop {
            if let Err(e) = event_loop.await {
                debug!(error = %e, "dispatch loop ended abnormally");
            }
        }

        settled.unwrap_or_else(ShutdownReport::stopped)
    }

    /// Whether new submissions are still accepted.
    #[must_use]
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst) && !self.commands.is_closed()
    }

    /// Configuration the scheduler was started with.
    #[must_use]
    pub const fn config(&self) -> &PoolConfig {
        &self.config
    }
}

impl<P, R> Drop for Scheduler<P, R> {
    // The drain itself is started by the loop: dropping `commands` right
    // after this closes its command channel.
    fn drop(&mut self) {
        if self.accepting.load(Ordering::SeqCst) {
            debug!("scheduler dropped without shutdown, draining in background");
        }
    }
}
