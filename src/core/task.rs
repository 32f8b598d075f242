//! Task descriptions, priorities, and the caller-side pending handle.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::time::Instant;
use uuid::Uuid;

use super::SchedulerError;

/// Unique token generated for every submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What a task asks the resolver to do.
///
/// The scheduler routes every kind through the same execution contract; the
/// kind is forwarded to the resolver untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
    /// Search for a song and resolve its details.
    ResolveSong,
    /// One item of a `process_batch` fan-out.
    BatchItem,
    /// Probe whether a song is still playable.
    VerifyAvailability,
    /// Pull metadata out of a song source.
    ExtractMetadata,
}

/// Queue lane selection for a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Accepted, routed to the normal lane.
    Low,
    /// Default lane.
    #[default]
    Normal,
    /// Drained before any normal work.
    High,
}

impl Priority {
    /// Whether this priority uses the priority lane.
    #[must_use]
    pub const fn is_high(self) -> bool {
        matches!(self, Self::High)
    }
}

/// Identity of a task as seen by the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskContext {
    /// Task identifier.
    pub id: TaskId,
    /// Task kind.
    pub kind: TaskKind,
}

pub(crate) type Outcome<R> = Result<R, SchedulerError>;

/// One-shot completion channel bound to the caller's handle.
#[derive(Debug)]
pub(crate) struct Continuation<R>(oneshot::Sender<Outcome<R>>);

impl<R> Continuation<R> {
    /// Settle the caller. A dropped handle means nobody is waiting any more.
    pub(crate) fn settle(self, task_id: TaskId, outcome: Outcome<R>) {
        if self.0.send(outcome).is_err() {
            tracing::debug!(task_id = %task_id, "caller dropped its handle before settlement");
        }
    }
}

/// A submitted unit of work waiting in a queue.
#[derive(Debug)]
pub(crate) struct Task<P, R> {
    pub id: TaskId,
    pub kind: TaskKind,
    pub priority: Priority,
    pub payload: P,
    pub submitted_at: Instant,
    pub continuation: Continuation<R>,
}

impl<P, R> Task<P, R> {
    /// Build a task and the handle its caller will await.
    pub(crate) fn new(kind: TaskKind, payload: P, priority: Priority) -> (Self, TaskHandle<R>) {
        let (tx, rx) = oneshot::channel();
        let id = TaskId::generate();
        let task = Self {
            id,
            kind,
            priority,
            payload,
            submitted_at: Instant::now(),
            continuation: Continuation(tx),
        };
        (task, TaskHandle { id, rx })
    }

    pub(crate) fn context(&self) -> TaskContext {
        TaskContext {
            id: self.id,
            kind: self.kind,
        }
    }

    /// Settle without ever running, e.g. on shutdown.
    pub(crate) fn reject(self, error: SchedulerError) {
        self.continuation.settle(self.id, Err(error));
    }
}

/// Pending result of a submission.
///
/// Resolves with the resolver's value or a [`SchedulerError`]. If the
/// scheduler goes away before settling, the handle resolves with
/// [`SchedulerError::PoolShutdown`]. Dropping the handle does not cancel the
/// task; its result is discarded.
#[derive(Debug)]
#[must_use = "a task handle does nothing unless awaited"]
pub struct TaskHandle<R> {
    id: TaskId,
    rx: oneshot::Receiver<Outcome<R>>,
}

impl<R> TaskHandle<R> {
    /// Identifier of the underlying task.
    pub const fn id(&self) -> TaskId {
        self.id
    }
}

impl<R> Future for TaskHandle<R> {
    type Output = Outcome<R>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(SchedulerError::PoolShutdown)))
    }
}
