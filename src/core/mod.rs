//! Core scheduling: tasks, execution units, the dispatch loop, and metrics.

pub mod error;
pub mod executor;
pub mod lifecycle;
pub mod metrics;
pub mod scheduler;
pub mod task;

mod dispatcher;
mod protocol;
mod queue;
mod unit;
mod unit_pool;

pub use error::{AppResult, SchedulerError};
pub use executor::{Availability, Resolver};
pub use lifecycle::{initial_capacity, initial_capacity_for, ScaleReport, ShutdownReport};
pub use metrics::{MetricsCollector, PoolStats};
pub use scheduler::Scheduler;
pub use task::{Priority, TaskContext, TaskHandle, TaskId, TaskKind};
