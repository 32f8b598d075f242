//! Fluent scheduler construction.

use std::marker::PhantomData;
use std::time::Duration;

use tokio::runtime::Handle;

use crate::config::{InstanceSize, PoolConfig};
use crate::core::{Resolver, Scheduler, SchedulerError};

/// Collects a resolver, configuration overrides and an optional runtime
/// handle, then starts a [`Scheduler`].
pub struct SchedulerBuilder<P, R, E> {
    resolver: E,
    config: PoolConfig,
    handle: Option<Handle>,
    _types: PhantomData<fn(P) -> R>,
}

impl<P, R, E> SchedulerBuilder<P, R, E>
where
    P: Send + 'static,
    R: Send + 'static,
    E: Resolver<P, R>,
{
    /// Start from default configuration.
    pub fn new(resolver: E) -> Self {
        Self {
            resolver,
            config: PoolConfig::default(),
            handle: None,
            _types: PhantomData,
        }
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    /// Per-task deadline.
    #[must_use]
    pub fn task_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_task_timeout(timeout);
        self
    }

    /// Upper bound on the unit count.
    #[must_use]
    pub fn max_capacity(mut self, max: usize) -> Self {
        self.config = self.config.with_max_capacity(max);
        self
    }

    /// Pin the initial unit count.
    #[must_use]
    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.config = self.config.with_initial_capacity(capacity);
        self
    }

    /// Size the pool from a declared deployment size.
    #[must_use]
    pub fn instance_size(mut self, size: InstanceSize) -> Self {
        self.config = self.config.with_instance_size(size);
        self
    }

    /// Run the dispatch loop on `handle` instead of the current runtime.
    #[must_use]
    pub fn runtime_handle(mut self, handle: Handle) -> Self {
        self.handle = Some(handle);
        self
    }

    /// Start the scheduler.
    ///
    /// # Errors
    ///
    /// See [`Scheduler::new`].
    pub fn build(self) -> Result<Scheduler<P, R>, SchedulerError> {
        match self.handle {
            Some(handle) => Scheduler::with_handle(self.config, self.resolver, &handle),
            None => Scheduler::new(self.config, self.resolver),
        }
    }
}
