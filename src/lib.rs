//! # Metadata Offload
//!
//! A bounded scheduler that moves song-metadata work (lookups, batch
//! resolution, availability probes, metadata extraction) off the caller's
//! async runtime and onto a small pool of dedicated execution units.
//!
//! ## How it works
//!
//! - **Execution units**: each unit is an OS thread with its own
//!   single-threaded tokio runtime. It runs one task at a time by calling the
//!   user's [`Resolver`](core::Resolver).
//! - **Two-lane queue**: high-priority work always dispatches before normal
//!   work; each lane is FIFO. Low priority shares the normal lane.
//! - **Single dispatch loop**: queues, the idle/busy partition, and every
//!   deadline are owned by one task, so a freed unit is never claimed twice.
//! - **Failure isolation**: a task that times out, panics, or loses its unit
//!   fails alone; the unit is replaced and the pool returns to its target
//!   size.
//! - **Lifecycle**: host-aware initial sizing, runtime scaling, health
//!   probes, and a bounded drain on shutdown.
//!
//! ```rust,ignore
//! use async_trait::async_trait;
//! use metadata_offload::config::PoolConfig;
//! use metadata_offload::core::{AppResult, Priority, Resolver, Scheduler, TaskContext};
//!
//! #[derive(Clone)]
//! struct Lookup;
//!
//! #[async_trait]
//! impl Resolver<String, String> for Lookup {
//!     async fn resolve(&self, query: String, _ctx: TaskContext) -> AppResult<String> {
//!         Ok(format!("resolved {query}"))
//!     }
//! }
//!
//! let scheduler = Scheduler::new(PoolConfig::new(), Lookup)?;
//! let title = scheduler.resolve_song("never gonna".into(), Priority::High).await?;
//! let stats = scheduler.stats();
//! scheduler.shutdown().await;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Tasks, execution units, the dispatch loop, and metrics.
pub mod core;
/// Pool configuration.
pub mod config;
/// Fluent construction of a scheduler.
pub mod builders;
/// Serializable request and health models for an outer API layer.
pub mod runtime;
/// Shared utilities.
pub mod util;
