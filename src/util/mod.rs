//! Shared utilities.

pub mod memory;
pub mod telemetry;

pub use memory::resident_memory_bytes;
pub use telemetry::init_tracing;
