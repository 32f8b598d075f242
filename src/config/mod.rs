//! Configuration models for the unit pool and scheduler.

pub mod pool;

pub use pool::{InstanceSize, PoolConfig, ENV_PREFIX};
