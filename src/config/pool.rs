//! Pool configuration: timeouts, capacity bounds, and sizing hints.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::AppResult;

/// Prefix of every environment variable read by [`PoolConfig::from_env`].
pub const ENV_PREFIX: &str = "METADATA_POOL_";

/// Declared deployment size, used as the initial capacity hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceSize {
    /// One unit.
    Small,
    /// Two units.
    Medium,
    /// Three units.
    Large,
    /// Four units.
    Xlarge,
}

impl InstanceSize {
    /// Unit count this size asks for, before clamping.
    #[must_use]
    pub const fn capacity_hint(self) -> usize {
        match self {
            Self::Small => 1,
            Self::Medium => 2,
            Self::Large => 3,
            Self::Xlarge => 4,
        }
    }
}

impl FromStr for InstanceSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "small" => Ok(Self::Small),
            "medium" => Ok(Self::Medium),
            "large" => Ok(Self::Large),
            "xlarge" => Ok(Self::Xlarge),
            other => Err(format!("unknown instance size `{other}`")),
        }
    }
}

/// Scheduler and unit pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Per-task deadline in milliseconds.
    pub task_timeout_ms: u64,
    /// Upper bound for the pool, at start-up and when scaling.
    pub max_capacity: usize,
    /// Explicit initial unit count; wins over every other hint.
    pub initial_capacity: Option<usize>,
    /// Declared deployment size; used when no explicit capacity is given.
    pub instance_size: Option<InstanceSize>,
    /// How long a health probe waits for an answer, in milliseconds.
    pub health_check_timeout_ms: u64,
    /// How many idle units a health check probes.
    pub health_check_sample: usize,
    /// How long shutdown waits for in-flight tasks, in milliseconds.
    pub drain_timeout_ms: u64,
    /// Optional cap on queued tasks; unbounded when `None`.
    pub max_queue_depth: Option<usize>,
    /// Stack size of each unit thread, in bytes.
    pub thread_stack_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            task_timeout_ms: 30_000,
            max_capacity: 4,
            initial_capacity: None,
            instance_size: None,
            health_check_timeout_ms: 5_000,
            health_check_sample: 2,
            drain_timeout_ms: 10_000,
            max_queue_depth: None,
            thread_stack_size: 2 * 1024 * 1024,
        }
    }
}

impl PoolConfig {
    /// Defaults: 30 s task timeout, capacity capped at 4, auto-detected size.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-task deadline.
    #[must_use]
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout_ms = duration_ms(timeout);
        self
    }

    /// Set the maximum pool capacity.
    #[must_use]
    pub const fn with_max_capacity(mut self, max: usize) -> Self {
        self.max_capacity = max;
        self
    }

    /// Pin the initial unit count.
    #[must_use]
    pub const fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = Some(capacity);
        self
    }

    /// Declare the deployment size.
    #[must_use]
    pub const fn with_instance_size(mut self, size: InstanceSize) -> Self {
        self.instance_size = Some(size);
        self
    }

    /// Set the health probe timeout.
    #[must_use]
    pub fn with_health_check_timeout(mut self, timeout: Duration) -> Self {
        self.health_check_timeout_ms = duration_ms(timeout);
        self
    }

    /// Set how long shutdown waits for in-flight work.
    #[must_use]
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout_ms = duration_ms(timeout);
        self
    }

    /// Cap the number of queued tasks.
    #[must_use]
    pub const fn with_max_queue_depth(mut self, depth: usize) -> Self {
        self.max_queue_depth = Some(depth);
        self
    }

    /// Set the unit thread stack size.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = bytes;
        self
    }

    /// Per-task deadline.
    #[must_use]
    pub const fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }

    /// Health probe timeout.
    #[must_use]
    pub const fn health_check_timeout(&self) -> Duration {
        Duration::from_millis(self.health_check_timeout_ms)
    }

    /// Shutdown drain window.
    #[must_use]
    pub const fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.task_timeout_ms == 0 {
            return Err("task_timeout_ms must be greater than 0".into());
        }
        if self.max_capacity == 0 {
            return Err("max_capacity must be greater than 0".into());
        }
        if self.initial_capacity == Some(0) {
            return Err("initial_capacity must be greater than 0".into());
        }
        if self.health_check_timeout_ms == 0 {
            return Err("health_check_timeout_ms must be greater than 0".into());
        }
        if self.health_check_sample == 0 {
            return Err("health_check_sample must be greater than 0".into());
        }
        if self.max_queue_depth == Some(0) {
            return Err("max_queue_depth must be greater than 0".into());
        }
        if self.thread_stack_size < 64 * 1024 {
            return Err("thread_stack_size must be at least 64 KiB".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate. Missing fields
    /// take their defaults.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read and validate a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read, parsed, or validated.
    pub fn from_json_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading pool config {}", path.display()))?;
        Self::from_json_str(&raw)
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("loading pool config {}", path.display()))
    }

    /// Build configuration from `METADATA_POOL_*` environment variables,
    /// loading a `.env` file first if one exists. Unset variables keep their
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns a message naming the first malformed variable, or a
    /// validation message.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        Self::default().apply_env(|key| std::env::var(key).ok())
    }

    /// Overlay values from `lookup`, keyed by full variable name.
    ///
    /// # Errors
    ///
    /// See [`from_env`](Self::from_env).
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(v) = get("TASK_TIMEOUT_MS") {
            self.task_timeout_ms = parse_var("TASK_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("MAX_CAPACITY") {
            self.max_capacity = parse_var("MAX_CAPACITY", &v)?;
        }
        if let Some(v) = get("INITIAL_CAPACITY") {
            self.initial_capacity = Some(parse_var("INITIAL_CAPACITY", &v)?);
        }
        if let Some(v) = get("INSTANCE_SIZE") {
            self.instance_size = Some(parse_var("INSTANCE_SIZE", &v)?);
        }
        if let Some(v) = get("HEALTH_CHECK_TIMEOUT_MS") {
            self.health_check_timeout_ms = parse_var("HEALTH_CHECK_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("DRAIN_TIMEOUT_MS") {
            self.drain_timeout_ms = parse_var("DRAIN_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("MAX_QUEUE_DEPTH") {
            self.max_queue_depth = Some(parse_var("MAX_QUEUE_DEPTH", &v)?);
        }
        if let Some(v) = get("HEALTH_CHECK_SAMPLE") {
            self.health_check_sample = parse_var("HEALTH_CHECK_SAMPLE", &v)?;
        }
        if let Some(v) = get("THREAD_STACK_SIZE") {
            self.thread_stack_size = parse_var("THREAD_STACK_SIZE", &v)?;
        }

        self.validate()?;
        Ok(self)
    }
}

fn parse_var<T>(name: &str, value: &str) -> Result<T, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| format!("{ENV_PREFIX}{name}: {e}"))
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
