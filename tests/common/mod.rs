//! Scripted resolver shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metadata_offload::config::PoolConfig;
use metadata_offload::core::{AppResult, Resolver, Scheduler, TaskContext};
use parking_lot::Mutex;
use serde_json::{json, Value};

/// What the scripted resolver should do with a task.
#[derive(Debug, Clone)]
pub enum Job {
    /// Return the number.
    Value(u64),
    /// Sleep, then return the number.
    SleepThen(u64, u64),
    /// Report an explicit failure.
    Fail(&'static str),
    /// Panic inside the unit.
    Panic,
    /// Never finish.
    Hang,
    /// Answer an availability probe.
    Available(bool),
}

/// Resolver that follows the [`Job`] it is handed and records the order in
/// which numbered jobs started, plus the unit thread each job ran on.
#[derive(Debug, Clone, Default)]
pub struct Script {
    started: Arc<Mutex<Vec<u64>>>,
    threads: Arc<Mutex<Vec<String>>>,
}

impl Script {
    pub fn started(&self) -> Vec<u64> {
        self.started.lock().clone()
    }

    /// Thread name of every job, in start order.
    pub fn threads(&self) -> Vec<String> {
        self.threads.lock().clone()
    }
}

#[async_trait]
impl Resolver<Job, Value> for Script {
    async fn resolve(&self, job: Job, _ctx: TaskContext) -> AppResult<Value> {
        let thread = std::thread::current().name().unwrap_or_default().to_string();
        self.threads.lock().push(thread);
        match job {
            Job::Value(n) => {
                self.started.lock().push(n);
                Ok(json!(n))
            }
            Job::SleepThen(ms, n) => {
                self.started.lock().push(n);
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(json!(n))
            }
            Job::Fail(reason) => anyhow::bail!("{reason}"),
            Job::Panic => panic!("scripted panic"),
            Job::Hang => {
                std::future::pending::<()>().await;
                Ok(Value::Null)
            }
            Job::Available(available) => Ok(json!({ "available": available })),
        }
    }
}

/// Config with a fixed unit count and task timeout.
pub fn config(capacity: usize, timeout_ms: u64) -> PoolConfig {
    PoolConfig::new()
        .with_initial_capacity(capacity)
        .with_task_timeout(Duration::from_millis(timeout_ms))
        .with_drain_timeout(Duration::from_millis(500))
}

/// Start a scheduler on the current runtime.
pub fn start(capacity: usize, timeout_ms: u64) -> (Scheduler<Job, Value>, Script) {
    let script = Script::default();
    let scheduler = Scheduler::new(config(capacity, timeout_ms), script.clone())
        .expect("scheduler should start");
    (scheduler, script)
}
