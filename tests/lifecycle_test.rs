//! Pool lifecycle: scaling, health probes, and shutdown draining.

mod common;

use std::time::{Duration, Instant};

use common::{config, start, Job, Script};
use metadata_offload::builders::SchedulerBuilder;
use metadata_offload::config::{InstanceSize, PoolConfig};
use metadata_offload::core::{Priority, Scheduler, SchedulerError, ShutdownReport, TaskKind};
use serde_json::{json, Value};

#[tokio::test]
async fn test_scale_up_spawns_idle_units() {
    let (scheduler, _) = start(1, 5_000);

    let report = scheduler.scale(3).await.unwrap();
    assert_eq!(report.previous, 1);
    assert_eq!(report.target, 3);
    assert_eq!(report.spawned, 2);
    assert_eq!(report.retired, 0);
    assert_eq!(report.pending_retirements, 0);

    let stats = scheduler.stats();
    assert_eq!((stats.total_units, stats.idle_units), (3, 3));

    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_scale_down_waits_for_busy_units() {
    let (scheduler, _) = start(3, 5_000);

    let a = scheduler.submit(TaskKind::ResolveSong, Job::SleepThen(150, 1), Priority::Normal);
    let b = scheduler.submit(TaskKind::ResolveSong, Job::SleepThen(150, 2), Priority::Normal);
    tokio::time::sleep(Duration::from_millis(40)).await;

    let report = scheduler.scale(1).await.unwrap();
    assert_eq!(report.retired, 1);
    assert_eq!(report.pending_retirements, 1);
    assert_eq!(scheduler.stats().total_units, 2);

    assert_eq!(a.await, Ok(json!(1)));
    assert_eq!(b.await, Ok(json!(2)));

    let stats = scheduler.stats();
    assert_eq!(stats.total_units, 1);
    assert_eq!(stats.idle_units, 1);

    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_scale_rejects_out_of_range_targets() {
    let (scheduler, _) = start(1, 5_000);

    assert_eq!(
        scheduler.scale(0).await,
        Err(SchedulerError::InvalidScale { requested: 0, max: 4 })
    );
    assert_eq!(
        scheduler.scale(5).await,
        Err(SchedulerError::InvalidScale { requested: 5, max: 4 })
    );
    assert_eq!(scheduler.stats().total_units, 1);

    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_health_check_with_idle_units() {
    let (scheduler, _) = start(2, 5_000);
    assert!(scheduler.health_check().await);
    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_health_check_false_when_nothing_idle() {
    let (scheduler, _) = start(1, 5_000);

    let _stuck = scheduler.submit(TaskKind::ResolveSong, Job::Hang, Priority::Normal);
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!scheduler.health_check().await);

    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_clean_drain_lets_in_flight_work_finish() {
    let (scheduler, _) = start(1, 5_000);

    let running = scheduler.submit(TaskKind::ResolveSong, Job::SleepThen(80, 1), Priority::Normal);
    tokio::time::sleep(Duration::from_millis(20)).await;

    let report = scheduler.shutdown().await;
    assert_eq!(
        report,
        ShutdownReport {
            drained: true,
            abandoned: 0,
            rejected: 0,
        }
    );
    assert_eq!(running.await, Ok(json!(1)));
    assert_eq!(scheduler.stats().total_units, 0);
}

#[tokio::test]
async fn test_shutdown_is_bounded_by_drain_timeout() {
    let config = config(1, 30_000).with_drain_timeout(Duration::from_millis(100));
    let scheduler: Scheduler<Job, Value> = Scheduler::new(config, Script::default()).unwrap();

    let stuck = scheduler.submit(TaskKind::ResolveSong, Job::Hang, Priority::Normal);
    tokio::time::sleep(Duration::from_millis(30)).await;
    let queued = scheduler.submit(TaskKind::ResolveSong, Job::Value(1), Priority::High);
    tokio::time::sleep(Duration::from_millis(10)).await;

    let started = Instant::now();
    let report = scheduler.shutdown().await;
    assert!(started.elapsed() < Duration::from_secs(2));

    assert!(!report.drained);
    assert_eq!(report.abandoned, 1);
    assert_eq!(report.rejected, 1);
    assert_eq!(stuck.await, Err(SchedulerError::PoolShutdown));
    assert_eq!(queued.await, Err(SchedulerError::PoolShutdown));
}

#[tokio::test]
async fn test_work_after_shutdown_is_rejected() {
    let (scheduler, _) = start(1, 5_000);

    let first = scheduler.shutdown().await;
    assert!(!scheduler.is_accepting());

    let late = scheduler.resolve_song(Job::Value(1), Priority::High).await;
    assert_eq!(late, Err(SchedulerError::PoolShutdown));
    assert_eq!(scheduler.scale(2).await, Err(SchedulerError::PoolShutdown));
    assert!(!scheduler.health_check().await);
    assert!(!scheduler.verify(Job::Available(true)).await);

    assert_eq!(scheduler.shutdown().await, first);
}

#[tokio::test]
async fn test_concurrent_shutdown_calls_share_report() {
    let (scheduler, _) = start(2, 5_000);
    let _running = scheduler.submit(TaskKind::ResolveSong, Job::SleepThen(50, 1), Priority::Normal);

    let (a, b) = tokio::join!(scheduler.shutdown(), scheduler.shutdown());
    assert_eq!(a, b);
    assert!(a.drained);
}

#[tokio::test]
async fn test_drop_drains_in_background() {
    let (scheduler, _) = start(1, 5_000);

    let running = scheduler.submit(TaskKind::ResolveSong, Job::SleepThen(50, 4), Priority::Normal);
    let queued = scheduler.submit(TaskKind::ResolveSong, Job::Value(5), Priority::Normal);
    drop(scheduler);

    assert_eq!(running.await, Ok(json!(4)));
    assert_eq!(queued.await, Err(SchedulerError::PoolShutdown));
}

#[tokio::test]
async fn test_builder_applies_overrides() {
    let scheduler: Scheduler<Job, Value> = SchedulerBuilder::new(Script::default())
        .instance_size(InstanceSize::Large)
        .task_timeout(Duration::from_millis(250))
        .build()
        .unwrap();

    assert_eq!(scheduler.stats().total_units, 3);
    assert_eq!(scheduler.config().task_timeout_ms, 250);
    assert_eq!(
        scheduler.submit(TaskKind::ResolveSong, Job::Hang, Priority::Normal).await,
        Err(SchedulerError::TaskTimeout { timeout_ms: 250 })
    );

    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_builder_clamps_to_max_capacity() {
    let scheduler: Scheduler<Job, Value> = SchedulerBuilder::new(Script::default())
        .max_capacity(2)
        .initial_capacity(4)
        .build()
        .unwrap();

    assert_eq!(scheduler.stats().total_units, 2);
    assert!(matches!(
        scheduler.scale(3).await,
        Err(SchedulerError::InvalidScale { requested: 3, max: 2 })
    ));

    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let config = PoolConfig::new().with_max_capacity(0);
    let result = Scheduler::<Job, Value>::new(config, Script::default());
    assert!(matches!(result, Err(SchedulerError::InvalidConfig(_))));
}

#[test]
fn test_new_requires_a_runtime() {
    let result = Scheduler::<Job, Value>::new(PoolConfig::new(), Script::default());
    assert!(matches!(result, Err(SchedulerError::Runtime(_))));
}

#[test]
fn test_builder_accepts_explicit_runtime_handle() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let scheduler: Scheduler<Job, Value> = SchedulerBuilder::new(Script::default())
        .initial_capacity(1)
        .runtime_handle(runtime.handle().clone())
        .build()
        .unwrap();

    let value = runtime.block_on(scheduler.resolve_song(Job::Value(3), Priority::Normal));
    assert_eq!(value, Ok(json!(3)));
    let report = runtime.block_on(scheduler.shutdown());
    assert!(report.drained);
}
