//! Tests for configuration validation and loading

use std::collections::HashMap;
use std::time::Duration;

use metadata_offload::config::{InstanceSize, PoolConfig, ENV_PREFIX};

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (format!("{ENV_PREFIX}{k}"), (*v).to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn test_defaults_are_valid() {
    let config = PoolConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.task_timeout(), Duration::from_secs(30));
    assert_eq!(config.health_check_timeout(), Duration::from_secs(5));
    assert_eq!(config.drain_timeout(), Duration::from_secs(10));
    assert_eq!(config.max_capacity, 4);
    assert_eq!(config.health_check_sample, 2);
    assert_eq!(config.initial_capacity, None);
    assert_eq!(config.max_queue_depth, None);
}

#[test]
fn test_invalid_max_capacity() {
    assert!(PoolConfig::new().with_max_capacity(0).validate().is_err());
}

#[test]
fn test_invalid_timeout() {
    let config = PoolConfig::new().with_task_timeout(Duration::ZERO);
    assert!(config.validate().is_err());
}

#[test]
fn test_invalid_queue_depth() {
    assert!(PoolConfig::new().with_max_queue_depth(0).validate().is_err());
}

#[test]
fn test_invalid_initial_capacity() {
    assert!(PoolConfig::new().with_initial_capacity(0).validate().is_err());
}

#[test]
fn test_tiny_stack_rejected() {
    assert!(PoolConfig::new().with_thread_stack_size(1024).validate().is_err());
}

#[test]
fn test_from_json_fills_defaults() {
    let config = PoolConfig::from_json_str(r#"{"task_timeout_ms": 500, "instance_size": "large"}"#).unwrap();
    assert_eq!(config.task_timeout_ms, 500);
    assert_eq!(config.instance_size, Some(InstanceSize::Large));
    assert_eq!(config.max_capacity, 4);
}

#[test]
fn test_from_json_rejects_invalid_values() {
    let err = PoolConfig::from_json_str(r#"{"max_capacity": 0}"#).unwrap_err();
    assert!(err.contains("max_capacity"));
    assert!(PoolConfig::from_json_str("not json").unwrap_err().starts_with("parse error"));
}

#[test]
fn test_from_json_file_missing() {
    let err = PoolConfig::from_json_file("/definitely/not/here.json").unwrap_err();
    assert!(format!("{err:#}").contains("reading pool config"));
}

#[test]
fn test_env_overlay() {
    let config = PoolConfig::default()
        .apply_env(env(&[
            ("TASK_TIMEOUT_MS", "1500"),
            ("MAX_CAPACITY", "3"),
            ("INSTANCE_SIZE", " Medium "),
            ("MAX_QUEUE_DEPTH", "64"),
        ]))
        .unwrap();
    assert_eq!(config.task_timeout_ms, 1500);
    assert_eq!(config.max_capacity, 3);
    assert_eq!(config.instance_size, Some(InstanceSize::Medium));
    assert_eq!(config.max_queue_depth, Some(64));
    assert_eq!(config.drain_timeout_ms, 10_000);
}

#[test]
fn test_env_overlay_unit_tuning() {
    let config = PoolConfig::default()
        .apply_env(env(&[
            ("HEALTH_CHECK_SAMPLE", "3"),
            ("THREAD_STACK_SIZE", "1048576"),
        ]))
        .unwrap();
    assert_eq!(config.health_check_sample, 3);
    assert_eq!(config.thread_stack_size, 1024 * 1024);

    let err = PoolConfig::default()
        .apply_env(env(&[("THREAD_STACK_SIZE", "4096")]))
        .unwrap_err();
    assert!(err.contains("thread_stack_size"));

    let err = PoolConfig::default()
        .apply_env(env(&[("HEALTH_CHECK_SAMPLE", "0")]))
        .unwrap_err();
    assert!(err.contains("health_check_sample"));
}

#[test]
fn test_env_overlay_names_bad_variable() {
    let err = PoolConfig::default()
        .apply_env(env(&[("MAX_CAPACITY", "lots")]))
        .unwrap_err();
    assert!(err.starts_with("METADATA_POOL_MAX_CAPACITY"));
}

#[test]
fn test_instance_size_hints() {
    assert_eq!(InstanceSize::Small.capacity_hint(), 1);
    assert_eq!(InstanceSize::Xlarge.capacity_hint(), 4);
    assert_eq!("xlarge".parse::<InstanceSize>(), Ok(InstanceSize::Xlarge));
    assert!("huge".parse::<InstanceSize>().is_err());
}
