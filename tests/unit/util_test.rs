//! Tests for shared utilities

use metadata_offload::util::{init_tracing, resident_memory_bytes};

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
}

#[test]
fn test_resident_memory_reported_on_linux() {
    let bytes = resident_memory_bytes();
    if cfg!(target_os = "linux") {
        assert!(bytes.is_some_and(|b| b > 0));
    } else {
        assert!(bytes.is_none());
    }
}
