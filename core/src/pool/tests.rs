//! Tests for the executor pool

use super::*;
use crate::error::NodeError;
use crate::test_support::{FailMode, MockScriptFactory};

use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn build_pool(factory: Arc<MockScriptFactory>, throughput: usize) -> ExecutorPool {
    PoolBuilder::new()
        .factory(factory)
        .throughput(throughput)
        .script("export default () => 'ok';")
        .build()
        .expect("Failed to build pool")
}

// ============================================================================
// Builder Tests
// ============================================================================

#[test]
fn test_builder_missing_factory() {
    let result = PoolBuilder::new().throughput(1).script("x").build();
    let err = result.unwrap_err();
    assert!(err.to_string().contains("factory"));
}

#[test]
fn test_builder_missing_throughput() {
    let factory = Arc::new(MockScriptFactory::constant("ok"));
    let result = PoolBuilder::new().factory(factory).script("x").build();
    assert!(result.is_err());
}

#[test]
fn test_builder_missing_script() {
    let factory = Arc::new(MockScriptFactory::constant("ok"));
    let result = PoolBuilder::new().factory(factory).throughput(1).build();
    assert!(result.is_err());
}

#[test]
fn test_builder_zero_throughput() {
    let factory = Arc::new(MockScriptFactory::constant("ok"));
    let result = PoolBuilder::new()
        .factory(factory)
        .throughput(0)
        .script("x")
        .build();
    assert!(matches!(result, Err(NodeError::Config(_))));
}

#[test]
fn test_pool_has_one_slot_per_unit_of_throughput() {
    let factory = Arc::new(MockScriptFactory::constant("ok"));
    let pool = build_pool(Arc::clone(&factory), 5);

    assert_eq!(pool.len(), 5);
    assert!(!pool.is_empty());
    assert_eq!(pool.backend(), "mock");
    assert_eq!(factory.probe.loads.load(Ordering::SeqCst), 5);
    for (i, slot) in pool.slots().iter().enumerate() {
        assert_eq!(slot.index(), i);
    }
    assert!(pool.slot(5).is_none());
}

#[test]
fn test_pool_build_is_all_or_nothing() {
    let factory = Arc::new(MockScriptFactory::constant("ok").with_fail_load_slot(2));

    let result = PoolBuilder::new()
        .factory(factory.clone())
        .throughput(4)
        .script("x")
        .build();

    match result {
        Err(NodeError::PluginLoad { slot, message }) => {
            assert_eq!(slot, 2);
            assert!(message.contains("refused"));
        }
        other => panic!("Expected PluginLoad, got {other:?}"),
    }
    // Slots after the failing one are never attempted
    assert_eq!(factory.probe.loads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_build_blocking() {
    let factory = Arc::new(MockScriptFactory::constant("ok"));
    let pool = PoolBuilder::new()
        .factory(factory)
        .throughput(3)
        .script("x")
        .build_blocking()
        .await
        .expect("Failed to build pool");
    assert_eq!(pool.len(), 3);
}

// ============================================================================
// Slot Invocation Tests
// ============================================================================

#[tokio::test]
async fn test_slot_invoke_success() {
    let factory = Arc::new(MockScriptFactory::constant("ok"));
    let pool = build_pool(factory, 1);

    let record = pool.slot(0).unwrap().invoke(None).await.unwrap();
    assert_eq!(record, "ok");
    assert!(!pool.slot(0).unwrap().is_busy());
}

#[tokio::test]
async fn test_slot_invoke_failure_releases_lock() {
    let factory = Arc::new(MockScriptFactory::constant("ok").with_fail_mode(FailMode::Always));
    let pool = build_pool(factory, 1);
    let slot = pool.slot(0).unwrap();

    let err = slot.invoke(None).await.unwrap_err();
    assert!(matches!(err, NodeError::Invocation { slot: 0, .. }));
    assert!(err.to_string().contains("simulated failure"));

    // Lock was released despite the failure
    assert!(!slot.is_busy());
    assert!(slot.invoke(None).await.is_err());
}

#[tokio::test]
async fn test_same_slot_invocations_never_overlap() {
    let factory = Arc::new(MockScriptFactory::numbered().with_delay(Duration::from_millis(20)));
    let pool = Arc::new(build_pool(Arc::clone(&factory), 1));

    let calls = (0..5).map(|_| {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { pool.slot(0).unwrap().invoke(None).await })
    });

    let records: HashSet<String> = futures::future::join_all(calls)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert_eq!(records.len(), 5);
    assert_eq!(factory.probe.max_slot_overlap.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_different_slots_run_in_parallel() {
    let factory =
        Arc::new(MockScriptFactory::constant("ok").with_delay(Duration::from_millis(100)));
    let pool = Arc::new(build_pool(Arc::clone(&factory), 4));

    let start = std::time::Instant::now();
    let mut handles = Vec::new();
    for index in 0..4 {
        let pool = Arc::clone(&pool);
        handles.push(tokio::spawn(async move {
            pool.slot(index).unwrap().invoke(None).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // Four 100ms calls on four slots finish well under 400ms
    assert!(start.elapsed() < Duration::from_millis(350));
    assert_eq!(factory.probe.max_slot_overlap.load(Ordering::SeqCst), 1);
    assert!(factory.probe.max_in_flight.load(Ordering::SeqCst) > 1);
}

#[tokio::test]
async fn test_slot_invoke_timeout_keeps_slot_locked() {
    let factory =
        Arc::new(MockScriptFactory::constant("ok").with_delay(Duration::from_millis(200)));
    let pool = build_pool(factory, 1);
    let slot = pool.slot(0).unwrap();

    let err = slot
        .invoke(Some(Duration::from_millis(20)))
        .await
        .unwrap_err();
    assert!(matches!(err, NodeError::InvocationTimeout { slot: 0, .. }));

    // The script is still running, so the slot stays held
    assert!(slot.is_busy());

    // Once it returns the slot is usable again
    let record = slot.invoke(None).await.unwrap();
    assert_eq!(record, "ok");
}

#[test]
fn test_pool_debug_format() {
    let factory = Arc::new(MockScriptFactory::constant("ok"));
    let pool = build_pool(factory, 2);

    let debug = format!("{:?}", pool);
    assert!(debug.contains("ExecutorPool"));
    assert!(debug.contains("mock"));

    let debug = format!("{:?}", pool.slot(1).unwrap());
    assert!(debug.contains("index: 1"));
}
