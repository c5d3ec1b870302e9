use std::sync::Arc;
use std::time::Duration;

use batchkv::{Backpressure, BatchConfig, KvError, MemoryEngineOptions};

use crate::common::StoreContext;
use crate::{assert_err, assert_ok};

/// One commit slot and one queue slot, so a held commit saturates the
/// pipeline after three writes.
fn saturating_config(backpressure: Backpressure) -> BatchConfig {
    BatchConfig {
        max_concurrent_commits: 1,
        queue_capacity: 1,
        backpressure,
        ..BatchConfig::for_testing()
    }
}

async fn saturate(ctx: &StoreContext) {
    ctx.engine.hold_commits();
    assert_ok!(ctx.store.set_entry(b"a", b"1", 0).await);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_ok!(ctx.store.set_entry(b"b", b"2", 0).await);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_ok!(ctx.store.set_entry(b"c", b"3", 0).await);
}

#[tokio::test(start_paused = true)]
async fn reject_policy_fails_fast_when_saturated() {
    let ctx = StoreContext::with(
        MemoryEngineOptions::default(),
        saturating_config(Backpressure::Reject),
    );
    saturate(&ctx).await;

    assert_err!(ctx.store.set_entry(b"d", b"4", 0).await, KvError::TooManyRequests);
    assert_err!(ctx.store.has_value(b"d"), KvError::KeyNotFound);
    assert_eq!(ctx.store.pending_len(), 3);

    ctx.engine.release_commits();
    assert_ok!(ctx.store.flush().await);
    assert_eq!(ctx.engine.len(), 3);

    // With the pipeline drained, the rejected key can be written.
    assert_ok!(ctx.store.set_entry(b"d", b"4", 0).await);
    assert_ok!(ctx.store.shutdown().await);
    assert_eq!(ctx.engine.len(), 4);
}

#[tokio::test(start_paused = true)]
async fn block_policy_waits_for_room() {
    let ctx = Arc::new(StoreContext::with(
        MemoryEngineOptions::default(),
        saturating_config(Backpressure::Block),
    ));
    saturate(&ctx).await;

    let writer = {
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move { ctx.store.set_entry(b"d", b"4", 0).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!writer.is_finished());
    // Not visible until its producer holds a queue slot.
    assert_err!(ctx.store.has_value(b"d"), KvError::KeyNotFound);

    ctx.engine.release_commits();
    assert_ok!(assert_ok!(writer.await));
    assert_ok!(ctx.store.flush().await);
    assert_eq!(ctx.engine.len(), 4);
}

#[tokio::test(start_paused = true)]
async fn abandoned_blocked_write_can_be_retried() {
    let ctx = StoreContext::with(
        MemoryEngineOptions::default(),
        saturating_config(Backpressure::Block),
    );
    saturate(&ctx).await;

    let waited =
        tokio::time::timeout(Duration::from_millis(5), ctx.store.set_entry(b"d", b"4", 0)).await;
    assert!(waited.is_err());
    assert_eq!(ctx.store.pending_len(), 3);
    assert_err!(ctx.store.has_value(b"d"), KvError::KeyNotFound);

    ctx.engine.release_commits();
    assert_ok!(ctx.store.flush().await);
    assert_eq!(ctx.store.pending_len(), 0);

    assert_ok!(ctx.store.set_entry(b"d", b"4", 0).await);
    assert_ok!(ctx.store.flush().await);
    assert_eq!(ctx.durable(b"d"), Some(b"4".to_vec()));
}

#[tokio::test]
async fn writes_after_shutdown_report_closed() {
    let ctx = StoreContext::new();
    assert_ok!(ctx.store.set_entry(b"a", b"1", 0).await);
    assert_ok!(ctx.store.shutdown().await);

    assert_err!(ctx.store.set_entry(b"b", b"2", 0).await, KvError::Closed);
    assert_err!(ctx.store.revert_set(b"a").await, KvError::Closed);
    assert_eq!(ctx.store.pending_len(), 0);
    assert_eq!(ctx.durable(b"a"), Some(b"1".to_vec()));
}
