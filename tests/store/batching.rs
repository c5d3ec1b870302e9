use std::sync::Arc;
use std::time::Duration;

use batchkv::{BatchConfig, MemoryEngineOptions};

use crate::assert_ok;
use crate::common::StoreContext;

#[tokio::test]
async fn full_transaction_is_split() {
    let ctx = StoreContext::with(
        MemoryEngineOptions {
            max_txn_entries: 4,
            ..MemoryEngineOptions::default()
        },
        BatchConfig::for_testing(),
    );

    for i in 0..10u32 {
        let key = format!("key:{i}");
        assert_ok!(ctx.store.set_entry(key.as_bytes(), b"v", 0).await);
    }
    assert_ok!(ctx.store.flush().await);

    assert_eq!(ctx.engine.len(), 10);
    let stats = ctx.store.stats();
    assert_eq!(stats.entries_applied, 10);
    assert_eq!(stats.entries_dropped, 0);
    assert!(stats.transactions_opened >= 3);
    assert!(ctx.engine.commit_count() >= 3);
}

#[tokio::test]
async fn burst_coalesces_into_one_transaction() {
    let ctx = StoreContext::with(
        MemoryEngineOptions::default(),
        BatchConfig {
            queue_capacity: 128,
            ..BatchConfig::for_testing()
        },
    );

    for i in 0..50u32 {
        let key = format!("key:{i}");
        assert_ok!(ctx.store.set_entry(key.as_bytes(), b"v", 0).await);
    }
    assert_ok!(ctx.store.flush().await);

    assert_eq!(ctx.engine.len(), 50);
    assert_eq!(ctx.store.stats().transactions_opened, 1);
}

#[tokio::test(start_paused = true)]
async fn idle_transaction_commits_after_debounce() {
    let ctx = StoreContext::new();
    assert_ok!(ctx.store.set_entry(b"k", b"v", 0).await);

    tokio::time::sleep(Duration::from_micros(500)).await;
    assert_eq!(ctx.durable(b"k"), None);
    assert_eq!(ctx.store.pending_len(), 1);

    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(ctx.durable(b"k"), Some(b"v".to_vec()));
    assert_eq!(ctx.store.pending_len(), 0);
    assert_eq!(ctx.store.stats().idle_flushes, 1);
}

#[tokio::test]
async fn buffers_are_recycled() {
    let ctx = StoreContext::new();
    for i in 0..8u32 {
        let key = format!("a:{i}");
        assert_ok!(ctx.store.set_entry(key.as_bytes(), b"payload", 0).await);
    }
    assert_ok!(ctx.store.flush().await);
    assert_eq!(ctx.store.live_entries(), 0);
    assert!(ctx.store.buffer_stats().retained > 0);

    for i in 0..8u32 {
        let key = format!("b:{i}");
        assert_ok!(ctx.store.set_entry(key.as_bytes(), b"payload", 0).await);
    }
    assert_ok!(ctx.store.flush().await);
    assert!(ctx.store.buffer_stats().reused > 0);
    assert_eq!(ctx.store.live_entries(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_all_land() {
    let ctx = Arc::new(StoreContext::new());

    let mut handles = Vec::new();
    for writer in 0..8u32 {
        let ctx = Arc::clone(&ctx);
        handles.push(tokio::spawn(async move {
            for i in 0..50u32 {
                let key = format!("w{writer}:{i}");
                let value = format!("{writer}-{i}");
                ctx.store
                    .set_entry(key.as_bytes(), value.as_bytes(), 0)
                    .await?;
            }
            Ok::<(), batchkv::KvError>(())
        }));
    }
    for handle in handles {
        assert_ok!(assert_ok!(handle.await));
    }

    assert_ok!(ctx.store.flush().await);
    assert_eq!(ctx.engine.len(), 400);
    assert_eq!(ctx.store.pending_len(), 0);
    assert_eq!(ctx.store.live_entries(), 0);
    assert_eq!(assert_ok!(ctx.store.get(b"w3:17")), b"3-17");

    let stats = ctx.store.stats();
    assert_eq!(stats.entries_applied, 400);
    assert_eq!(stats.commits_completed(), stats.transactions_opened);
}
