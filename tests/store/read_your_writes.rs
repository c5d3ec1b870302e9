use std::time::Duration;

use batchkv::KvError;

use crate::common::StoreContext;
use crate::{assert_err, assert_ok};

#[tokio::test]
async fn pending_write_is_readable_before_commit() {
    let ctx = StoreContext::new();
    ctx.engine.hold_commits();

    assert_ok!(ctx.store.set_entry(b"user:1", b"alice", 0).await);
    assert_ok!(ctx.store.has_value(b"user:1"));
    assert_eq!(assert_ok!(ctx.store.get(b"user:1")), b"alice");
    assert_eq!(ctx.durable(b"user:1"), None);

    ctx.engine.release_commits();
    assert_ok!(ctx.store.flush().await);
    assert_eq!(ctx.durable(b"user:1"), Some(b"alice".to_vec()));
    assert_eq!(ctx.store.pending_len(), 0);
    assert_eq!(assert_ok!(ctx.store.get(b"user:1")), b"alice");
}

#[tokio::test]
async fn second_pending_write_is_rejected() {
    let ctx = StoreContext::new();
    ctx.engine.hold_commits();

    assert_ok!(ctx.store.set_entry(b"k", b"v1", 0).await);
    assert_err!(ctx.store.set_entry(b"k", b"v2", 0).await, KvError::KeyAlreadyExists);
    assert_eq!(assert_ok!(ctx.store.get(b"k")), b"v1");

    ctx.engine.release_commits();
    assert_ok!(ctx.store.flush().await);

    // Once committed the key is free for the next write.
    assert_ok!(ctx.store.set_entry(b"k", b"v3", 0).await);
    assert_ok!(ctx.store.flush().await);
    assert_eq!(ctx.durable(b"k"), Some(b"v3".to_vec()));
}

#[tokio::test]
async fn revert_deletes_committed_value() {
    let ctx = StoreContext::new();
    assert_ok!(ctx.store.set_entry(b"k", b"v", 0).await);
    assert_ok!(ctx.store.flush().await);
    assert_eq!(ctx.durable(b"k"), Some(b"v".to_vec()));

    assert_ok!(ctx.store.revert_set(b"k").await);
    assert_ok!(ctx.store.flush().await);
    assert_eq!(ctx.durable(b"k"), None);
    assert_err!(ctx.store.has_value(b"k"), KvError::KeyNotFound);
    assert_eq!(ctx.store.live_entries(), 0);
}

#[tokio::test]
async fn revert_withdraws_pending_write() {
    let ctx = StoreContext::new();
    ctx.engine.hold_commits();

    assert_ok!(ctx.store.set_entry(b"k", b"v", 0).await);
    assert_ok!(ctx.store.revert_set(b"k").await);
    assert_err!(ctx.store.has_value(b"k"), KvError::KeyNotFound);

    ctx.engine.release_commits();
    assert_ok!(ctx.store.flush().await);
    assert_eq!(ctx.durable(b"k"), None);
}

#[tokio::test]
async fn revert_of_unknown_key_is_accepted() {
    let ctx = StoreContext::new();
    assert_ok!(ctx.store.revert_set(b"never-written").await);
    assert_ok!(ctx.store.flush().await);
    assert!(ctx.engine.is_empty());
}

#[tokio::test]
async fn writes_to_one_key_apply_in_submission_order() {
    let ctx = StoreContext::new();
    assert_ok!(ctx.store.set_entry(b"k", b"first", 0).await);
    assert_ok!(ctx.store.revert_set(b"k").await);
    assert_ok!(ctx.store.set_entry(b"k", b"second", 0).await);
    assert_eq!(assert_ok!(ctx.store.get(b"k")), b"second");

    assert_ok!(ctx.store.flush().await);
    assert_eq!(ctx.durable(b"k"), Some(b"second".to_vec()));
    assert_eq!(ctx.store.pending_len(), 0);
}

#[tokio::test]
async fn invalid_requests_are_refused() {
    let ctx = StoreContext::new();
    assert_err!(ctx.store.set_entry(b"", b"v", 0).await, KvError::InvalidKey);
    assert_err!(ctx.store.set_entry(b"k", b"", 0).await, KvError::InvalidData);
    assert_err!(
        ctx.store.set_entry(b"!badger!head", b"v", 0).await,
        KvError::InvalidKey
    );
    assert_err!(ctx.store.revert_set(b"!badger!head").await, KvError::InvalidKey);

    assert_ok!(ctx.store.flush().await);
    assert_eq!(ctx.store.stats().transactions_opened, 0);
    assert!(ctx.engine.is_empty());
}

#[tokio::test]
async fn missing_key_reports_not_found() {
    let ctx = StoreContext::new();
    assert_err!(ctx.store.has_value(b"nope"), KvError::KeyNotFound);
    assert_err!(ctx.store.get(b"nope"), KvError::KeyNotFound);
}

#[tokio::test]
async fn expiry_is_passed_to_the_engine() {
    let ctx = StoreContext::new();
    // Already in the past: visible while pending, gone once durable.
    assert_ok!(ctx.store.set_entry(b"session", b"token", 1).await);
    assert_ok!(ctx.store.has_value(b"session"));

    assert_ok!(ctx.store.flush().await);
    assert_err!(ctx.store.has_value(b"session"), KvError::KeyNotFound);
    assert_eq!(ctx.engine.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn rewrite_survives_commit_of_reverted_batch() {
    let ctx = StoreContext::new();
    ctx.engine.hold_commits();

    // The first write goes out in its own batch and stays held.
    assert_ok!(ctx.store.set_entry(b"k", b"v1", 0).await);
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_ok!(ctx.store.revert_set(b"k").await);
    assert_ok!(ctx.store.set_entry(b"k", b"v2", 0).await);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(assert_ok!(ctx.store.get(b"k")), b"v2");

    // Only the older batch commits.
    ctx.engine.release_one_commit();
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(ctx.engine.commit_count(), 1);
    assert_eq!(ctx.durable(b"k"), Some(b"v1".to_vec()));
    assert_eq!(ctx.store.pending_len(), 1);
    assert_eq!(assert_ok!(ctx.store.get(b"k")), b"v2");
    assert_err!(ctx.store.set_entry(b"k", b"v3", 0).await, KvError::KeyAlreadyExists);

    ctx.engine.release_commits();
    assert_ok!(ctx.store.flush().await);
    assert_eq!(ctx.durable(b"k"), Some(b"v2".to_vec()));
    assert_eq!(ctx.store.pending_len(), 0);
}
