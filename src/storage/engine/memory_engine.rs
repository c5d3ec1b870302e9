//! In-memory transactional engine
//!
//! A [`DurableEngine`] over an ordered map. Transactions buffer their writes
//! and enforce per-transaction limits on operation count and byte size the
//! same way a log-structured engine limits its write batches, so callers see
//! [`EngineError::TransactionTooLarge`] under realistic conditions.
//!
//! Test hooks: commits can be held behind a gate and let through one at a
//! time, delayed, or made to fail.
//!
//! Reads copy the value out before calling the caller's closure, so the
//! closure may call back into the engine.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::{debug, warn};
use parking_lot::RwLock;
use tokio::sync::{Semaphore, watch};

use super::durable_engine::{DurableEngine, DurableTransaction};
use crate::common::exception::EngineError;

pub(crate) const LOG_TARGET: &str = module_path!();

/// Fixed per-write overhead counted against the byte limit.
const WRITE_OVERHEAD_BYTES: usize = 16;

/// Limits and timing for [`MemoryEngine`]
#[derive(Debug, Clone)]
pub struct MemoryEngineOptions {
    pub max_txn_entries: usize,
    pub max_txn_bytes: usize,
    pub commit_latency: Duration,
}

impl Default for MemoryEngineOptions {
    fn default() -> Self {
        Self {
            max_txn_entries: 100_000,
            max_txn_bytes: 64 * 1024 * 1024,
            commit_latency: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone)]
struct StoredValue {
    value: Vec<u8>,
    expires_at: u64,
}

impl StoredValue {
    fn is_expired(&self, now: u64) -> bool {
        self.expires_at != 0 && self.expires_at <= now
    }
}

#[derive(Debug)]
struct EngineState {
    data: RwLock<BTreeMap<Vec<u8>, StoredValue>>,
    options: MemoryEngineOptions,
    gate: watch::Sender<bool>,
    passes: Semaphore,
    pending_failures: AtomicUsize,
    commits: AtomicU64,
    failed_commits: AtomicU64,
}

impl EngineState {
    fn apply(&self, writes: Vec<(Vec<u8>, Option<StoredValue>)>) {
        let mut data = self.data.write();
        for (key, write) in writes {
            match write {
                Some(stored) => {
                    data.insert(key, stored);
                }
                None => {
                    data.remove(&key);
                }
            }
        }
    }

    fn take_injected_failure(&self) -> bool {
        self.pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// Ordered in-memory engine with write transactions
#[derive(Debug, Clone)]
pub struct MemoryEngine {
    state: Arc<EngineState>,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new(MemoryEngineOptions::default())
    }
}

impl MemoryEngine {
    pub fn new(options: MemoryEngineOptions) -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            state: Arc::new(EngineState {
                data: RwLock::new(BTreeMap::new()),
                options,
                gate,
                passes: Semaphore::new(0),
                pending_failures: AtomicUsize::new(0),
                commits: AtomicU64::new(0),
                failed_commits: AtomicU64::new(0),
            }),
        }
    }

    pub fn options(&self) -> &MemoryEngineOptions {
        &self.state.options
    }

    /// Writes a value directly, outside any transaction.
    pub fn preload(&self, key: &[u8], value: &[u8]) {
        self.state.data.write().insert(
            key.to_vec(),
            StoredValue {
                value: value.to_vec(),
                expires_at: 0,
            },
        );
    }

    /// Number of stored keys, expired ones included.
    pub fn len(&self) -> usize {
        self.state.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Makes the next `count` commits fail and discard their writes.
    pub fn fail_next_commits(&self, count: usize) {
        self.state.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Commits started from now on wait until [`MemoryEngine::release_commits`].
    pub fn hold_commits(&self) {
        self.state.gate.send_replace(false);
    }

    pub fn release_commits(&self) {
        self.state.gate.send_replace(true);
    }

    /// Lets the longest-waiting held commit through while the gate stays shut.
    pub fn release_one_commit(&self) {
        self.state.passes.add_permits(1);
    }

    /// Number of successful commits, empty ones included.
    pub fn commit_count(&self) -> u64 {
        self.state.commits.load(Ordering::Relaxed)
    }

    pub fn failed_commit_count(&self) -> u64 {
        self.state.failed_commits.load(Ordering::Relaxed)
    }

    fn lookup<R>(&self, key: &[u8], project: impl FnOnce(&StoredValue) -> R) -> Result<R, EngineError> {
        if key.is_empty() {
            return Err(EngineError::InvalidKey);
        }
        let now = unix_now();
        let data = self.state.data.read();
        match data.get(key) {
            Some(stored) if !stored.is_expired(now) => Ok(project(stored)),
            _ => Err(EngineError::KeyNotFound),
        }
    }
}

impl DurableEngine for MemoryEngine {
    type Transaction = MemoryTransaction;

    fn begin(&self) -> MemoryTransaction {
        MemoryTransaction {
            state: Arc::clone(&self.state),
            writes: Vec::new(),
            size_bytes: 0,
        }
    }

    fn contains(&self, key: &[u8]) -> Result<(), EngineError> {
        self.lookup(key, |_| ())
    }

    fn read<R>(&self, key: &[u8], consume: impl FnOnce(&[u8]) -> R) -> Result<R, EngineError> {
        let value = self.lookup(key, |stored| stored.value.clone())?;
        Ok(consume(&value))
    }
}

/// Write transaction on a [`MemoryEngine`]
#[derive(Debug)]
pub struct MemoryTransaction {
    state: Arc<EngineState>,
    writes: Vec<(Vec<u8>, Option<StoredValue>)>,
    size_bytes: usize,
}

impl MemoryTransaction {
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    fn reserve(&mut self, key: &[u8], value_len: usize) -> Result<(), EngineError> {
        if key.is_empty() {
            return Err(EngineError::InvalidKey);
        }
        let options = &self.state.options;
        let write_size = key.len() + value_len + WRITE_OVERHEAD_BYTES;
        if self.writes.len() + 1 > options.max_txn_entries
            || self.size_bytes + write_size > options.max_txn_bytes
        {
            return Err(EngineError::TransactionTooLarge);
        }
        self.size_bytes += write_size;
        Ok(())
    }
}

impl DurableTransaction for MemoryTransaction {
    fn set_entry(&mut self, key: &[u8], value: &[u8], expires_at: u64) -> Result<(), EngineError> {
        self.reserve(key, value.len())?;
        self.writes.push((
            key.to_vec(),
            Some(StoredValue {
                value: value.to_vec(),
                expires_at,
            }),
        ));
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), EngineError> {
        self.reserve(key, 0)?;
        self.writes.push((key.to_vec(), None));
        Ok(())
    }

    fn len(&self) -> usize {
        self.writes.len()
    }

    fn commit(self) -> impl Future<Output = Result<(), EngineError>> + Send + 'static {
        let MemoryTransaction { state, writes, .. } = self;
        async move {
            let opened = tokio::select! {
                open = async {
                    let mut gate = state.gate.subscribe();
                    gate.wait_for(|open| *open).await.is_ok()
                } => open,
                pass = state.passes.acquire() => pass.map(|pass| pass.forget()).is_ok(),
            };
            if !opened {
                return Err(EngineError::Storage("engine dropped".to_string()));
            }

            let latency = state.options.commit_latency;
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }

            if state.take_injected_failure() {
                state.failed_commits.fetch_add(1, Ordering::Relaxed);
                warn!("Injected commit failure, discarding {} writes", writes.len());
                return Err(EngineError::CommitFailed("injected commit failure".to_string()));
            }

            let count = writes.len();
            state.apply(writes);
            state.commits.fetch_add(1, Ordering::Relaxed);
            debug!("Committed transaction with {} writes", count);
            Ok(())
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
