//! # Batched Store
//!
//! The public face of the write-coalescing layer.
//!
//! ```text
//!   set_entry ─► validate ─► reserve queue slot ─► install in overlay ─► send ─► BatchWorker ─► engine
//!                                                        │                             │
//!   get_value ─► overlay hit? ───────────────────────────┘ yes                         │
//!                   │ no                                                               │
//!                   └──────────────► engine.read ◄─────────────────────────────────────┘
//! ```
//!
//! The queue slot is reserved before the overlay is touched and the send
//! itself cannot wait, so a caller that abandons `set_entry` midway leaves
//! neither a stray overlay record nor a lost write behind.
//!
//! A successful `set_entry` only means the write was accepted: the value is
//! visible through the overlay straight away and becomes durable once its
//! transaction commits. A failed commit is not reported to the writer whose
//! entry it carried; instead the store latches the error and refuses every
//! later write with it.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Permit;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::key_value_store::KeyValueStore;
use crate::common::config::{Backpressure, BatchConfig};
use crate::common::exception::{EngineError, KvError};
use crate::storage::batch::{BatchWorker, CommitLatch, WorkerCommand, WorkerStats, WorkerStatsSnapshot};
use crate::storage::engine::DurableEngine;
use crate::storage::overlay::{InstallOutcome, OverlayCoordinator, OverlayStore};
use crate::storage::pool::{BufferPool, BufferPoolStats, EntryPool};

pub(crate) const LOG_TARGET: &str = module_path!();

/// Write-coalescing front end over a durable engine
pub struct BatchedStore<E: DurableEngine, S: OverlayStore> {
    engine: Arc<E>,
    overlay: OverlayCoordinator<S>,
    entries: EntryPool,
    queue: mpsc::Sender<WorkerCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
    latch: CommitLatch,
    stats: Arc<WorkerStats>,
    config: BatchConfig,
}

impl<E: DurableEngine, S: OverlayStore> BatchedStore<E, S> {
    /// Wipes the overlay and starts the batch worker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(engine: Arc<E>, overlay: Arc<S>, config: BatchConfig) -> Self {
        let config = config.sanitized();
        let overlay = OverlayCoordinator::new(overlay);
        overlay.reset();

        let latch = CommitLatch::new();
        let stats = Arc::new(WorkerStats::new());
        let (queue, receiver) = mpsc::channel(config.queue_capacity);
        let worker = BatchWorker::new(
            Arc::clone(&engine),
            overlay.clone(),
            latch.clone(),
            Arc::clone(&stats),
            &config,
        )
        .spawn(receiver);

        log::info!(
            "Opened batched store (queue capacity {}, {:?} backpressure)",
            config.queue_capacity,
            config.backpressure
        );

        Self {
            engine,
            overlay,
            entries: EntryPool::new(Arc::new(BufferPool::new(config.max_retained_buffers))),
            queue,
            worker: Mutex::new(Some(worker)),
            latch,
            stats,
            config,
        }
    }

    /// Accepts a put of `value` under `key`.
    ///
    /// `expires_at` is a unix timestamp in seconds, 0 for no expiry.
    ///
    /// # Errors
    /// * `CommitFailed` once any earlier commit has failed
    /// * `InvalidKey` for an empty or reserved key, `InvalidData` for an empty value
    /// * `KeyAlreadyExists` while an earlier write of `key` is still pending
    /// * `TooManyRequests` when the queue is full under [`Backpressure::Reject`]
    /// * `Closed` after [`BatchedStore::shutdown`]
    pub async fn set_entry(&self, key: &[u8], value: &[u8], expires_at: u64) -> Result<(), KvError> {
        self.latch.check()?;
        self.validate_key(key)?;
        if value.is_empty() {
            return Err(KvError::InvalidData);
        }

        let slot = self.reserve_slot().await?;
        let entry = self.entries.alloc().set(key, value, expires_at);
        match self.overlay.install(&entry) {
            InstallOutcome::Installed => {}
            InstallOutcome::Conflict => return Err(KvError::KeyAlreadyExists),
            InstallOutcome::Failed(err) => return Err(err.into()),
        }

        slot.send(WorkerCommand::Apply(entry));
        log::trace!("Accepted write of {} bytes", value.len());
        Ok(())
    }

    /// Withdraws any pending write of `key` and schedules a delete.
    ///
    /// Neither the commit-failure latch nor the existence of `key` is checked.
    pub async fn revert_set(&self, key: &[u8]) -> Result<(), KvError> {
        self.validate_key(key)?;
        let slot = self.reserve_slot().await?;
        self.overlay.evict_key(key);
        slot.send(WorkerCommand::Apply(self.entries.alloc().set_key(key)));
        Ok(())
    }

    /// Succeeds if `key` has a pending or committed value.
    pub fn has_value(&self, key: &[u8]) -> Result<(), KvError> {
        if self.overlay.holds_value(key) {
            return Ok(());
        }
        self.engine.contains(key).map_err(KvError::from)
    }

    /// Streams the value of `key` into `consume`, pending writes first.
    ///
    /// A pending value is copied out of the overlay before `consume` runs, so
    /// `consume` may call back into the store.
    pub fn get_value<F>(&self, key: &[u8], consume: F) -> Result<(), KvError>
    where
        F: FnOnce(&[u8]) -> Result<(), KvError>,
    {
        let mut consume = Some(consume);
        let pending = self
            .overlay
            .lookup(key, |value| consume.take().map(|f| f(value)));
        if let Some(Some(result)) = pending {
            return result;
        }

        match consume.take() {
            Some(f) => self.engine.read(key, f)?,
            None => Ok(()),
        }
    }

    /// Copies the value of `key` out.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>, KvError> {
        let mut out = Vec::new();
        self.get_value(key, |value| {
            out.extend_from_slice(value);
            Ok(())
        })?;
        Ok(out)
    }

    /// Commits the open transaction and waits for every in-flight commit.
    pub async fn flush(&self) -> Result<(), KvError> {
        let (done, wait) = oneshot::channel();
        self.queue
            .send(WorkerCommand::Flush(done))
            .await
            .map_err(|_| KvError::Closed)?;
        wait.await.map_err(|_| KvError::Closed)
    }

    /// Flushes, stops the worker and waits for it to exit.
    ///
    /// Returns the latched commit error, if any commit ever failed.
    /// Calling it again is harmless.
    pub async fn shutdown(&self) -> Result<(), KvError> {
        let (done, wait) = oneshot::channel();
        if self.queue.send(WorkerCommand::Shutdown(done)).await.is_ok() {
            let _ = wait.await;
        }

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(err) = worker.await {
                log::error!("Batch worker task failed: {}", err);
            }
            log::info!("Batched store shut down");
        }
        self.latch.check()
    }

    pub fn stats(&self) -> WorkerStatsSnapshot {
        self.stats.snapshot()
    }

    /// The first commit failure, if any.
    pub fn commit_error(&self) -> Option<EngineError> {
        self.latch.failure()
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Number of writes currently visible only through the overlay.
    pub fn pending_len(&self) -> usize {
        self.overlay.len()
    }

    pub fn live_entries(&self) -> usize {
        self.entries.live_entries()
    }

    pub fn buffer_stats(&self) -> BufferPoolStats {
        self.entries.buffers().stats()
    }

    fn validate_key(&self, key: &[u8]) -> Result<(), KvError> {
        if self.config.is_reserved_key(key) {
            return Err(KvError::InvalidKey);
        }
        Ok(())
    }

    /// Waits for (or, under [`Backpressure::Reject`], tries to take) a slot
    /// in the worker queue. Dropping the slot unused gives it back.
    async fn reserve_slot(&self) -> Result<Permit<'_, WorkerCommand>, KvError> {
        match self.config.backpressure {
            Backpressure::Block => self.queue.reserve().await.map_err(|_| KvError::Closed),
            Backpressure::Reject => self.queue.try_reserve().map_err(|err| match err {
                TrySendError::Full(()) => KvError::TooManyRequests,
                TrySendError::Closed(()) => KvError::Closed,
            }),
        }
    }
}

#[async_trait]
impl<E: DurableEngine, S: OverlayStore> KeyValueStore for BatchedStore<E, S> {
    async fn set_entry(&self, key: &[u8], value: &[u8], expires_at: u64) -> Result<(), KvError> {
        BatchedStore::set_entry(self, key, value, expires_at).await
    }

    async fn revert_set(&self, key: &[u8]) -> Result<(), KvError> {
        BatchedStore::revert_set(self, key).await
    }

    fn has_value(&self, key: &[u8]) -> Result<(), KvError> {
        BatchedStore::has_value(self, key)
    }

    fn get_value(
        &self,
        key: &[u8],
        consume: &mut dyn FnMut(&[u8]) -> Result<(), KvError>,
    ) -> Result<(), KvError> {
        BatchedStore::get_value(self, key, |value| consume(value))
    }
}
