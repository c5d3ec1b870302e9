//! # Batch Worker
//!
//! The single task that owns the open durable transaction. Writers never
//! touch the engine; they hand entries to this task through a bounded queue
//! and the worker coalesces them into as few transactions as possible.
//!
//! ```text
//!              ┌──────────── Apply(entry) ────────────┐
//!              │                                      ▼
//!          ┌───────┐   acquire commit permit    ┌──────────┐
//!          │ Idle  │ ─────────────────────────► │  Active  │ ◄─┐ Apply(entry)
//!          └───────┘                            └──────────┘ ──┘ (same txn)
//!              ▲                                   │   │
//!              │   3rd quiet tick / Flush          │   │ TransactionTooLarge
//!              └───────────── dispatch_commit ◄────┘   │
//!                                                      ▼
//!                             dispatch_commit(current), open next, retry once
//! ```
//!
//! Committing never blocks the loop: the transaction, its pending batch and
//! its commit permit move into a spawned task. When that task finishes it
//! trips the [`CommitLatch`] on failure, evicts the batch from the overlay in
//! one atomic update, frees every entry, and finally returns the permit.
//!
//! At most `max_concurrent_commits` transactions exist at once: the open one
//! plus those being committed. When all permits are taken the worker waits
//! before opening the next transaction, and writers feel it through the
//! queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc, oneshot};
use tokio::task::JoinHandle;

use super::commit_latch::CommitLatch;
use super::idle_debouncer::{FlushDecision, IdleDebouncer, idle_ticker};
use super::stats::WorkerStats;
use crate::common::config::BatchConfig;
use crate::common::exception::EngineError;
use crate::storage::engine::{DurableEngine, DurableTransaction};
use crate::storage::overlay::{OverlayCoordinator, OverlayStore};
use crate::storage::pool::{BatchPool, Entry, PendingBatch};

pub(crate) const LOG_TARGET: &str = module_path!();

/// Messages accepted by the worker queue
#[derive(Debug)]
pub enum WorkerCommand {
    /// Write (or delete, for an empty value) one entry.
    Apply(Entry),
    /// Commit the open transaction and wait until every commit has finished.
    Flush(oneshot::Sender<()>),
    /// Like `Flush`, then stop the worker.
    Shutdown(oneshot::Sender<()>),
}

enum WorkerEvent {
    Command(WorkerCommand),
    IdleTimeout,
    Closed,
}

impl From<Option<WorkerCommand>> for WorkerEvent {
    fn from(command: Option<WorkerCommand>) -> Self {
        match command {
            Some(command) => WorkerEvent::Command(command),
            None => WorkerEvent::Closed,
        }
    }
}

/// The open transaction together with everything that must travel with it
/// into its commit task.
struct ActiveTxn<T> {
    txn: T,
    batch: PendingBatch,
    permit: OwnedSemaphorePermit,
}

/// Owns the Idle/Active state machine
pub struct BatchWorker<E: DurableEngine, S: OverlayStore> {
    engine: Arc<E>,
    overlay: OverlayCoordinator<S>,
    batches: BatchPool,
    permits: Arc<Semaphore>,
    max_permits: u32,
    latch: CommitLatch,
    stats: Arc<WorkerStats>,
    tick_period: Duration,
    idle_ticks: u32,
}

impl<E: DurableEngine, S: OverlayStore> BatchWorker<E, S> {
    /// Creates a worker. `config` is expected to be sanitized already.
    pub fn new(
        engine: Arc<E>,
        overlay: OverlayCoordinator<S>,
        latch: CommitLatch,
        stats: Arc<WorkerStats>,
        config: &BatchConfig,
    ) -> Self {
        let max_permits = u32::try_from(config.max_concurrent_commits).unwrap_or(u32::MAX);
        Self {
            engine,
            overlay,
            batches: BatchPool::new(),
            permits: Arc::new(Semaphore::new(max_permits as usize)),
            max_permits,
            latch,
            stats,
            tick_period: config.tick_period,
            idle_ticks: config.idle_ticks,
        }
    }

    /// Spawns the worker loop onto the current tokio runtime.
    pub fn spawn(self, queue: mpsc::Receiver<WorkerCommand>) -> JoinHandle<()> {
        tokio::spawn(self.run(queue))
    }

    async fn run(self, mut queue: mpsc::Receiver<WorkerCommand>) {
        log::info!(
            "Batch worker started ({} commit slots, {:?} tick, {} idle ticks)",
            self.max_permits,
            self.tick_period,
            self.idle_ticks
        );

        let mut ticker = idle_ticker(self.tick_period);
        let mut debouncer = IdleDebouncer::new(self.idle_ticks);
        let mut active: Option<ActiveTxn<E::Transaction>> = None;

        loop {
            // The ticker only matters while a transaction is open.
            let event = if active.is_some() {
                tokio::select! {
                    command = queue.recv() => WorkerEvent::from(command),
                    _ = ticker.tick() => match debouncer.on_tick() {
                        FlushDecision::NoFlush => continue,
                        FlushDecision::IdleFlush => WorkerEvent::IdleTimeout,
                    },
                }
            } else {
                WorkerEvent::from(queue.recv().await)
            };
            debouncer.on_activity();

            match event {
                WorkerEvent::IdleTimeout => {
                    if let Some(current) = active.take() {
                        WorkerStats::bump(&self.stats.idle_flushes);
                        log::trace!("Idle flush of {} entries", current.batch.len());
                        self.dispatch_commit(current);
                    }
                }
                WorkerEvent::Command(WorkerCommand::Apply(entry)) => {
                    self.apply(&mut active, entry).await;
                }
                WorkerEvent::Command(WorkerCommand::Flush(done)) => {
                    self.flush(&mut active).await;
                    let _ = done.send(());
                }
                WorkerEvent::Command(WorkerCommand::Shutdown(done)) => {
                    self.flush(&mut active).await;
                    let _ = done.send(());
                    break;
                }
                WorkerEvent::Closed => {
                    log::debug!("Batch worker queue closed");
                    self.flush(&mut active).await;
                    break;
                }
            }
        }

        self.discard_late_commands(&mut queue);
        log::info!("Batch worker stopped");
    }

    /// Writes `entry` into the open transaction, opening one if needed.
    ///
    /// A write the transaction cannot take commits the transaction as it is,
    /// opens a fresh one and retries exactly once. A second refusal drops the
    /// entry; it is still linked so its overlay record goes away with the batch.
    async fn apply(&self, active: &mut Option<ActiveTxn<E::Transaction>>, entry: Entry) {
        let mut current = match active.take() {
            Some(current) => current,
            None => match self.open().await {
                Some(current) => current,
                None => {
                    self.abandon(entry);
                    return;
                }
            },
        };

        let outcome = match write_entry(&mut current.txn, &entry) {
            Err(EngineError::TransactionTooLarge) => {
                WorkerStats::bump(&self.stats.capacity_splits);
                log::debug!(
                    "Transaction full after {} writes, committing and retrying",
                    current.txn.len()
                );
                self.dispatch_commit(current);
                current = match self.open().await {
                    Some(next) => next,
                    None => {
                        self.abandon(entry);
                        return;
                    }
                };
                write_entry(&mut current.txn, &entry)
            }
            other => other,
        };

        match outcome {
            Ok(()) => WorkerStats::bump(&self.stats.entries_applied),
            Err(err) => {
                WorkerStats::bump(&self.stats.entries_dropped);
                log::warn!(
                    "Dropping write for key {:?}: {}",
                    String::from_utf8_lossy(entry.key()),
                    err
                );
            }
        }

        // Delete markers have nothing in the overlay to evict.
        if !entry.is_delete() {
            current.batch.link(entry);
        }
        *active = Some(current);
    }

    /// Waits for a commit permit, then opens a transaction with an empty batch.
    async fn open(&self) -> Option<ActiveTxn<E::Transaction>> {
        let permit = match Arc::clone(&self.permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                log::error!("Failed to acquire commit permit - semaphore closed");
                return None;
            }
        };
        WorkerStats::bump(&self.stats.transactions_opened);
        Some(ActiveTxn {
            txn: self.engine.begin(),
            batch: self.batches.new_batch(),
            permit,
        })
    }

    /// Moves `current` into its own task and commits it there.
    fn dispatch_commit(&self, current: ActiveTxn<E::Transaction>) {
        let ActiveTxn { txn, batch, permit } = current;
        let overlay = self.overlay.clone();
        let latch = self.latch.clone();
        let stats = Arc::clone(&self.stats);
        let writes = txn.len();

        tokio::spawn(async move {
            match txn.commit().await {
                Ok(()) => {
                    WorkerStats::bump(&stats.commits_succeeded);
                    log::trace!("Committed {} writes", writes);
                }
                Err(err) => {
                    WorkerStats::bump(&stats.commits_failed);
                    log::error!("Commit of {} writes failed: {}", writes, err);
                    if latch.trip(err) {
                        log::error!("Writes are disabled after the first commit failure");
                    }
                }
            }
            overlay.evict_batch(&batch);
            batch.drain_and_free();
            drop(permit);
        });
    }

    /// Commits the open transaction, if any, and waits for every commit task.
    async fn flush(&self, active: &mut Option<ActiveTxn<E::Transaction>>) {
        if let Some(current) = active.take() {
            self.dispatch_commit(current);
        }
        match self.permits.acquire_many(self.max_permits).await {
            Ok(all) => drop(all),
            Err(_) => log::error!("Failed to drain commit permits - semaphore closed"),
        }
    }

    /// Removes the overlay record of an entry that will never be committed.
    fn abandon(&self, entry: Entry) {
        WorkerStats::bump(&self.stats.entries_dropped);
        if !entry.is_delete() {
            self.overlay.evict_entry(&entry);
        }
        entry.free();
    }

    /// Handles whatever raced into the queue after the loop stopped.
    fn discard_late_commands(&self, queue: &mut mpsc::Receiver<WorkerCommand>) {
        queue.close();
        let mut discarded = 0usize;
        while let Ok(command) = queue.try_recv() {
            match command {
                WorkerCommand::Apply(entry) => {
                    discarded += 1;
                    self.abandon(entry);
                }
                WorkerCommand::Flush(done) | WorkerCommand::Shutdown(done) => {
                    let _ = done.send(());
                }
            }
        }
        if discarded > 0 {
            log::warn!("Discarded {} writes submitted after shutdown", discarded);
        }
    }
}

fn write_entry<T: DurableTransaction>(txn: &mut T, entry: &Entry) -> Result<(), EngineError> {
    if entry.is_delete() {
        txn.delete(entry.key())
    } else {
        txn.set_entry(entry.key(), entry.value(), entry.expires_at())
    }
}
