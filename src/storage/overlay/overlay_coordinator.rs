//! # Overlay Coordinator
//!
//! Owns the ephemeral visibility store that bridges the gap between a write
//! being accepted and its transaction being committed.
//!
//! ```text
//!   set_entry ──► install(entry) ──► [ overlay ] ◄── lookup(key) ◄── get_value
//!                                        ▲
//!   commit completion ── evict_batch ────┘   (only records still holding the batch's values)
//!   revert_set ───────── evict_key ──────┘   (unconditional)
//! ```
//!
//! A key is present while its latest write is in flight to the durable
//! engine. Every batch is evicted in one atomic update so a reader never
//! sees half of a committed batch still pending. Batch eviction is
//! conditional on the record still holding the committed value: a key that
//! was reverted and rewritten after the batch was dispatched keeps its newer
//! record until that write commits in turn.
//!
//! Lookups copy the value into a pooled buffer and release the store before
//! the caller's closure runs.
//!
//! Store failures on evict and lookup are logged and otherwise swallowed. A
//! failed install is reported as [`InstallOutcome::Failed`] so the write is
//! refused instead of silently losing visibility.

use std::sync::Arc;

use log::warn;

use super::overlay_store::{OverlayMutation, OverlayStore};
use crate::common::exception::OverlayError;
use crate::storage::pool::{BufferPool, Entry, PendingBatch};

pub(crate) const LOG_TARGET: &str = module_path!();

/// Idle lookup buffers kept for reuse.
const LOOKUP_BUFFERS: usize = 64;

/// Result of trying to publish a pending write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed,
    /// A pending record for the key already exists.
    Conflict,
    /// The overlay store rejected the update.
    Failed(OverlayError),
}

#[derive(Debug)]
pub struct OverlayCoordinator<S> {
    store: Arc<S>,
    buffers: Arc<BufferPool>,
}

impl<S> Clone for OverlayCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            buffers: Arc::clone(&self.buffers),
        }
    }
}

impl<S: OverlayStore> OverlayCoordinator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            buffers: Arc::new(BufferPool::new(LOOKUP_BUFFERS)),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Publishes `entry` unless a pending record for its key exists.
    pub fn install(&self, entry: &Entry) -> InstallOutcome {
        let mutation = OverlayMutation::InsertIfAbsent {
            key: entry.key(),
            value: entry.value(),
        };
        match self.store.apply(&[mutation]) {
            Ok(applied) if applied.first().copied().unwrap_or(false) => InstallOutcome::Installed,
            Ok(_) => InstallOutcome::Conflict,
            Err(err) => {
                warn!("Overlay install failed: {}", err);
                InstallOutcome::Failed(err)
            }
        }
    }

    /// Removes the record for `key`. Absent keys are ignored.
    pub fn evict_key(&self, key: &[u8]) {
        if let Err(err) = self.store.apply(&[OverlayMutation::Remove { key }]) {
            warn!("Overlay eviction of a single key failed: {}", err);
        }
    }

    /// Removes the record of `entry` unless a newer write replaced it.
    pub fn evict_entry(&self, entry: &Entry) {
        let mutation = OverlayMutation::RemoveIfEqual {
            key: entry.key(),
            value: entry.value(),
        };
        if let Err(err) = self.store.apply(&[mutation]) {
            warn!("Overlay eviction of a single entry failed: {}", err);
        }
    }

    /// Removes, in one atomic update, the record of every entry in `batch`
    /// that still holds that entry's value.
    pub fn evict_batch(&self, batch: &PendingBatch) {
        if batch.is_empty() {
            return;
        }
        let mutations: Vec<OverlayMutation<'_>> = batch
            .entries()
            .map(|entry| OverlayMutation::RemoveIfEqual {
                key: entry.key(),
                value: entry.value(),
            })
            .collect();
        if let Err(err) = self.store.apply(&mutations) {
            warn!(
                "Overlay eviction of {} keys failed: {}",
                mutations.len(),
                err
            );
        }
    }

    /// Calls `consume` with the pending value for `key`, if there is one.
    /// The store is no longer held when `consume` runs.
    pub fn lookup<R>(&self, key: &[u8], consume: impl FnOnce(&[u8]) -> R) -> Option<R> {
        let mut copy = None;
        let found = self
            .store
            .view(key, &mut |value| copy = Some(self.buffers.copy_from(value)));
        match found {
            Ok(true) => {}
            Ok(false) => return None,
            Err(err) => {
                warn!("Overlay lookup failed: {}", err);
                return None;
            }
        }

        let value = copy?;
        let result = consume(&value);
        self.buffers.put(value);
        Some(result)
    }

    /// Returns true if a non-empty pending value exists for `key`.
    pub fn holds_value(&self, key: &[u8]) -> bool {
        let mut non_empty = false;
        match self.store.view(key, &mut |value| non_empty = !value.is_empty()) {
            Ok(found) => found && non_empty,
            Err(err) => {
                warn!("Overlay lookup failed: {}", err);
                false
            }
        }
    }

    /// Wipes every record. Pending writes from a previous process are meaningless.
    pub fn reset(&self) {
        if let Err(err) = self.store.clear() {
            warn!("Overlay reset failed: {}", err);
        }
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}
