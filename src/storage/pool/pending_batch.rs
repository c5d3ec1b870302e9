//! Pending batches
//!
//! A [`PendingBatch`] collects every entry applied to one open durable
//! transaction. It travels with the transaction into the commit task; once
//! the commit has finished, the batch supplies the keys to evict from the
//! overlay and is then drained, releasing each entry exactly once. The node
//! storage goes back to the [`BatchPool`] for the next transaction.

use std::sync::Arc;

use parking_lot::Mutex;

use super::entry::Entry;

/// Upper bound on recycled node vectors kept around.
const MAX_RETAINED_BATCHES: usize = 256;

/// Recycles the node storage of drained batches
#[derive(Debug, Clone, Default)]
pub struct BatchPool {
    free: Arc<Mutex<Vec<Vec<Entry>>>>,
}

impl BatchPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns an empty batch, reusing node storage when available.
    pub fn new_batch(&self) -> PendingBatch {
        let nodes = self.free.lock().pop().unwrap_or_default();
        PendingBatch {
            nodes,
            pool: self.clone(),
        }
    }

    pub fn retained(&self) -> usize {
        self.free.lock().len()
    }

    fn recycle(&self, nodes: Vec<Entry>) {
        debug_assert!(nodes.is_empty());
        if nodes.capacity() == 0 {
            return;
        }
        let mut free = self.free.lock();
        if free.len() < MAX_RETAINED_BATCHES {
            free.push(nodes);
        }
    }
}

/// The entries submitted against one open transaction
#[derive(Debug)]
pub struct PendingBatch {
    nodes: Vec<Entry>,
    pool: BatchPool,
}

impl PendingBatch {
    /// Appends an entry. The batch now owns that reference.
    pub fn link(&mut self, entry: Entry) {
        self.nodes.push(entry);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &[u8]> {
        self.nodes.iter().map(Entry::key)
    }

    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.nodes.iter()
    }

    /// Frees every entry once and hands the node storage back to the pool.
    pub fn drain_and_free(mut self) {
        self.release();
    }

    fn release(&mut self) {
        for entry in self.nodes.drain(..) {
            entry.free();
        }
        let nodes = std::mem::take(&mut self.nodes);
        self.pool.recycle(nodes);
    }
}

impl Drop for PendingBatch {
    fn drop(&mut self) {
        if self.nodes.capacity() > 0 {
            self.release();
        }
    }
}
