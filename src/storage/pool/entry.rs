//! Reference-counted request records
//!
//! An [`Entry`] is one put or delete request travelling from the façade,
//! through the worker queue, into a pending batch. The façade, the queue and
//! the batch each hold a reference; the key and value buffers go back to the
//! [`BufferPool`] when the last reference is released.
//!
//! ```text
//!   EntryPool::alloc()         VacantEntry      (unshared, mutable)
//!          │ set / set_key
//!          ▼
//!   Entry (refs = 1) ── grab() ──► Entry (refs = 2) ── free() ──► refs = 1
//!                                                   ...
//!                                     last free() ──► buffers → BufferPool
//! ```
//!
//! Only a [`VacantEntry`] can be filled in, and filling it consumes it, so an
//! entry can never be rewritten while another holder still references it.

use std::fmt;
use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::buffer_pool::BufferPool;

/// Allocator for entries backed by a shared [`BufferPool`]
#[derive(Debug, Clone)]
pub struct EntryPool {
    inner: Arc<EntryPoolInner>,
}

#[derive(Debug)]
struct EntryPoolInner {
    buffers: Arc<BufferPool>,
    live: AtomicUsize,
}

impl EntryPool {
    pub fn new(buffers: Arc<BufferPool>) -> Self {
        Self {
            inner: Arc::new(EntryPoolInner {
                buffers,
                live: AtomicUsize::new(0),
            }),
        }
    }

    /// Returns a fresh, unshared entry shell.
    pub fn alloc(&self) -> VacantEntry {
        VacantEntry { pool: self.clone() }
    }

    /// Number of entries that still have at least one reference.
    pub fn live_entries(&self) -> usize {
        self.inner.live.load(Ordering::Acquire)
    }

    pub fn buffers(&self) -> &Arc<BufferPool> {
        &self.inner.buffers
    }

    fn copy_in(&self, data: &[u8]) -> Vec<u8> {
        if data.is_empty() {
            return Vec::new();
        }
        self.inner.buffers.copy_from(data)
    }
}

/// An entry shell that nobody else can see yet
#[derive(Debug)]
pub struct VacantEntry {
    pool: EntryPool,
}

impl VacantEntry {
    /// Fills in a put request. Both slices are copied into pooled buffers.
    pub fn set(self, key: &[u8], value: &[u8], expires_at: u64) -> Entry {
        let body = EntryBody {
            key: self.pool.copy_in(key),
            value: self.pool.copy_in(value),
            expires_at,
            pool: self.pool,
        };
        body.pool.inner.live.fetch_add(1, Ordering::AcqRel);
        Entry {
            body: Arc::new(body),
        }
    }

    /// Fills in a delete marker: a key with an empty value.
    pub fn set_key(self, key: &[u8]) -> Entry {
        self.set(key, &[], 0)
    }
}

struct EntryBody {
    key: Vec<u8>,
    value: Vec<u8>,
    expires_at: u64,
    pool: EntryPool,
}

impl Drop for EntryBody {
    fn drop(&mut self) {
        let buffers = &self.pool.inner.buffers;
        buffers.put(mem::take(&mut self.key));
        buffers.put(mem::take(&mut self.value));
        self.pool.inner.live.fetch_sub(1, Ordering::AcqRel);
    }
}

/// A shared handle to one put or delete request
pub struct Entry {
    body: Arc<EntryBody>,
}

impl Entry {
    pub fn key(&self) -> &[u8] {
        &self.body.key
    }

    pub fn value(&self) -> &[u8] {
        &self.body.value
    }

    pub fn expires_at(&self) -> u64 {
        self.body.expires_at
    }

    /// An empty value marks a delete (revert) request.
    pub fn is_delete(&self) -> bool {
        self.body.value.is_empty()
    }

    /// Takes another reference to the same entry.
    pub fn grab(&self) -> Entry {
        Entry {
            body: Arc::clone(&self.body),
        }
    }

    /// Releases this reference. The last release recycles the buffers.
    pub fn free(self) {
        drop(self);
    }

    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.body)
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("key", &String::from_utf8_lossy(self.key()))
            .field("value_len", &self.value().len())
            .field("expires_at", &self.expires_at())
            .field("refs", &self.ref_count())
            .finish()
    }
}
