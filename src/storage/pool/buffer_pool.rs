//! Byte buffer recycling for entry keys and values
//!
//! Every request copies its key and value out of the caller's slices. Under
//! load that is two allocations per write; the pool keeps released buffers
//! around so steady-state writes reuse capacity instead.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

/// Pool of reusable byte buffers
#[derive(Debug)]
pub struct BufferPool {
    free: Mutex<Vec<Vec<u8>>>,
    max_retained: usize,
    allocated: AtomicUsize,
    reused: AtomicUsize,
}

/// Point-in-time view of pool activity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPoolStats {
    pub allocated: usize,
    pub reused: usize,
    pub retained: usize,
}

impl BufferPool {
    pub fn new(max_retained: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            max_retained,
            allocated: AtomicUsize::new(0),
            reused: AtomicUsize::new(0),
        }
    }

    /// Returns an empty buffer with at least `len` bytes of capacity.
    pub fn take(&self, len: usize) -> Vec<u8> {
        let recycled = self.free.lock().pop();
        match recycled {
            Some(mut buf) => {
                self.reused.fetch_add(1, Ordering::Relaxed);
                buf.reserve(len);
                buf
            }
            None => {
                self.allocated.fetch_add(1, Ordering::Relaxed);
                Vec::with_capacity(len)
            }
        }
    }

    /// Copies `data` into a pooled buffer.
    pub fn copy_from(&self, data: &[u8]) -> Vec<u8> {
        let mut buf = self.take(data.len());
        buf.extend_from_slice(data);
        buf
    }

    /// Zeroes `buf` and keeps it for reuse, or drops it when the pool is full.
    pub fn put(&self, mut buf: Vec<u8>) {
        if buf.capacity() == 0 {
            return;
        }
        buf.fill(0);
        buf.clear();

        let mut free = self.free.lock();
        if free.len() < self.max_retained {
            free.push(buf);
        }
    }

    pub fn retained(&self) -> usize {
        self.free.lock().len()
    }

    pub fn stats(&self) -> BufferPoolStats {
        BufferPoolStats {
            allocated: self.allocated.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            retained: self.retained(),
        }
    }
}
