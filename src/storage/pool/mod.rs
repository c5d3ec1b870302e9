//! # Pools
//!
//! Allocation-churn control for the write path.
//!
//! - **`buffer_pool`**: recycles the byte buffers holding entry keys and values.
//! - **`entry`**: reference-counted request records built from pooled buffers.
//! - **`pending_batch`**: the per-transaction list of entries, with recycled node storage.

pub mod buffer_pool;
pub mod entry;
pub mod pending_batch;

pub use buffer_pool::{BufferPool, BufferPoolStats};
pub use entry::{Entry, EntryPool, VacantEntry};
pub use pending_batch::{BatchPool, PendingBatch};
