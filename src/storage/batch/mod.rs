//! Write coalescing: the worker that owns the open transaction, its idle
//! debounce, the commit failure latch and the counters it keeps.

pub mod batch_worker;
pub mod commit_latch;
pub mod idle_debouncer;
pub mod stats;

pub use batch_worker::{BatchWorker, WorkerCommand};
pub use commit_latch::CommitLatch;
pub use idle_debouncer::{FlushDecision, IdleDebouncer};
pub use stats::{WorkerStats, WorkerStatsSnapshot};
