use std::sync::atomic::{AtomicU64, Ordering};

/// Counters maintained by the batch worker and its commit tasks
#[derive(Debug, Default)]
pub struct WorkerStats {
    pub transactions_opened: AtomicU64,
    pub commits_succeeded: AtomicU64,
    pub commits_failed: AtomicU64,
    /// Transactions committed early because the next write did not fit.
    pub capacity_splits: AtomicU64,
    /// Transactions committed by the idle debouncer.
    pub idle_flushes: AtomicU64,
    pub entries_applied: AtomicU64,
    /// Entries the open transaction refused even after a split.
    pub entries_dropped: AtomicU64,
}

/// Point-in-time copy of [`WorkerStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStatsSnapshot {
    pub transactions_opened: u64,
    pub commits_succeeded: u64,
    pub commits_failed: u64,
    pub capacity_splits: u64,
    pub idle_flushes: u64,
    pub entries_applied: u64,
    pub entries_dropped: u64,
}

impl WorkerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            transactions_opened: self.transactions_opened.load(Ordering::Relaxed),
            commits_succeeded: self.commits_succeeded.load(Ordering::Relaxed),
            commits_failed: self.commits_failed.load(Ordering::Relaxed),
            capacity_splits: self.capacity_splits.load(Ordering::Relaxed),
            idle_flushes: self.idle_flushes.load(Ordering::Relaxed),
            entries_applied: self.entries_applied.load(Ordering::Relaxed),
            entries_dropped: self.entries_dropped.load(Ordering::Relaxed),
        }
    }
}

impl WorkerStatsSnapshot {
    /// Transactions whose commit has completed, either way.
    pub fn commits_completed(&self) -> u64 {
        self.commits_succeeded + self.commits_failed
    }

    pub fn commits_in_flight(&self) -> u64 {
        self.transactions_opened
            .saturating_sub(self.commits_completed())
    }
}
