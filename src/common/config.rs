use std::time::Duration;

/** Maximum number of transactions that may be mid-commit at the same time. */
pub const DEFAULT_MAX_CONCURRENT_COMMITS: usize = 1 << 7;

/** Maximum number of entries waiting in the worker queue. */
pub const DEFAULT_QUEUE_CAPACITY: usize = 1 << 10;

/** Period of the low-resolution idle ticker polled by the worker. */
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_millis(1);

/** Consecutive empty ticks before an open transaction is flushed. */
pub const DEFAULT_IDLE_TICKS: u32 = 3;

/** Keys under this prefix collide with the durable engine's own namespace. */
pub const DEFAULT_RESERVED_PREFIX: &[u8] = b"!badger!";

/** Upper bound on idle byte buffers kept by the buffer pool. */
pub const DEFAULT_MAX_RETAINED_BUFFERS: usize = 4096;

/** Hard ceiling on commit slots; the worker waits for all of them at once on flush. */
pub const MAX_CONCURRENT_COMMITS_LIMIT: usize = 1 << 20;

/// What a writer experiences when the worker queue is saturated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backpressure {
    /// Block the caller until the worker drains a slot.
    #[default]
    Block,
    /// Fail the write with `TooManyRequests` instead of waiting.
    Reject,
}

/// Tuning knobs for the batching pipeline
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub max_concurrent_commits: usize,
    pub queue_capacity: usize,
    pub tick_period: Duration,
    pub idle_ticks: u32,
    pub reserved_prefix: Vec<u8>,
    pub backpressure: Backpressure,
    pub max_retained_buffers: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_commits: DEFAULT_MAX_CONCURRENT_COMMITS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            tick_period: DEFAULT_TICK_PERIOD,
            idle_ticks: DEFAULT_IDLE_TICKS,
            reserved_prefix: DEFAULT_RESERVED_PREFIX.to_vec(),
            backpressure: Backpressure::Block,
            max_retained_buffers: DEFAULT_MAX_RETAINED_BUFFERS,
        }
    }
}

impl BatchConfig {
    /// Small queue and few commit slots so tests hit the limits quickly.
    pub fn for_testing() -> Self {
        Self {
            max_concurrent_commits: 4,
            queue_capacity: 16,
            tick_period: Duration::from_millis(1),
            idle_ticks: DEFAULT_IDLE_TICKS,
            reserved_prefix: DEFAULT_RESERVED_PREFIX.to_vec(),
            backpressure: Backpressure::Block,
            max_retained_buffers: 64,
        }
    }

    /// Returns true if `key` is empty or lives in the reserved namespace.
    pub fn is_reserved_key(&self, key: &[u8]) -> bool {
        key.is_empty() || key.starts_with(&self.reserved_prefix)
    }

    /// Clamps values that would stall the pipeline (zero permits, zero queue).
    pub(crate) fn sanitized(mut self) -> Self {
        self.max_concurrent_commits = self
            .max_concurrent_commits
            .clamp(1, MAX_CONCURRENT_COMMITS_LIMIT);
        self.queue_capacity = self.queue_capacity.max(1);
        self.idle_ticks = self.idle_ticks.max(1);
        if self.tick_period.is_zero() {
            self.tick_period = DEFAULT_TICK_PERIOD;
        }
        self
    }
}
