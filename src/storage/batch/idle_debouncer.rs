//! # Idle Debouncer
//!
//! Decides when an open transaction has been quiet long enough to commit.
//!
//! ```text
//!   worker loop (Active)
//!        │
//!        ├── entry received ───► on_activity()   quiet_ticks = 0
//!        │
//!        └── ticker fired ─────► on_tick()
//!                                   │
//!                      quiet_ticks += 1
//!                                   │
//!                   quiet_ticks >= threshold ?
//!                     │ no                │ yes
//!                     ▼                   ▼
//!                 NoFlush             IdleFlush
//! ```
//!
//! ## Why three ticks
//!
//! The ticker is only polled while a transaction is open, and missed ticks
//! are skipped rather than replayed, so an idle period leaves exactly one
//! stale tick behind:
//!
//! | Tick | Arrives                                  |
//! |------|------------------------------------------|
//! | 1st  | immediately (stale)                      |
//! | 2nd  | after the rest of the current period     |
//! | 3rd  | one full period later                    |
//!
//! With the default threshold of 3 an entry waits roughly one to three tick
//! periods before its transaction is committed, while bursts faster than the
//! tick period keep coalescing into the same transaction.

use std::time::Duration;

use tokio::time::{Interval, MissedTickBehavior, interval};

/// Result of a ticker event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushDecision {
    /// Keep the transaction open.
    NoFlush,
    /// The transaction has been idle long enough.
    IdleFlush,
}

/// Counts consecutive quiet ticks
#[derive(Debug)]
pub struct IdleDebouncer {
    threshold: u32,
    quiet_ticks: u32,
}

impl IdleDebouncer {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            quiet_ticks: 0,
        }
    }

    /// Records a ticker event with no new entry since the previous one.
    pub fn on_tick(&mut self) -> FlushDecision {
        self.quiet_ticks += 1;
        if self.quiet_ticks < self.threshold {
            FlushDecision::NoFlush
        } else {
            FlushDecision::IdleFlush
        }
    }

    /// Any worker event other than a quiet tick restarts the count.
    pub fn on_activity(&mut self) {
        self.quiet_ticks = 0;
    }

    pub fn quiet_ticks(&self) -> u32 {
        self.quiet_ticks
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}

/// Builds the low-resolution ticker polled by the worker.
pub fn idle_ticker(period: Duration) -> Interval {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}
