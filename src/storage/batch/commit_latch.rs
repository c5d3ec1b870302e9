use std::sync::{Arc, OnceLock};

use crate::common::exception::{EngineError, KvError};

/// Sticky record of the first failed commit.
///
/// Once tripped, every subsequent write is refused with the recorded error
/// for the lifetime of the store. Later failures are ignored.
#[derive(Debug, Clone, Default)]
pub struct CommitLatch {
    failure: Arc<OnceLock<EngineError>>,
}

impl CommitLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `err` unless an earlier failure is already recorded.
    /// Returns true if this call tripped the latch.
    pub fn trip(&self, err: EngineError) -> bool {
        self.failure.set(err).is_ok()
    }

    pub fn check(&self) -> Result<(), KvError> {
        match self.failure.get() {
            Some(err) => Err(KvError::CommitFailed(err.clone())),
            None => Ok(()),
        }
    }

    pub fn failure(&self) -> Option<EngineError> {
        self.failure.get().cloned()
    }

    pub fn is_tripped(&self) -> bool {
        self.failure.get().is_some()
    }
}
