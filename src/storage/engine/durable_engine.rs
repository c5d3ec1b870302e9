use std::future::Future;

use crate::common::exception::EngineError;

/// An open write transaction on the durable engine.
///
/// Writes are buffered in the transaction and become visible atomically when
/// [`DurableTransaction::commit`] resolves successfully.
pub trait DurableTransaction: Send + 'static {
    /// Upserts `key`. Fails with [`EngineError::TransactionTooLarge`] when the
    /// transaction cannot take this write; the write is then not recorded.
    fn set_entry(&mut self, key: &[u8], value: &[u8], expires_at: u64) -> Result<(), EngineError>;

    /// Deletes `key`. Same capacity rule as [`DurableTransaction::set_entry`].
    fn delete(&mut self, key: &[u8]) -> Result<(), EngineError>;

    /// Number of writes recorded so far.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Commits the transaction. The returned future owns everything it needs
    /// so it can be driven on a separate task.
    fn commit(self) -> impl Future<Output = Result<(), EngineError>> + Send + 'static;
}

/// A transactional key-value engine providing durable storage.
pub trait DurableEngine: Send + Sync + 'static {
    type Transaction: DurableTransaction;

    /// Opens a new write transaction.
    fn begin(&self) -> Self::Transaction;

    /// Succeeds if `key` exists, fails with [`EngineError::KeyNotFound`] otherwise.
    fn contains(&self, key: &[u8]) -> Result<(), EngineError>;

    /// Passes the value of `key` to `consume`. Implementations must not hold
    /// internal locks while `consume` runs.
    fn read<R>(&self, key: &[u8], consume: impl FnOnce(&[u8]) -> R) -> Result<R, EngineError>;
}
