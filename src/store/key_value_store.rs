use async_trait::async_trait;

use crate::common::exception::KvError;

/// Single-key write and read surface of a batched store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Accepts a put. The value is readable immediately; durability follows
    /// once the transaction holding it commits.
    async fn set_entry(&self, key: &[u8], value: &[u8], expires_at: u64) -> Result<(), KvError>;

    /// Withdraws a pending put and deletes the key from durable storage.
    async fn revert_set(&self, key: &[u8]) -> Result<(), KvError>;

    fn has_value(&self, key: &[u8]) -> Result<(), KvError>;

    fn get_value(
        &self,
        key: &[u8],
        consume: &mut dyn FnMut(&[u8]) -> Result<(), KvError>,
    ) -> Result<(), KvError>;
}
