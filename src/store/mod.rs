//! # Store
//!
//! - **`batched_store`**: [`BatchedStore`], the write-coalescing façade.
//! - **`key_value_store`**: the [`KeyValueStore`] trait it implements.

pub mod batched_store;
pub mod key_value_store;

pub use batched_store::BatchedStore;
pub use key_value_store::KeyValueStore;
