pub mod common;
pub mod storage;
pub mod store;

pub use common::config::{Backpressure, BatchConfig};
pub use common::exception::{EngineError, KvError, OverlayError};
pub use storage::engine::{DurableEngine, DurableTransaction, MemoryEngine, MemoryEngineOptions};
pub use storage::overlay::{MemoryOverlay, OverlayStore};
pub use store::{BatchedStore, KeyValueStore};
