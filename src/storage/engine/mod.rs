//! # Durable Engine
//!
//! The transactional store behind the batching pipeline.
//!
//! - **`durable_engine`**: the [`DurableEngine`] and [`DurableTransaction`] collaborator traits.
//! - **`memory_engine`**: [`MemoryEngine`], an in-memory implementation with transaction size limits.

pub mod durable_engine;
pub mod memory_engine;

pub use durable_engine::{DurableEngine, DurableTransaction};
pub use memory_engine::{MemoryEngine, MemoryEngineOptions, MemoryTransaction};
