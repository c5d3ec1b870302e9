pub mod batch;
pub mod engine;
pub mod overlay;
pub mod pool;
