use std::sync::Once;

use env_logger::Builder;
use log::LevelFilter;

use crate::storage::batch::batch_worker;
use crate::storage::engine::memory_engine;
use crate::storage::overlay::overlay_coordinator;
use crate::store::batched_store;

static INIT: Once = Once::new();

/// Per-module levels applied before `RUST_LOG`.
///
/// Commit outcomes are logged by the batch worker and store lifecycle by the
/// batched store. The in-memory engine logs every commit at debug level.
pub fn default_filters() -> [(&'static str, LevelFilter); 4] {
    [
        (batched_store::LOG_TARGET, LevelFilter::Info),
        (batch_worker::LOG_TARGET, LevelFilter::Info),
        (overlay_coordinator::LOG_TARGET, LevelFilter::Warn),
        (memory_engine::LOG_TARGET, LevelFilter::Warn),
    ]
}

pub fn initialize_logger() {
    // Use call_once_force to recover if an earlier initialization attempt panicked.
    INIT.call_once_force(|_| {
        let mut builder = Builder::new();
        builder.filter_level(LevelFilter::Warn);
        for (target, level) in default_filters() {
            builder.filter_module(target, level);
        }
        builder.format_timestamp_millis().parse_default_env();

        // Avoid panicking if the logger was already initialized elsewhere.
        let _ = builder.try_init();
    });
}
