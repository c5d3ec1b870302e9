//! # Overlay
//!
//! Read-your-writes visibility for writes that have not been committed yet.
//!
//! - **`overlay_store`**: the [`OverlayStore`] collaborator trait and the in-memory [`MemoryOverlay`].
//! - **`overlay_coordinator`**: atomic install/evict/lookup on top of a store.

pub mod overlay_coordinator;
pub mod overlay_store;

pub use overlay_coordinator::{InstallOutcome, OverlayCoordinator};
pub use overlay_store::{MemoryOverlay, OverlayMutation, OverlayStore};
