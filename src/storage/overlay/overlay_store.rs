use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use crate::common::exception::OverlayError;

/// One change in an atomic overlay update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayMutation<'a> {
    /// Insert `value` under `key` unless a record already exists.
    InsertIfAbsent { key: &'a [u8], value: &'a [u8] },
    /// Remove the record under `key`, if any.
    Remove { key: &'a [u8] },
    /// Remove the record under `key` only while it still holds `value`.
    RemoveIfEqual { key: &'a [u8], value: &'a [u8] },
}

/// A trait defining the ephemeral store backing the overlay.
///
/// Durability is irrelevant; only atomicity of [`OverlayStore::apply`] matters.
pub trait OverlayStore: Send + Sync + 'static {
    /// Applies all mutations as one atomic group.
    /// Returns, per mutation, whether it changed the store.
    fn apply(&self, mutations: &[OverlayMutation<'_>]) -> Result<Vec<bool>, OverlayError>;

    /// Calls `visit` with the value stored under `key`.
    /// Returns false without calling `visit` if the key is absent.
    fn view(&self, key: &[u8], visit: &mut dyn FnMut(&[u8])) -> Result<bool, OverlayError>;

    /// Removes every record.
    fn clear(&self) -> Result<(), OverlayError>;

    /// Returns the current number of records.
    fn len(&self) -> usize;

    /// Returns true if the store holds no records.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Hash map overlay guarded by a reader-writer lock
#[derive(Debug, Default)]
pub struct MemoryOverlay {
    records: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
    fail_writes: AtomicBool,
}

impl MemoryOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `apply` fail. Used to exercise error paths.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl OverlayStore for MemoryOverlay {
    fn apply(&self, mutations: &[OverlayMutation<'_>]) -> Result<Vec<bool>, OverlayError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(OverlayError::Storage("overlay writes disabled".to_string()));
        }

        let mut records = self.records.write();
        let applied = mutations
            .iter()
            .map(|mutation| match *mutation {
                OverlayMutation::InsertIfAbsent { key, value } => {
                    if records.contains_key(key) {
                        false
                    } else {
                        records.insert(key.to_vec(), value.to_vec());
                        true
                    }
                }
                OverlayMutation::Remove { key } => records.remove(key).is_some(),
                OverlayMutation::RemoveIfEqual { key, value } => {
                    if records.get(key).is_some_and(|held| held.as_slice() == value) {
                        records.remove(key);
                        true
                    } else {
                        false
                    }
                }
            })
            .collect();
        Ok(applied)
    }

    fn view(&self, key: &[u8], visit: &mut dyn FnMut(&[u8])) -> Result<bool, OverlayError> {
        let records = self.records.read();
        match records.get(key) {
            Some(value) => {
                visit(value);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn clear(&self) -> Result<(), OverlayError> {
        self.records.write().clear();
        Ok(())
    }

    fn len(&self) -> usize {
        self.records.read().len()
    }
}
