use thiserror::Error;

/// Errors reported by a durable transactional engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Key not found")]
    KeyNotFound,
    #[error("Invalid key")]
    InvalidKey,
    /// The open transaction cannot take another operation; commit and retry.
    #[error("Transaction too large")]
    TransactionTooLarge,
    #[error("Commit failed: {0}")]
    CommitFailed(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Errors reported by the overlay store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OverlayError {
    #[error("Overlay storage error: {0}")]
    Storage(String),
}

/// Errors surfaced to callers of the store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KvError {
    #[error("TooManyRequests")]
    TooManyRequests,
    #[error("KeyNotFound")]
    KeyNotFound,
    #[error("KeyAlreadyExists")]
    KeyAlreadyExists,
    #[error("InvalidKey")]
    InvalidKey,
    #[error("InvalidData")]
    InvalidData,
    /// A previous commit failed; writes stay disabled for the lifetime of the store.
    #[error("Commit failed earlier, writes are disabled: {0}")]
    CommitFailed(EngineError),
    #[error("Store is closed")]
    Closed,
    #[error("Engine error: {0}")]
    Engine(EngineError),
    #[error(transparent)]
    Overlay(#[from] OverlayError),
}

impl From<EngineError> for KvError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::KeyNotFound => KvError::KeyNotFound,
            EngineError::InvalidKey => KvError::InvalidKey,
            other => KvError::Engine(other),
        }
    }
}
