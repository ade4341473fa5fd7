//! Error types for the provider seam

use thiserror::Error;

/// Result type alias for provider operations
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Errors a backend provider can report to the core.
///
/// These never reach application code directly: the keystore layer maps
/// them to soft failures (empty lists, `false` returns), events
/// (`NeedPassphrase`, `Unavailable`) and diagnostic text.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("store is locked and requires a passphrase")]
    Locked,

    #[error("store is no longer present")]
    Gone,

    #[error("entry not found: {0}")]
    EntryNotFound(String),

    #[error("object kind not accepted by this store")]
    Unsupported,

    #[error("backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
