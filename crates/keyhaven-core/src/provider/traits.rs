//! Provider trait definitions

use crate::credential::{CredentialObject, Passphrase};
use crate::error::ProviderResult;
use crate::keystore::StoreKind;
use async_trait::async_trait;
use tokio::sync::broadcast;

/// A store as reported by a provider during discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreDescriptor {
    /// Stable identifier, unique within the provider
    pub id: String,

    /// Human readable name
    pub name: String,

    /// What class of store this is
    pub kind: StoreKind,

    /// Whether writes and removals are refused
    pub read_only: bool,
}

/// An entry as held by a provider, before it is wrapped for applications
#[derive(Debug, Clone)]
pub struct RawEntry {
    /// Identifier, stable across enumerations of the same store
    pub id: String,

    /// Human readable name
    pub name: String,

    /// The credential object itself
    pub object: CredentialObject,
}

/// Result of presenting a passphrase to a locked store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockOutcome {
    /// The store accepted the passphrase and is now readable
    Unlocked,
    /// The passphrase was wrong, another attempt may be made
    NeedsRetry,
    /// Too many failures, the store withdrew itself
    LockedOut,
}

/// Change pushed by a provider that watches its backend
#[derive(Debug, Clone)]
pub enum ProviderEvent {
    /// A store not seen before became available
    StoreAppeared {
        /// Identifier of the new store
        id: String,
    },
    /// A known store went away
    StoreGone {
        /// Identifier of the vanished store
        id: String,
    },
    /// The contents of a known store changed
    StoreChanged {
        /// Identifier of the changed store
        id: String,
    },
}

/// Trait for credential store backends.
///
/// A provider fronts one source of stores - a system trust database, a
/// smart card slot, a PGP keyring. The manager polls `discover` and routes
/// per-store operations here; results are reported as `ProviderResult` and
/// the keystore layer translates failures into events and soft returns.
#[async_trait]
pub trait StoreProvider: Send + Sync {
    /// Short name used in diagnostics
    fn name(&self) -> &str;

    /// Enumerate the stores currently reachable through this provider
    async fn discover(&self) -> ProviderResult<Vec<StoreDescriptor>>;

    /// List the entries of one store
    async fn enumerate(&self, store_id: &str) -> ProviderResult<Vec<RawEntry>>;

    /// Write an object into a store, returning the resulting entry
    async fn write(&self, store_id: &str, object: CredentialObject) -> ProviderResult<RawEntry>;

    /// Remove an entry from a store
    async fn remove(&self, store_id: &str, entry_id: &str) -> ProviderResult<()>;

    /// Present a passphrase to a locked store
    async fn unlock(&self, store_id: &str, passphrase: &Passphrase)
        -> ProviderResult<UnlockOutcome>;

    /// Subscribe to pushed change events, for providers that watch their
    /// backend. Polling-only providers return `None` (the default).
    fn events(&self) -> Option<broadcast::Receiver<ProviderEvent>> {
        None
    }
}
