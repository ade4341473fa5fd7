//! # keyhaven-core
//!
//! Uniform access to heterogeneous credential stores:
//! - One entry/store/manager model over trust databases, identity
//!   vaults, smart cards and PGP keyrings
//! - Continuous discovery with availability events over tokio broadcast
//!   channels
//! - Soft failure surface (empty lists, `false` returns) with diagnostics,
//!   never panics for expected conditions
//! - Passphrase unlock handshake with zeroize-on-drop secrets

pub mod credential;
pub mod error;
pub mod keystore;
pub mod provider;

pub use credential::{
    Certificate, CredentialObject, Crl, EntryKind, IdentityBundle, Passphrase, PgpKey,
    SecretMaterial,
};
pub use error::{ProviderError, ProviderResult};
pub use keystore::{
    DiagnosticLog, KeyStore, KeyStoreManager, ManagerConfig, ManagerEvent, StoreEntry,
    StoreEvent, StoreKind,
};
pub use provider::{
    FileCacheProvider, MemoryProvider, ProviderEvent, RawEntry, StoreDescriptor, StoreProvider,
    UnlockOutcome,
};
