//! Store backends
//!
//! This module provides the backend seam and two software providers:
//! 1. In-memory (scriptable, for tests and demos)
//! 2. File-backed certificate cache (persistent)

mod file_cache;
mod memory;
mod traits;

pub use file_cache::FileCacheProvider;
pub use memory::MemoryProvider;
pub use traits::{ProviderEvent, RawEntry, StoreDescriptor, StoreProvider, UnlockOutcome};

use crate::credential::CredentialObject;

/// Canonical entry id for an object: content-addressed for certificates
/// and revocation lists, key id for PGP, leaf fingerprint for identities.
/// Writing the same object twice therefore lands on the same entry.
pub(crate) fn entry_id(object: &CredentialObject) -> String {
    match object {
        CredentialObject::Identity(bundle) => match bundle.leaf() {
            Some(leaf) => format!("identity:{}", leaf.fingerprint()),
            None => format!("identity:{}", bundle.name),
        },
        CredentialObject::Certificate(cert) => format!("cert:{}", cert.fingerprint()),
        CredentialObject::Revocation(crl) => format!("crl:{}", crl.fingerprint()),
        CredentialObject::PgpSecret(key) | CredentialObject::PgpPublic(key) => {
            format!("pgp:{}", key.key_id)
        }
    }
}

/// Display name an entry gets when the backend has nothing better
pub(crate) fn entry_name(object: &CredentialObject) -> String {
    match object {
        CredentialObject::Identity(bundle) => bundle.name.clone(),
        CredentialObject::Certificate(cert) => cert.subject.clone(),
        CredentialObject::Revocation(crl) => crl.issuer.clone(),
        CredentialObject::PgpSecret(key) | CredentialObject::PgpPublic(key) => {
            key.user_id.clone()
        }
    }
}
