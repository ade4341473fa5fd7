//! Credential object model shared by stores and providers
//!
//! Five object families live in stores:
//! 1. Identity bundles (certificate chain + private key)
//! 2. Certificates
//! 3. Revocation lists
//! 4. PGP secret keys
//! 5. PGP public keys

mod certificate;
mod identity;
mod pgp;
mod secret;

pub use certificate::{Certificate, Crl};
pub use identity::IdentityBundle;
pub use pgp::PgpKey;
pub use secret::{Passphrase, SecretMaterial};

use serde::{Deserialize, Serialize};

/// The kind of object an entry holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Certificate chain plus private key
    IdentityBundle,
    /// An X.509 certificate
    Certificate,
    /// A certificate revocation list
    RevocationList,
    /// A PGP key with secret material
    PgpSecretKey,
    /// A PGP key without secret material
    PgpPublicKey,
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            EntryKind::IdentityBundle => "identity_bundle",
            EntryKind::Certificate => "certificate",
            EntryKind::RevocationList => "revocation_list",
            EntryKind::PgpSecretKey => "pgp_secret_key",
            EntryKind::PgpPublicKey => "pgp_public_key",
        };
        write!(f, "{}", label)
    }
}

/// A credential object of any kind, as carried by store entries
#[derive(Debug, Clone)]
pub enum CredentialObject {
    /// An identity bundle
    Identity(IdentityBundle),
    /// A certificate
    Certificate(Certificate),
    /// A revocation list
    Revocation(Crl),
    /// A PGP key carrying secret material
    PgpSecret(PgpKey),
    /// A public-only PGP key
    PgpPublic(PgpKey),
}

impl CredentialObject {
    /// The entry kind this object maps to
    pub fn kind(&self) -> EntryKind {
        match self {
            CredentialObject::Identity(_) => EntryKind::IdentityBundle,
            CredentialObject::Certificate(_) => EntryKind::Certificate,
            CredentialObject::Revocation(_) => EntryKind::RevocationList,
            CredentialObject::PgpSecret(_) => EntryKind::PgpSecretKey,
            CredentialObject::PgpPublic(_) => EntryKind::PgpPublicKey,
        }
    }

    /// Wrap a PGP key, picking the secret or public kind from its material
    pub fn from_pgp_key(key: PgpKey) -> Self {
        if key.is_secret() {
            CredentialObject::PgpSecret(key)
        } else {
            CredentialObject::PgpPublic(key)
        }
    }
}
