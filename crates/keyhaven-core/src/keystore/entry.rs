//! Entries - value snapshots of single credential objects

use crate::credential::{Certificate, CredentialObject, Crl, EntryKind, IdentityBundle, PgpKey};
use crate::provider::RawEntry;

#[derive(Debug, Clone)]
struct EntryInner {
    id: String,
    name: String,
    object: CredentialObject,
}

/// A snapshot of one object in a store.
///
/// Entries are plain values: they are created when a store is queried and
/// never observe later backend changes. The default entry is null and
/// every accessor on it degrades benignly (empty strings, `None`).
#[derive(Debug, Clone, Default)]
pub struct StoreEntry {
    inner: Option<EntryInner>,
}

impl StoreEntry {
    /// The null entry, carrying no object
    pub fn null() -> Self {
        Self { inner: None }
    }

    pub(crate) fn from_raw(raw: RawEntry) -> Self {
        Self {
            inner: Some(EntryInner {
                id: raw.id,
                name: raw.name,
                object: raw.object,
            }),
        }
    }

    /// Whether this entry carries no object
    pub fn is_null(&self) -> bool {
        self.inner.is_none()
    }

    /// The kind of object held, `None` for the null entry
    pub fn kind(&self) -> Option<EntryKind> {
        self.inner.as_ref().map(|inner| inner.object.kind())
    }

    /// Identifier, stable across enumerations of the same store instance.
    /// Empty for the null entry.
    pub fn id(&self) -> &str {
        self.inner.as_ref().map(|inner| inner.id.as_str()).unwrap_or("")
    }

    /// Human readable name, empty for the null entry
    pub fn name(&self) -> &str {
        self.inner
            .as_ref()
            .map(|inner| inner.name.as_str())
            .unwrap_or("")
    }

    /// The identity bundle, if this is an identity entry
    pub fn identity_bundle(&self) -> Option<&IdentityBundle> {
        match self.inner.as_ref().map(|inner| &inner.object) {
            Some(CredentialObject::Identity(bundle)) => Some(bundle),
            _ => None,
        }
    }

    /// The certificate, if this is a certificate entry
    pub fn certificate(&self) -> Option<&Certificate> {
        match self.inner.as_ref().map(|inner| &inner.object) {
            Some(CredentialObject::Certificate(cert)) => Some(cert),
            _ => None,
        }
    }

    /// The revocation list, if this is a revocation list entry
    pub fn crl(&self) -> Option<&Crl> {
        match self.inner.as_ref().map(|inner| &inner.object) {
            Some(CredentialObject::Revocation(crl)) => Some(crl),
            _ => None,
        }
    }

    /// The PGP secret key, if this is a secret key entry
    pub fn pgp_secret_key(&self) -> Option<&PgpKey> {
        match self.inner.as_ref().map(|inner| &inner.object) {
            Some(CredentialObject::PgpSecret(key)) => Some(key),
            _ => None,
        }
    }

    /// The public half of the PGP key. Valid for public key entries and
    /// also for secret key entries, where the public half is derived from
    /// the same key.
    pub fn pgp_public_key(&self) -> Option<PgpKey> {
        match self.inner.as_ref().map(|inner| &inner.object) {
            Some(CredentialObject::PgpPublic(key)) => Some(key.clone()),
            Some(CredentialObject::PgpSecret(key)) => Some(key.public_part()),
            _ => None,
        }
    }
}
