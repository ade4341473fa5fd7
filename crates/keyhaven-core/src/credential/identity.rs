//! Private identities - a certificate chain paired with its private key

use super::certificate::Certificate;
use super::secret::SecretMaterial;

/// An identity: end-entity certificate chain plus the matching private key.
///
/// The private key half never serializes - bundles travel between a store
/// and the application only as live values.
#[derive(Debug, Clone)]
pub struct IdentityBundle {
    /// Human readable name for the identity
    pub name: String,

    /// Certificate chain, leaf first
    pub chain: Vec<Certificate>,

    /// Private key material matching the leaf certificate
    pub private_key: SecretMaterial,
}

impl IdentityBundle {
    /// Create a new identity bundle
    pub fn new(
        name: impl Into<String>,
        chain: Vec<Certificate>,
        private_key: SecretMaterial,
    ) -> Self {
        Self {
            name: name.into(),
            chain,
            private_key,
        }
    }

    /// The end-entity certificate, if the chain is non-empty
    pub fn leaf(&self) -> Option<&Certificate> {
        self.chain.first()
    }
}
