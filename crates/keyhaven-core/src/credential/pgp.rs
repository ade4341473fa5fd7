//! PGP keys - public halves and full secret keys

use super::secret::SecretMaterial;

/// A PGP key. Every key carries its public half; a secret key additionally
/// carries the secret material.
#[derive(Debug, Clone)]
pub struct PgpKey {
    /// Long key id, hex encoded
    pub key_id: String,

    /// Primary user id (name and email)
    pub user_id: String,

    /// Serialized public key packet data
    pub public_material: Vec<u8>,

    /// Secret key packet data, present only for secret keys
    pub secret_material: Option<SecretMaterial>,
}

impl PgpKey {
    /// Create a public-only key
    pub fn public(
        key_id: impl Into<String>,
        user_id: impl Into<String>,
        public_material: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            key_id: key_id.into(),
            user_id: user_id.into(),
            public_material: public_material.into(),
            secret_material: None,
        }
    }

    /// Create a secret key
    pub fn secret(
        key_id: impl Into<String>,
        user_id: impl Into<String>,
        public_material: impl Into<Vec<u8>>,
        secret_material: SecretMaterial,
    ) -> Self {
        Self {
            key_id: key_id.into(),
            user_id: user_id.into(),
            public_material: public_material.into(),
            secret_material: Some(secret_material),
        }
    }

    /// Whether this key carries secret material
    pub fn is_secret(&self) -> bool {
        self.secret_material.is_some()
    }

    /// The public half of this key, with any secret material stripped
    pub fn public_part(&self) -> PgpKey {
        PgpKey {
            key_id: self.key_id.clone(),
            user_id: self.user_id.clone(),
            public_material: self.public_material.clone(),
            secret_material: None,
        }
    }

    /// Merge an imported key with the same key id into this one.
    ///
    /// Importing a secret key over a public-only key upgrades the entry;
    /// importing a public key over a secret key refreshes the public
    /// packets but keeps the secret material.
    pub fn merged_with(&self, incoming: &PgpKey) -> PgpKey {
        if incoming.is_secret() {
            incoming.clone()
        } else {
            PgpKey {
                key_id: self.key_id.clone(),
                user_id: incoming.user_id.clone(),
                public_material: incoming.public_material.clone(),
                secret_material: self.secret_material.clone(),
            }
        }
    }
}
