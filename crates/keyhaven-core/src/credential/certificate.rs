//! Certificates and revocation lists

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Serde helper for DER payloads - stored as base64 in JSON
mod base64_bytes {
    use base64::{engine::general_purpose, Engine as _};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        general_purpose::STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}

/// An X.509 certificate with its parsed summary fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    /// Subject distinguished name
    pub subject: String,

    /// Issuer distinguished name
    pub issuer: String,

    /// Start of the validity period
    pub not_before: DateTime<Utc>,

    /// End of the validity period
    pub not_after: DateTime<Utc>,

    /// Raw DER encoding
    #[serde(with = "base64_bytes")]
    pub der: Vec<u8>,
}

impl Certificate {
    /// Create a new certificate
    pub fn new(
        subject: impl Into<String>,
        issuer: impl Into<String>,
        not_before: DateTime<Utc>,
        not_after: DateTime<Utc>,
        der: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            subject: subject.into(),
            issuer: issuer.into(),
            not_before,
            not_after,
            der: der.into(),
        }
    }

    /// SHA-256 fingerprint of the DER encoding, hex encoded
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(&self.der);
        hex::encode(digest)
    }

    /// Check whether subject and issuer name match
    pub fn is_self_signed(&self) -> bool {
        self.subject == self.issuer
    }

    /// Check whether the certificate is valid at the given instant
    pub fn is_valid_at(&self, when: DateTime<Utc>) -> bool {
        when >= self.not_before && when <= self.not_after
    }
}

/// A certificate revocation list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crl {
    /// Issuer distinguished name
    pub issuer: String,

    /// When this list was published
    pub this_update: DateTime<Utc>,

    /// When the next list is expected, if announced
    pub next_update: Option<DateTime<Utc>>,

    /// Raw DER encoding
    #[serde(with = "base64_bytes")]
    pub der: Vec<u8>,
}

impl Crl {
    /// Create a new revocation list
    pub fn new(
        issuer: impl Into<String>,
        this_update: DateTime<Utc>,
        next_update: Option<DateTime<Utc>>,
        der: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            this_update,
            next_update,
            der: der.into(),
        }
    }

    /// SHA-256 fingerprint of the DER encoding, hex encoded
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(&self.der);
        hex::encode(digest)
    }
}
