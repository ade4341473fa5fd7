//! Secret holders with automatic zeroization

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Passphrase supplied in response to a `NeedPassphrase` event -
/// automatically zeroed when dropped
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Passphrase {
    value: String,
}

impl Passphrase {
    /// Create a new passphrase
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// Get the secret value (use carefully)
    pub fn expose(&self) -> &str {
        &self.value
    }
}

impl From<&str> for Passphrase {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Passphrase {
    fn from(value: String) -> Self {
        Self { value }
    }
}

impl Clone for Passphrase {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
        }
    }
}

impl std::fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Passphrase")
            .field("value", &"[REDACTED]")
            .finish()
    }
}

/// Opaque private-key or secret-key material - automatically zeroed when
/// dropped
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecretMaterial {
    bytes: Vec<u8>,
}

impl SecretMaterial {
    /// Create from raw bytes
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// Get the raw bytes (use carefully - avoid copying)
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Length of the material in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if the material is empty
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl Clone for SecretMaterial {
    fn clone(&self) -> Self {
        Self {
            bytes: self.bytes.clone(),
        }
    }
}

impl PartialEq for SecretMaterial {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for SecretMaterial {}

impl std::fmt::Debug for SecretMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretMaterial")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}
