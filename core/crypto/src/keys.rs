//! Key types with secure memory handling.
//!
//! All key types automatically zeroize their memory on drop to prevent
//! sensitive data from persisting in memory.

use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::encoding::{from_base64, to_base64};

/// Length of encryption keys in bytes (256-bit).
pub const KEY_LENGTH: usize = 32;

/// Length of salts in bytes.
pub const SALT_LENGTH: usize = 16;

/// Symmetric key for AEAD and MAC operations.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    key: [u8; KEY_LENGTH],
}

impl EncryptionKey {
    /// Create a key from raw bytes.
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Get the key bytes.
    ///
    /// # Security
    /// The returned slice should be used immediately and not stored.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }

    /// Derive a purpose-bound subkey.
    ///
    /// Uses blake2b so that the same root never keys two different primitives.
    pub fn derive_subkey(&self, purpose: &[u8]) -> EncryptionKey {
        use blake2::digest::consts::U32;
        use blake2::{Blake2b, Digest};

        let mut hasher = Blake2b::<U32>::new();
        hasher.update(self.key);
        hasher.update(purpose);
        hasher.update(b"phantomvault-subkey");

        let result = hasher.finalize();
        let mut derived = [0u8; KEY_LENGTH];
        derived.copy_from_slice(&result);
        EncryptionKey::from_bytes(derived)
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptionKey([REDACTED])")
    }
}

/// Key pair protecting one persisted metadata document.
///
/// `encryption` seals the document, `tag` keys the plaintext integrity tag.
#[derive(Clone, Debug)]
pub struct StoreKeys {
    pub encryption: EncryptionKey,
    pub tag: EncryptionKey,
}

impl StoreKeys {
    /// Split 64 bytes of derived material into the two keys.
    pub fn from_material(material: &[u8; KEY_LENGTH * 2]) -> Self {
        let mut enc = [0u8; KEY_LENGTH];
        let mut tag = [0u8; KEY_LENGTH];
        enc.copy_from_slice(&material[..KEY_LENGTH]);
        tag.copy_from_slice(&material[KEY_LENGTH..]);
        Self {
            encryption: EncryptionKey::from_bytes(enc),
            tag: EncryptionKey::from_bytes(tag),
        }
    }

    /// Keys scoped to a single document, so two documents never share keys.
    pub fn for_document(&self, document: &str) -> Self {
        Self {
            encryption: self.encryption.derive_subkey(document.as_bytes()),
            tag: self.tag.derive_subkey(document.as_bytes()),
        }
    }
}

/// Salt for key derivation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Salt(pub [u8; SALT_LENGTH]);

impl Salt {
    /// Generate a random salt.
    pub fn generate() -> Self {
        let mut salt = [0u8; SALT_LENGTH];
        rand::thread_rng().fill_bytes(&mut salt);
        Self(salt)
    }

    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; SALT_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Get the salt bytes.
    pub fn as_bytes(&self) -> &[u8; SALT_LENGTH] {
        &self.0
    }
}

impl Serialize for Salt {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&to_base64(&self.0))
    }
}

impl<'de> Deserialize<'de> for Salt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let bytes = from_base64(&encoded).map_err(serde::de::Error::custom)?;
        let array: [u8; SALT_LENGTH] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("salt has wrong length"))?;
        Ok(Salt(array))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subkeys_are_purpose_bound() {
        let root = EncryptionKey::from_bytes([7u8; KEY_LENGTH]);
        let a1 = root.derive_subkey(b"credentials");
        let a2 = root.derive_subkey(b"credentials");
        let b = root.derive_subkey(b"registry");

        assert_eq!(a1.as_bytes(), a2.as_bytes());
        assert_ne!(a1.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_store_keys_split_material() {
        let mut material = [0u8; KEY_LENGTH * 2];
        material[..KEY_LENGTH].fill(1);
        material[KEY_LENGTH..].fill(2);
        let keys = StoreKeys::from_material(&material);

        assert_eq!(keys.encryption.as_bytes(), &[1u8; KEY_LENGTH]);
        assert_eq!(keys.tag.as_bytes(), &[2u8; KEY_LENGTH]);
    }

    #[test]
    fn test_salt_generate() {
        let salt1 = Salt::generate();
        let salt2 = Salt::generate();

        // Random salts should be different
        assert_ne!(salt1.as_bytes(), salt2.as_bytes());
    }

    #[test]
    fn test_salt_serde() {
        let salt = Salt::from_bytes([9u8; SALT_LENGTH]);
        let json = serde_json::to_string(&salt).unwrap();
        let back: Salt = serde_json::from_str(&json).unwrap();
        assert_eq!(back, salt);
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = EncryptionKey::from_bytes([3u8; KEY_LENGTH]);
        assert_eq!(format!("{:?}", key), "EncryptionKey([REDACTED])");
    }
}
