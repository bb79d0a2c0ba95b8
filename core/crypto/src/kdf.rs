//! Password hashing and key derivation using PBKDF2-HMAC-SHA512.

use serde::{Deserialize, Serialize};
use sha2::Sha512;
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::encoding::base64_bytes;
use crate::keys::{EncryptionKey, Salt, KEY_LENGTH};
use phantomvault_common::{Error, Result};

/// Length of a stored password digest in bytes.
pub const HASH_LENGTH: usize = 64;

/// Iteration count used for every stored hash and wrapped secret.
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// Parameters for PBKDF2 derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Number of HMAC-SHA512 iterations.
    pub iterations: u32,
}

impl KdfParams {
    /// Create parameters with an explicit iteration count.
    pub fn new(iterations: u32) -> Self {
        Self { iterations }
    }

    /// Production parameters: 100 000 iterations.
    pub fn standard() -> Self {
        Self::new(DEFAULT_ITERATIONS)
    }

    /// Reduced cost for constrained devices and test suites.
    pub fn moderate() -> Self {
        Self::new(10_000)
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::standard()
    }
}

/// Run PBKDF2-HMAC-SHA512 into `out`.
///
/// # Errors
/// - Returns error if the iteration count is zero
pub fn pbkdf2_sha512(password: &[u8], salt: &[u8], iterations: u32, out: &mut [u8]) -> Result<()> {
    if iterations == 0 {
        return Err(Error::Crypto("Iteration count must be positive".to_string()));
    }
    pbkdf2::pbkdf2_hmac::<Sha512>(password, salt, iterations, out);
    Ok(())
}

/// Derive a 256-bit encryption key from a password and salt.
///
/// # Errors
/// - Returns error if password is empty
pub fn derive_key(password: &[u8], salt: &Salt, params: &KdfParams) -> Result<EncryptionKey> {
    if password.is_empty() {
        return Err(Error::Validation("Password cannot be empty".to_string()));
    }

    let mut key_bytes = [0u8; KEY_LENGTH];
    pbkdf2_sha512(password, salt.as_bytes(), params.iterations, &mut key_bytes)?;
    Ok(EncryptionKey::from_bytes(key_bytes))
}

/// Salted PBKDF2-HMAC-SHA512 digest of a password or recovery key.
///
/// Never stores the secret itself. Comparison is constant-time.
#[derive(Clone, Serialize, Deserialize)]
pub struct PasswordHash {
    salt: Salt,
    iterations: u32,
    #[serde(with = "base64_bytes")]
    digest: Vec<u8>,
}

impl PasswordHash {
    /// Hash `secret` under a fresh random salt.
    ///
    /// # Errors
    /// - Returns error if secret is empty
    pub fn compute(secret: &[u8], params: &KdfParams) -> Result<Self> {
        if secret.is_empty() {
            return Err(Error::Validation("Password cannot be empty".to_string()));
        }
        let salt = Salt::generate();
        let digest = Self::digest(secret, &salt, params.iterations)?;
        Ok(Self {
            salt,
            iterations: params.iterations,
            digest: digest.to_vec(),
        })
    }

    /// Recompute with the stored salt and compare in constant time.
    pub fn verify(&self, secret: &[u8]) -> bool {
        if secret.is_empty() || self.digest.len() != HASH_LENGTH {
            return false;
        }
        match Self::digest(secret, &self.salt, self.iterations) {
            Ok(candidate) => candidate.as_slice().ct_eq(self.digest.as_slice()).into(),
            Err(_) => false,
        }
    }

    /// Iteration count this hash was produced with.
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    fn digest(secret: &[u8], salt: &Salt, iterations: u32) -> Result<Zeroizing<[u8; HASH_LENGTH]>> {
        let mut out = Zeroizing::new([0u8; HASH_LENGTH]);
        pbkdf2_sha512(secret, salt.as_bytes(), iterations, &mut out[..])?;
        Ok(out)
    }
}

impl fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PasswordHash([REDACTED]; {} iterations)", self.iterations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_derive_key_deterministic() {
        let password = b"test-password-123";
        let salt = Salt::from_bytes([42u8; 16]);
        let params = KdfParams::moderate();

        let key1 = derive_key(password, &salt, &params).unwrap();
        let key2 = derive_key(password, &salt, &params).unwrap();

        assert_eq!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_derive_key_different_salt() {
        let password = b"test-password-123";
        let params = KdfParams::moderate();

        let key1 = derive_key(password, &Salt::from_bytes([1u8; 16]), &params).unwrap();
        let key2 = derive_key(password, &Salt::from_bytes([2u8; 16]), &params).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_derive_key_empty_password_fails() {
        let salt = Salt::generate();
        assert!(derive_key(b"", &salt, &KdfParams::moderate()).is_err());
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let mut out = [0u8; 8];
        assert!(pbkdf2_sha512(b"pw", b"salt", 0, &mut out).is_err());
    }

    #[test]
    fn test_hash_verify() {
        let hash = PasswordHash::compute(b"secure-password", &KdfParams::moderate()).unwrap();
        assert!(hash.verify(b"secure-password"));
        assert!(!hash.verify(b"wrong-password"));
        assert!(!hash.verify(b""));
    }

    #[test]
    fn test_hash_uses_fresh_salt() {
        let params = KdfParams::new(1_000);
        let a = PasswordHash::compute(b"same", &params).unwrap();
        let b = PasswordHash::compute(b"same", &params).unwrap();
        assert_ne!(a.salt, b.salt);
        assert!(a.verify(b"same") && b.verify(b"same"));
    }

    #[test]
    fn test_hash_survives_serialization() {
        let hash = PasswordHash::compute(b"persisted", &KdfParams::new(1_000)).unwrap();
        let json = serde_json::to_string(&hash).unwrap();
        assert!(!json.contains("persisted"));
        let restored: PasswordHash = serde_json::from_str(&json).unwrap();
        assert!(restored.verify(b"persisted"));
        assert_eq!(restored.iterations(), 1_000);
    }

    #[test]
    fn test_standard_iterations() {
        assert_eq!(KdfParams::standard().iterations, 100_000);
        assert_eq!(KdfParams::default(), KdfParams::standard());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_hash_accepts_only_original(
            secret in "[a-zA-Z0-9]{1,24}",
            other in "[a-zA-Z0-9]{1,24}",
        ) {
            let hash = PasswordHash::compute(secret.as_bytes(), &KdfParams::new(10)).unwrap();
            prop_assert!(hash.verify(secret.as_bytes()));
            prop_assert_eq!(hash.verify(other.as_bytes()), secret == other);
        }
    }
}
