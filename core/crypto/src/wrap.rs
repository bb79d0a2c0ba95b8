//! Secrets encrypted under a password.
//!
//! Used to keep the recovery key redisplayable after authentication and to
//! let a recovery key unwrap the password it was issued with.

use serde::{Deserialize, Serialize};

use crate::aead::{decrypt, encrypt};
use crate::encoding::base64_bytes;
use crate::kdf::{derive_key, KdfParams};
use crate::keys::Salt;
use phantomvault_common::{Error, Result, SensitiveBytes};

/// A secret sealed with a key derived from a password.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrappedSecret {
    salt: Salt,
    iterations: u32,
    #[serde(with = "base64_bytes")]
    ciphertext: Vec<u8>,
}

/// Encrypt `secret` under `password` with a fresh salt and nonce.
///
/// # Errors
/// - Returns error if password is empty
pub fn wrap_secret(secret: &[u8], password: &[u8], params: &KdfParams) -> Result<WrappedSecret> {
    let salt = Salt::generate();
    let key = derive_key(password, &salt, params)?;
    let ciphertext = encrypt(key.as_bytes(), secret)?;
    Ok(WrappedSecret {
        salt,
        iterations: params.iterations,
        ciphertext,
    })
}

/// Decrypt a wrapped secret.
///
/// # Errors
/// - Returns an authentication error if the password is wrong or the
///   ciphertext was modified
pub fn unwrap_secret(wrapped: &WrappedSecret, password: &[u8]) -> Result<SensitiveBytes> {
    let key = derive_key(password, &wrapped.salt, &KdfParams::new(wrapped.iterations))?;
    decrypt(key.as_bytes(), &wrapped.ciphertext)
        .map(SensitiveBytes::new)
        .map_err(|_| Error::Authentication("Secret could not be unwrapped".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_unwrap() {
        let params = KdfParams::new(1_000);
        let wrapped = wrap_secret(b"ABCD-0123-4567-89EF", b"master", &params).unwrap();
        let plain = unwrap_secret(&wrapped, b"master").unwrap();

        assert_eq!(plain.as_bytes(), b"ABCD-0123-4567-89EF");
    }

    #[test]
    fn test_wrong_password_is_authentication_error() {
        let params = KdfParams::new(1_000);
        let wrapped = wrap_secret(b"secret", b"master", &params).unwrap();

        match unwrap_secret(&wrapped, b"other") {
            Err(Error::Authentication(_)) => {}
            other => panic!("expected authentication error, got {:?}", other),
        }
    }

    #[test]
    fn test_wrapping_is_randomized() {
        let params = KdfParams::new(1_000);
        let a = wrap_secret(b"secret", b"master", &params).unwrap();
        let b = wrap_secret(b"secret", b"master", &params).unwrap();

        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_serialized_form_hides_secret() {
        let wrapped = wrap_secret(b"plain-secret", b"master", &KdfParams::new(1_000)).unwrap();
        let json = serde_json::to_string(&wrapped).unwrap();
        assert!(!json.contains("plain-secret"));
        let back: WrappedSecret = serde_json::from_str(&json).unwrap();
        assert!(unwrap_secret(&back, b"master").is_ok());
    }
}
