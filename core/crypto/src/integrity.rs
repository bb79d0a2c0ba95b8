//! Keyed integrity tags over persisted metadata.
//!
//! Tags are BLAKE2b-256 MACs over the plaintext bytes of a document, so a
//! document stays tamper-checked even when it is stored unencrypted.

use blake2::digest::consts::U32;
use blake2::digest::{KeyInit, Mac};
use blake2::Blake2bMac;

use crate::keys::EncryptionKey;
use phantomvault_common::{Error, Result};

/// Length of an integrity tag in bytes.
pub const TAG_LENGTH: usize = 32;

type TagMac = Blake2bMac<U32>;

fn mac_for(key: &EncryptionKey) -> Result<TagMac> {
    <TagMac as KeyInit>::new_from_slice(key.as_bytes())
        .map_err(|e| Error::Crypto(format!("Invalid tag key: {}", e)))
}

/// Compute the integrity tag of `data`.
pub fn compute_tag(key: &EncryptionKey, data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = mac_for(key)?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Check `tag` against `data` in constant time.
pub fn verify_tag(key: &EncryptionKey, data: &[u8], tag: &[u8]) -> bool {
    match mac_for(key) {
        Ok(mut mac) => {
            mac.update(data);
            mac.verify_slice(tag).is_ok()
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KEY_LENGTH;

    #[test]
    fn test_tag_roundtrip() {
        let key = EncryptionKey::from_bytes([5u8; KEY_LENGTH]);
        let tag = compute_tag(&key, b"document").unwrap();

        assert_eq!(tag.len(), TAG_LENGTH);
        assert!(verify_tag(&key, b"document", &tag));
    }

    #[test]
    fn test_tag_detects_modified_data() {
        let key = EncryptionKey::from_bytes([5u8; KEY_LENGTH]);
        let tag = compute_tag(&key, b"document").unwrap();

        assert!(!verify_tag(&key, b"documenT", &tag));
    }

    #[test]
    fn test_tag_is_keyed() {
        let key1 = EncryptionKey::from_bytes([5u8; KEY_LENGTH]);
        let key2 = EncryptionKey::from_bytes([6u8; KEY_LENGTH]);
        let tag = compute_tag(&key1, b"document").unwrap();

        assert!(!verify_tag(&key2, b"document", &tag));
    }

    #[test]
    fn test_truncated_tag_rejected() {
        let key = EncryptionKey::from_bytes([5u8; KEY_LENGTH]);
        let tag = compute_tag(&key, b"document").unwrap();

        assert!(!verify_tag(&key, b"document", &tag[..16]));
    }
}
