//! Sealed metadata documents.
//!
//! Every persisted metadata document is wrapped in a JSON envelope:
//! - `sealed`: AEAD ciphertext of the canonical document plus a keyed tag
//! - `legacy`: the plaintext document plus a keyed tag (migration input only)
//!
//! The tag always covers the canonical plaintext, so legacy documents are
//! tamper-checked too. Any decryption or tag failure is an integrity error.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use phantomvault_common::{Error, Result};
use phantomvault_crypto::encoding::base64_bytes;
use phantomvault_crypto::{compute_tag, decrypt, encrypt, verify_tag, StoreKeys};
use phantomvault_storage::DocumentStore;

/// Envelope format version.
pub const ENVELOPE_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "lowercase")]
enum Envelope {
    Sealed {
        version: u32,
        #[serde(with = "base64_bytes")]
        payload: Vec<u8>,
        #[serde(with = "base64_bytes")]
        tag: Vec<u8>,
    },
    Legacy {
        version: u32,
        document: serde_json::Value,
        #[serde(with = "base64_bytes")]
        tag: Vec<u8>,
    },
}

/// Canonical JSON form of a document: object keys sorted, no whitespace.
pub fn canonical_json<T: Serialize>(document: &T) -> Result<Vec<u8>> {
    let value = serde_json::to_value(document)?;
    Ok(serde_json::to_vec(&value)?)
}

/// Seal a document for storage.
pub fn seal<T: Serialize>(document: &T, keys: &StoreKeys) -> Result<Vec<u8>> {
    let plaintext = canonical_json(document)?;
    let tag = compute_tag(&keys.tag, &plaintext)?;
    let payload = encrypt(keys.encryption.as_bytes(), &plaintext)?;
    Ok(serde_json::to_vec_pretty(&Envelope::Sealed {
        version: ENVELOPE_VERSION,
        payload,
        tag,
    })?)
}

/// Write a document in the legacy unencrypted format.
///
/// Only produced by older installations; kept so migration can be tested.
pub fn seal_legacy<T: Serialize>(document: &T, keys: &StoreKeys) -> Result<Vec<u8>> {
    let value = serde_json::to_value(document)?;
    let tag = compute_tag(&keys.tag, &serde_json::to_vec(&value)?)?;
    Ok(serde_json::to_vec_pretty(&Envelope::Legacy {
        version: ENVELOPE_VERSION,
        document: value,
        tag,
    })?)
}

/// A document read back from storage.
#[derive(Debug)]
pub struct Opened<T> {
    pub document: T,
    /// True if the document was in the legacy format and should be resealed.
    pub needs_migration: bool,
}

fn integrity(message: &str) -> Error {
    Error::Integrity(message.to_string())
}

/// Open a sealed or legacy envelope.
///
/// # Errors
/// - Integrity error if the envelope is unreadable, cannot be decrypted
///   with these keys, or its tag does not match
pub fn open<T: DeserializeOwned>(bytes: &[u8], keys: &StoreKeys) -> Result<Opened<T>> {
    let envelope: Envelope =
        serde_json::from_slice(bytes).map_err(|_| integrity("Unreadable document envelope"))?;

    let (plaintext, needs_migration) = match envelope {
        Envelope::Sealed {
            version,
            payload,
            tag,
        } => {
            if version != ENVELOPE_VERSION {
                return Err(integrity("Unsupported document version"));
            }
            let plaintext = decrypt(keys.encryption.as_bytes(), &payload)
                .map_err(|_| integrity("Document could not be decrypted"))?;
            if !verify_tag(&keys.tag, &plaintext, &tag) {
                return Err(integrity("Document tag mismatch"));
            }
            (plaintext, false)
        }
        Envelope::Legacy {
            version,
            document,
            tag,
        } => {
            if version != ENVELOPE_VERSION {
                return Err(integrity("Unsupported document version"));
            }
            let plaintext = serde_json::to_vec(&document)?;
            if !verify_tag(&keys.tag, &plaintext, &tag) {
                return Err(integrity("Legacy document tag mismatch"));
            }
            (plaintext, true)
        }
    };

    let document = serde_json::from_slice(&plaintext)
        .map_err(|e| Error::Integrity(format!("Document structure invalid: {}", e)))?;
    Ok(Opened {
        document,
        needs_migration,
    })
}

/// One sealed document at a fixed path.
pub struct SealedFile {
    store: Arc<dyn DocumentStore>,
    path: PathBuf,
    keys: StoreKeys,
}

impl SealedFile {
    /// Bind a document path to keys scoped to `document_name`.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        path: impl Into<PathBuf>,
        root_keys: &StoreKeys,
        document_name: &str,
    ) -> Self {
        Self {
            store,
            path: path.into(),
            keys: root_keys.for_document(document_name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document, or `None` if it has never been written.
    ///
    /// Legacy documents are resealed immediately.
    ///
    /// # Errors
    /// - Integrity error on decryption or tag failure
    /// - I/O errors
    pub async fn load<T: DeserializeOwned + Serialize>(&self) -> Result<Option<T>> {
        if !self.store.exists(&self.path).await? {
            return Ok(None);
        }
        let bytes = self.store.read(&self.path).await?;
        let opened: Opened<T> = open(&bytes, &self.keys)?;

        if opened.needs_migration {
            match self.save(&opened.document).await {
                Ok(()) => info!(path = %self.path.display(), "Migrated legacy document"),
                Err(e) => warn!(path = %self.path.display(), error = %e, "Legacy document migration failed"),
            }
        }
        Ok(Some(opened.document))
    }

    /// Seal and write the document.
    pub async fn save<T: Serialize>(&self, document: &T) -> Result<()> {
        let bytes = seal(document, &self.keys)?;
        self.store.write(&self.path, bytes).await
    }

    /// Delete the document if it exists.
    pub async fn delete(&self) -> Result<()> {
        if self.store.exists(&self.path).await? {
            self.store.delete(&self.path).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phantomvault_crypto::keys::KEY_LENGTH;
    use phantomvault_storage::MemoryDocumentStore;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        count: u32,
    }

    fn sample() -> Sample {
        Sample {
            name: "vault".to_string(),
            count: 3,
        }
    }

    fn keys(byte: u8) -> StoreKeys {
        StoreKeys::from_material(&[byte; KEY_LENGTH * 2])
    }

    #[test]
    fn test_sealed_hides_plaintext() {
        let bytes = seal(&sample(), &keys(1)).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.contains("\"sealed\""));
        assert!(!text.contains("vault"));

        let opened: Opened<Sample> = open(&bytes, &keys(1)).unwrap();
        assert_eq!(opened.document, sample());
        assert!(!opened.needs_migration);
    }

    #[test]
    fn test_wrong_keys_is_integrity_error() {
        let bytes = seal(&sample(), &keys(1)).unwrap();
        assert!(matches!(
            open::<Sample>(&bytes, &keys(2)),
            Err(Error::Integrity(_))
        ));
    }

    #[test]
    fn test_legacy_document_verified_and_flagged() {
        let bytes = seal_legacy(&sample(), &keys(1)).unwrap();
        let opened: Opened<Sample> = open(&bytes, &keys(1)).unwrap();
        assert_eq!(opened.document, sample());
        assert!(opened.needs_migration);
    }

    #[test]
    fn test_tampered_legacy_document_rejected() {
        let bytes = seal_legacy(&sample(), &keys(1)).unwrap();
        let tampered = String::from_utf8(bytes).unwrap().replace("\"count\": 3", "\"count\": 4");
        assert!(matches!(
            open::<Sample>(tampered.as_bytes(), &keys(1)),
            Err(Error::Integrity(_))
        ));
    }

    #[test]
    fn test_garbage_is_integrity_error() {
        assert!(matches!(
            open::<Sample>(b"not json", &keys(1)),
            Err(Error::Integrity(_))
        ));
    }

    #[tokio::test]
    async fn test_sealed_file_migrates_legacy() {
        let store = MemoryDocumentStore::new();
        let root = keys(7);
        let file = SealedFile::new(Arc::new(store.clone()), "/data/doc", &root, "doc");

        let legacy = seal_legacy(&sample(), &root.for_document("doc")).unwrap();
        store.overwrite_raw(Path::new("/data/doc"), legacy).unwrap();

        let loaded: Sample = file.load().await.unwrap().unwrap();
        assert_eq!(loaded, sample());

        let raw = String::from_utf8(store.read(Path::new("/data/doc")).await.unwrap()).unwrap();
        assert!(raw.contains("\"sealed\""));
    }

    #[tokio::test]
    async fn test_sealed_file_missing_is_none() {
        let file = SealedFile::new(Arc::new(MemoryDocumentStore::new()), "/x", &keys(1), "x");
        let loaded: Option<Sample> = file.load().await.unwrap();
        assert!(loaded.is_none());
    }
}
