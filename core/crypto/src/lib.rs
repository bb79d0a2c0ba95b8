//! Cryptographic primitives for PhantomVault.
//!
//! This module provides:
//! - Password hashing and key derivation using PBKDF2-HMAC-SHA512
//! - Authenticated encryption using XChaCha20-Poly1305
//! - Keyed BLAKE2b integrity tags for persisted metadata
//! - Machine-bound store keys
//! - Recovery keys and password-wrapped secrets
//! - Chunked encryption for file contents
//!
//! # Security Guarantees
//! - All key material is automatically zeroized on drop
//! - No plaintext or key material is ever logged
//! - Hash and tag comparisons are constant-time

pub mod aead;
pub mod encoding;
pub mod integrity;
pub mod kdf;
pub mod keys;
pub mod machine;
pub mod recovery;
pub mod stream;
pub mod wrap;

pub use aead::{decrypt, encrypt};
pub use integrity::{compute_tag, verify_tag};
pub use kdf::{derive_key, KdfParams, PasswordHash};
pub use keys::{EncryptionKey, Salt, StoreKeys};
pub use machine::MachineIdentity;
pub use recovery::RecoveryKey;
pub use stream::{decrypt_bytes, encrypt_bytes, DecryptingStream, EncryptingStream};
pub use wrap::{unwrap_secret, wrap_secret, WrappedSecret};
