//! Machine-bound key material for metadata stores.
//!
//! Stores are sealed with keys derived from the host name, OS user,
//! platform and architecture. Copying a store to another machine or user
//! account makes it unreadable, which surfaces as an integrity error.

use zeroize::Zeroizing;

use crate::kdf::{pbkdf2_sha512, KdfParams};
use crate::keys::{StoreKeys, KEY_LENGTH};
use phantomvault_common::Result;

const STORE_SALT: &[u8] = b"phantomvault.store-key.v1";

/// Identifying material of the current machine and OS user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineIdentity {
    pub hostname: String,
    pub username: String,
    pub platform: String,
    pub arch: String,
}

impl MachineIdentity {
    /// Build an identity from explicit parts.
    pub fn new(
        hostname: impl Into<String>,
        username: impl Into<String>,
        platform: impl Into<String>,
        arch: impl Into<String>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            username: username.into(),
            platform: platform.into(),
            arch: arch.into(),
        }
    }

    /// Collect the identity of the running process.
    pub fn current() -> Self {
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "localhost".to_string());
        let username = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".to_string());

        Self::new(
            hostname,
            username,
            std::env::consts::OS,
            std::env::consts::ARCH,
        )
    }

    /// Derive the store key pair for this identity.
    pub fn derive_store_keys(&self, params: &KdfParams) -> Result<StoreKeys> {
        let material = Zeroizing::new(format!(
            "{}\u{1f}{}\u{1f}{}\u{1f}{}",
            self.hostname, self.username, self.platform, self.arch
        ));
        let mut out = Zeroizing::new([0u8; KEY_LENGTH * 2]);
        pbkdf2_sha512(material.as_bytes(), STORE_SALT, params.iterations, &mut out[..])?;
        Ok(StoreKeys::from_material(&out))
    }
}
