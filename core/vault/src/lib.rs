//! Vault engine for PhantomVault.
//!
//! This module provides:
//! - Profile management with master passwords and recovery keys
//! - Encrypted, integrity-tagged credential and folder registry documents
//! - The folder lifecycle engine: lock/unlock sagas with compensation
//! - Backups, folder encryption and folder hiding collaborators
//!
//! # Architecture
//! `VaultManager` is the explicit handle callers construct. It owns one
//! `ProfileManager` and one `FolderLifecycleEngine`; both persist through
//! storage providers and never hold global state.

pub mod backup;
pub mod cipher;
pub mod config;
pub mod credentials;
pub mod document;
pub mod hider;
pub mod lifecycle;
pub mod manager;
pub mod profile;
pub mod registry;
pub mod saga;
pub mod session;

pub use cipher::{AeadFolderCipher, FolderCipher};
pub use config::{VaultLayout, VaultSettings};
pub use credentials::Profile;
pub use hider::{DotPrefixHider, FolderHider};
pub use lifecycle::{
    AddedFolder, FolderLifecycleEngine, FolderLocker, TrackedUnlock, UnlockAllReport, UnlockObserver,
};
pub use manager::{VaultComponents, VaultManager};
pub use profile::ProfileManager;
pub use registry::{BackupRecord, FolderEntry, UnlockMode};
pub use session::PasswordCache;
