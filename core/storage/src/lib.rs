//! Storage abstraction for PhantomVault.
//!
//! Two kinds of storage are modelled:
//! - Documents: small metadata files that are read and rewritten whole
//! - Folder trees: user folders that are copied, moved and removed as a unit
//!
//! # Design Principles
//! - Async operations: All I/O operations are async
//! - Atomic document writes: a reader never observes a half-written document
//! - Unified error semantics: Consistent error types across implementations

pub mod local;
pub mod memory;
pub mod provider;

pub use local::{LocalDocumentStore, LocalFolderStore};
pub use memory::MemoryDocumentStore;
pub use provider::{DocumentStore, FolderStore};
