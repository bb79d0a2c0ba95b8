//! Common utilities and types shared across PhantomVault modules.
//!
//! This module provides the error taxonomy, identifier newtypes and secret
//! wrappers used by every other crate in the workspace.

pub mod error;
pub mod types;

pub use error::{CompensationOutcome, Error, Result, SagaFailure, SagaOperation};
pub use types::{FolderId, Password, ProfileId, SensitiveBytes};
