//! Auto-lock coordination for PhantomVault.
//!
//! This module provides:
//! - Tracking of temporarily unlocked folders
//! - Relocking of every tracked folder on screen lock, suspend, shutdown or quit
//! - A background signal loop that holds shutdown and quit until relocking ends

pub mod coordinator;
pub mod scheduler;
pub mod signal;

pub use coordinator::{AutoLockCoordinator, AutoLockReport};
pub use scheduler::{SignalLoop, SignalSender};
pub use signal::SystemSignal;
