//! Tracks temporary unlocks and relocks them on system signals.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::signal::SystemSignal;
use phantomvault_common::{Error, FolderId, ProfileId};
use phantomvault_vault::{FolderLifecycleEngine, FolderLocker, UnlockObserver};

/// Outcome of one relock pass.
#[derive(Debug, Clone, Default)]
pub struct AutoLockReport {
    pub locked: Vec<FolderId>,
    pub failed: Vec<(FolderId, String)>,
    pub duration: Duration,
}

impl AutoLockReport {
    /// True if every tracked folder was relocked.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Reactive relocker of temporarily unlocked folders.
///
/// Permanent unlocks are never registered, so they are never touched.
pub struct AutoLockCoordinator {
    tracked: Mutex<BTreeMap<FolderId, ProfileId>>,
    locker: Arc<dyn FolderLocker>,
}

impl AutoLockCoordinator {
    pub fn new(locker: Arc<dyn FolderLocker>) -> Self {
        Self {
            tracked: Mutex::new(BTreeMap::new()),
            locker,
        }
    }

    /// Create a coordinator bound to `engine` and register it as the engine's observer.
    pub fn attach(engine: &Arc<FolderLifecycleEngine>) -> Arc<Self> {
        let coordinator = Arc::new(Self::new(engine.clone()));
        let observer: Weak<dyn UnlockObserver> = Arc::downgrade(&coordinator) as Weak<dyn UnlockObserver>;
        engine.set_observer(observer);
        coordinator
    }

    /// Folder ids currently awaiting relock.
    pub fn tracked(&self) -> Vec<FolderId> {
        self.tracked
            .lock()
            .map(|tracked| tracked.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_tracking(&self, folder_id: &FolderId) -> bool {
        self.tracked
            .lock()
            .map(|tracked| tracked.contains_key(folder_id))
            .unwrap_or(false)
    }

    fn forget(&self, folder_id: &FolderId) {
        if let Ok(mut tracked) = self.tracked.lock() {
            tracked.remove(folder_id);
        }
    }

    /// Lock every tracked folder, one at a time.
    ///
    /// Individual failures are collected and do not stop the pass. An empty
    /// map is a no-op.
    pub async fn lock_all_temporary_folders(&self) -> AutoLockReport {
        let started = Instant::now();
        let snapshot = self.tracked();
        let mut report = AutoLockReport::default();
        if snapshot.is_empty() {
            debug!("No temporary unlocks to relock");
            return report;
        }

        for folder_id in snapshot {
            match self.locker.lock_tracked(&folder_id).await {
                Ok(()) => {
                    self.forget(&folder_id);
                    report.locked.push(folder_id);
                }
                Err(Error::NotFound(reason)) => {
                    // The folder left vault management since it was registered.
                    debug!(folder_id = %folder_id, reason = %reason, "Dropping stale auto-lock entry");
                    self.forget(&folder_id);
                }
                Err(e) => {
                    warn!(folder_id = %folder_id, error = %e, "Auto-lock failed");
                    report.failed.push((folder_id, e.to_string()));
                }
            }
        }

        report.duration = started.elapsed();
        info!(
            locked = report.locked.len(),
            failed = report.failed.len(),
            duration_ms = report.duration.as_millis() as u64,
            "Auto-lock pass finished"
        );
        report
    }

    /// React to a platform signal.
    pub async fn handle_signal(&self, signal: SystemSignal) -> AutoLockReport {
        info!(%signal, "System signal received");
        self.lock_all_temporary_folders().await
    }
}

impl UnlockObserver for AutoLockCoordinator {
    fn register_unlock(&self, profile_id: &ProfileId, folder_id: &FolderId) {
        if let Ok(mut tracked) = self.tracked.lock() {
            tracked.insert(folder_id.clone(), profile_id.clone());
        }
        debug!(profile_id = %profile_id, folder_id = %folder_id, "Tracking temporary unlock");
    }

    fn unregister_unlock(&self, folder_id: &FolderId) {
        self.forget(folder_id);
    }
}
