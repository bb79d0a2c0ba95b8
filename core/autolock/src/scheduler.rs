//! Background signal loop.
//!
//! Signals are processed one at a time in arrival order. Shutdown and
//! before-quit deliveries wait for their relock pass to finish.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::coordinator::{AutoLockCoordinator, AutoLockReport};
use crate::signal::SystemSignal;
use phantomvault_common::{Error, Result};

const CHANNEL_CAPACITY: usize = 16;

#[derive(Debug)]
enum LoopRequest {
    Signal(SystemSignal, Option<oneshot::Sender<AutoLockReport>>),
    Stop,
}

/// Cloneable handle for delivering signals to a running loop.
#[derive(Clone)]
pub struct SignalSender {
    request_tx: mpsc::Sender<LoopRequest>,
}

impl SignalSender {
    /// Deliver a signal.
    ///
    /// Deferrable signals return the relock report once every tracked
    /// folder has been processed. Others return `None` immediately.
    ///
    /// # Errors
    /// - Resource error if the loop is not running
    pub async fn deliver(&self, signal: SystemSignal) -> Result<Option<AutoLockReport>> {
        if !signal.is_deferrable() {
            self.send(LoopRequest::Signal(signal, None)).await?;
            return Ok(None);
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(LoopRequest::Signal(signal, Some(reply_tx))).await?;
        debug!(%signal, "Holding signal until relock completes");
        let report = reply_rx
            .await
            .map_err(|_| Error::Resource("Auto-lock loop stopped before relocking finished".to_string()))?;
        Ok(Some(report))
    }

    /// Stop the loop after the signals already queued.
    pub async fn shutdown(&self) {
        let _ = self.request_tx.send(LoopRequest::Stop).await;
    }

    async fn send(&self, request: LoopRequest) -> Result<()> {
        self.request_tx
            .send(request)
            .await
            .map_err(|_| Error::Resource("Auto-lock loop not running".to_string()))
    }
}

/// The background task. Spawn `run` on the tokio runtime.
pub struct SignalLoop {
    coordinator: Arc<AutoLockCoordinator>,
    request_rx: mpsc::Receiver<LoopRequest>,
}

impl SignalLoop {
    pub async fn run(mut self) {
        info!("Auto-lock loop started");
        while let Some(request) = self.request_rx.recv().await {
            match request {
                LoopRequest::Stop => {
                    info!("Auto-lock loop shutting down");
                    break;
                }
                LoopRequest::Signal(signal, reply) => {
                    let report = self.coordinator.handle_signal(signal).await;
                    if let Some(reply) = reply {
                        let _ = reply.send(report);
                    }
                }
            }
        }
    }
}

impl AutoLockCoordinator {
    /// Create the signal channel for this coordinator.
    pub fn spawn(self: &Arc<Self>) -> (SignalSender, SignalLoop) {
        let (request_tx, request_rx) = mpsc::channel(CHANNEL_CAPACITY);
        (
            SignalSender { request_tx },
            SignalLoop {
                coordinator: self.clone(),
                request_rx,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use phantomvault_common::{FolderId, ProfileId};
    use phantomvault_vault::{FolderLocker, UnlockObserver};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct SlowLocker {
        finished: AtomicUsize,
    }

    #[async_trait]
    impl FolderLocker for SlowLocker {
        async fn lock_tracked(&self, _folder_id: &FolderId) -> Result<()> {
            tokio::time::sleep(Duration::from_millis(30)).await;
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn setup(count: usize) -> (Arc<SlowLocker>, Arc<AutoLockCoordinator>) {
        let locker = Arc::new(SlowLocker {
            finished: AtomicUsize::new(0),
        });
        let coordinator = Arc::new(AutoLockCoordinator::new(locker.clone()));
        let profile = ProfileId::generate();
        for _ in 0..count {
            coordinator.register_unlock(&profile, &FolderId::generate());
        }
        (locker, coordinator)
    }

    #[tokio::test]
    async fn test_before_quit_waits_for_relock() {
        let (locker, coordinator) = setup(3);
        let (sender, signal_loop) = coordinator.spawn();
        let task = tokio::spawn(signal_loop.run());

        let report = sender.deliver(SystemSignal::BeforeQuit).await.unwrap().unwrap();

        assert_eq!(locker.finished.load(Ordering::SeqCst), 3);
        assert_eq!(report.locked.len(), 3);
        assert!(coordinator.tracked().is_empty());

        sender.shutdown().await;
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_lock_screen_does_not_wait() {
        let (locker, coordinator) = setup(2);
        let (sender, signal_loop) = coordinator.spawn();
        let task = tokio::spawn(signal_loop.run());

        assert!(sender.deliver(SystemSignal::LockScreen).await.unwrap().is_none());

        // A queued deferrable signal completes only after the earlier pass.
        sender.deliver(SystemSignal::Shutdown).await.unwrap();
        assert_eq!(locker.finished.load(Ordering::SeqCst), 2);

        sender.shutdown().await;
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_deliver_after_stop_fails() {
        let (_, coordinator) = setup(0);
        let (sender, signal_loop) = coordinator.spawn();
        let task = tokio::spawn(signal_loop.run());
        sender.shutdown().await;
        task.await.unwrap();

        assert!(matches!(
            sender.deliver(SystemSignal::Suspend).await,
            Err(Error::Resource(_))
        ));
    }
}
