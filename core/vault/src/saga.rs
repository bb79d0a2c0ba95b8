//! Ordered multi-step operations with explicit compensation.
//!
//! Each completed step may register a compensation. When a later step
//! fails, compensations run in reverse order. The first compensation that
//! fails stops the unwind so earlier safety nets (backups) stay in place.

use futures::future::BoxFuture;
use std::future::Future;
use tracing::{debug, error, warn};

use phantomvault_common::{CompensationOutcome, Error, FolderId, Result, SagaFailure, SagaOperation};

/// Undo action for a completed step.
pub type Compensation = Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>;

/// Build a compensation from an async block factory.
pub fn compensation<F, Fut>(f: F) -> Compensation
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Box::new(move || Box::pin(f()))
}

/// Runner for one lock or unlock transition.
pub struct Saga {
    operation: SagaOperation,
    folder_id: FolderId,
    completed: Vec<(&'static str, Compensation)>,
}

impl Saga {
    pub fn new(operation: SagaOperation, folder_id: &FolderId) -> Self {
        Self {
            operation,
            folder_id: folder_id.clone(),
            completed: Vec::new(),
        }
    }

    /// Number of completed steps that can still be compensated.
    pub fn pending_compensations(&self) -> usize {
        self.completed.len()
    }

    /// Run a step.
    ///
    /// On success `compensate` is asked for the step's undo action, given
    /// the step's output. On failure the saga unwinds.
    ///
    /// # Errors
    /// - The step's own error if nothing had been committed yet
    /// - `Error::Saga` carrying the compensation outcome otherwise
    pub async fn run<T, Fut, C>(&mut self, step: &'static str, action: Fut, compensate: C) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
        C: FnOnce(&T) -> Option<Compensation>,
    {
        debug!(operation = %self.operation, folder_id = %self.folder_id, step, "Saga step starting");
        match action.await {
            Ok(output) => {
                if let Some(undo) = compensate(&output) {
                    self.completed.push((step, undo));
                }
                Ok(output)
            }
            Err(cause) => Err(self.abort(step, cause).await),
        }
    }

    /// Unwind completed steps after `step` failed with `cause`.
    pub async fn abort(&mut self, step: &'static str, cause: Error) -> Error {
        if self.completed.is_empty() {
            warn!(
                operation = %self.operation,
                folder_id = %self.folder_id,
                step,
                error = %cause,
                "Saga step failed before any change"
            );
            return cause;
        }

        let mut outcome = CompensationOutcome::RolledBack;
        while let Some((done, undo)) = self.completed.pop() {
            if let Err(e) = undo().await {
                error!(
                    operation = %self.operation,
                    folder_id = %self.folder_id,
                    step = done,
                    error = %e,
                    "Compensation failed, manual recovery required"
                );
                outcome = CompensationOutcome::RollbackFailed(format!(
                    "undo of '{}' failed: {}",
                    done, e
                ));
                break;
            }
            debug!(operation = %self.operation, folder_id = %self.folder_id, step = done, "Step compensated");
        }
        // Remaining undo actions are dropped unrun.
        self.completed.clear();

        let failure = SagaFailure {
            operation: self.operation,
            folder_id: self.folder_id.to_string(),
            step,
            cause: cause.to_string(),
            compensation: outcome,
        };
        warn!(%failure, "Saga failed");
        Error::Saga(failure)
    }
}
