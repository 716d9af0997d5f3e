//! Cancellation and deadline guard for reconciliation steps.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::{ReconcileError, ReconcileResult};

/// Races each reconciliation step against a shutdown signal and an
/// optional deadline.
///
/// Once either fires, the step in flight is dropped and no further step
/// starts.
#[derive(Debug, Clone)]
pub struct ReconcileGuard {
    shutdown: watch::Receiver<bool>,
    deadline: Option<Instant>,
}

impl ReconcileGuard {
    /// Guard bounded by `shutdown` and, if given, `timeout` from now.
    pub fn new(shutdown: watch::Receiver<bool>, timeout: Option<Duration>) -> Self {
        Self {
            shutdown,
            deadline: timeout.map(|t| Instant::now() + t),
        }
    }

    /// Guard that never cancels and has no deadline.
    pub fn unbounded() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self::new(rx, None)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fail if shutdown was requested or the deadline has passed.
    pub fn check(&self) -> ReconcileResult<()> {
        if *self.shutdown.borrow() {
            return Err(ReconcileError::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(ReconcileError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Run `step` unless cancelled or out of time first.
    pub async fn guarded<F, T>(&self, step: F) -> ReconcileResult<T>
    where
        F: Future<Output = T>,
    {
        self.check()?;

        let mut shutdown = self.shutdown.clone();
        let cancelled = async move {
            loop {
                if *shutdown.borrow_and_update() {
                    return;
                }
                // A dropped sender can no longer cancel us.
                if shutdown.changed().await.is_err() {
                    std::future::pending::<()>().await;
                }
            }
        };
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => Err(ReconcileError::Cancelled),
            _ = expired => Err(ReconcileError::DeadlineExceeded),
            value = step => Ok(value),
        }
    }
}
