//! Cooperative cancellation for long-running mirror runs.
//!
//! Checked at I/O boundaries: before each image copy, before each archive
//! step, and before each registry listing.

use std::sync::Arc;

use a3s_mirror_core::error::{MirrorError, Result};
use tokio::sync::watch;

/// Trigger side of a cancellation pair.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Observer side of a cancellation pair.
#[derive(Debug, Clone)]
pub struct Cancellation {
    rx: watch::Receiver<bool>,
}

impl Cancellation {
    /// Create a linked handle/observer pair.
    pub fn new() -> (CancelHandle, Cancellation) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx: Arc::new(tx) }, Cancellation { rx })
    }

    /// An observer that is never cancelled.
    pub fn never() -> Self {
        let (_, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Fail with `Cancelled` if cancellation was requested.
    pub fn check(&self, before: &str) -> Result<()> {
        if self.is_cancelled() {
            tracing::info!(step = before, "Mirror run cancelled");
            return Err(MirrorError::Cancelled(before.to_string()));
        }
        Ok(())
    }

    /// Wait until cancellation is requested.
    ///
    /// Never resolves if the handle is dropped without cancelling.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::never()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_never_is_not_cancelled() {
        let c = Cancellation::never();
        assert!(!c.is_cancelled());
        assert!(c.check("copy").is_ok());
    }

    #[test]
    fn test_cancel_is_observed_by_clones() {
        let (handle, c) = Cancellation::new();
        let clone = c.clone();
        handle.cancel();
        handle.cancel();
        assert!(c.is_cancelled());
        let err = clone.check("copying v1.45.3").unwrap_err();
        assert_eq!(err.to_string(), "Cancelled before copying v1.45.3");
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let (handle, mut c) = Cancellation::new();
        let waiter = tokio::spawn(async move {
            c.cancelled().await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
