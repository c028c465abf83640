//! Cooperative cancellation for a running scan.
//!
//! The orchestrator checks the token at every suspension point. Cancelling is
//! sticky: once set, every later check observes it.

use std::sync::Arc;

use tokio::sync::watch;

/// Requests cancellation of the scan holding the paired [`CancelToken`].
#[derive(Debug, Clone)]
pub struct Canceller {
    tx: Arc<watch::Sender<bool>>,
}

impl Canceller {
    /// Cancel the scan. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Observed by the orchestrator; cloneable.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
    // Keeps `never()` tokens from observing a closed channel.
    _keepalive: Option<Arc<watch::Sender<bool>>>,
}

impl CancelToken {
    /// A linked canceller/token pair.
    pub fn new() -> (Canceller, CancelToken) {
        let (tx, rx) = watch::channel(false);
        (
            Canceller { tx: Arc::new(tx) },
            CancelToken {
                rx,
                _keepalive: None,
            },
        )
    }

    /// A token that is never cancelled.
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        CancelToken {
            rx,
            _keepalive: Some(Arc::new(tx)),
        }
    }

    /// True once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves when cancellation is requested. If every canceller has been
    /// dropped without cancelling, never resolves.
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

impl Default for CancelToken {
    fn default() -> Self {
        Self::never()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_wakes_waiter() {
        let (canceller, mut token) = CancelToken::new();
        let waiter = tokio::spawn(async move {
            token.cancelled().await;
            true
        });
        tokio::time::sleep(Duration::from_millis(5)).await;
        canceller.cancel();
        let woke = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter did not wake")
            .unwrap();
        assert!(woke);
    }

    #[tokio::test]
    async fn test_never_token_stays_pending() {
        let mut token = CancelToken::never();
        assert!(!token.is_cancelled());
        let result = tokio::time::timeout(Duration::from_millis(20), token.cancelled()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_cancel_before_wait_is_observed() {
        let (canceller, mut token) = CancelToken::new();
        canceller.cancel();
        canceller.cancel();
        assert!(token.is_cancelled());
        tokio::time::timeout(Duration::from_millis(20), token.cancelled())
            .await
            .expect("already-cancelled token should resolve immediately");
    }
}
