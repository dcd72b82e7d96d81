//! Cancellation handle for in-flight requests.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

/// Caller-owned capability to abort an in-flight request.
///
/// Created by [`StreamClient::issue`](crate::StreamClient::issue) before
/// any network work starts. Clones share the same signal. Cancelling is
/// idempotent, and cancelling after the request settled has no effect on
/// the response already delivered.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request that the pending request be aborted.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    ///
    /// If every handle is dropped without cancelling, this never resolves.
    pub fn cancelled(&self) -> impl Future<Output = ()> + Send + use<> {
        let mut rx = self.tx.subscribe();
        async move {
            let closed = rx.wait_for(|cancelled| *cancelled).await.is_err();
            if closed {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn starts_uncancelled() {
        let handle = CancelHandle::new();
        assert!(!handle.is_cancelled());
    }

    #[test]
    fn cancel_is_idempotent_and_shared() {
        let handle = CancelHandle::new();
        let clone = handle.clone();
        handle.cancel();
        handle.cancel();
        assert!(clone.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_resolves_after_cancel() {
        let handle = CancelHandle::new();
        let waiter = handle.cancelled();

        let canceller = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("cancel signal should arrive");
    }

    #[tokio::test]
    async fn cancelled_resolves_immediately_if_already_cancelled() {
        let handle = CancelHandle::new();
        handle.cancel();
        tokio::time::timeout(Duration::from_millis(100), handle.cancelled())
            .await
            .expect("already cancelled");
    }

    #[tokio::test]
    async fn dropped_handle_never_cancels() {
        let handle = CancelHandle::new();
        let waiter = handle.cancelled();
        drop(handle);

        let result = tokio::time::timeout(Duration::from_millis(50), waiter).await;
        assert!(result.is_err(), "dropping the handle must not signal cancel");
    }
}
