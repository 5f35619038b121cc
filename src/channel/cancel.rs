//! Shared cancellation flag for in-flight command runs.

use std::sync::Arc;
use tokio::sync::watch;

/// Cloneable cancel switch backed by a `watch` channel.
///
/// Polling loops read it with [`CancelFlag::is_cancelled`]; request futures
/// race [`CancelFlag::cancelled`] inside `tokio::select!`.
#[derive(Debug, Clone)]
pub struct CancelFlag {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelFlag {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request cancellation of whatever is running now.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Reset before starting a new run.
    pub fn clear(&self) {
        self.tx.send_replace(false);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Resolve once the flag is set (immediately if it already is).
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        wait_for_cancellation(&mut rx).await;
    }
}

/// Wait until the watched flag turns true.
pub async fn wait_for_cancellation(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender gone: nobody can cancel any more.
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[test]
    fn cancel_and_clear_toggle_state() {
        let flag = CancelFlag::new();
        assert!(!flag.is_cancelled());
        flag.cancel();
        assert!(flag.clone().is_cancelled());
        flag.clear();
        assert!(!flag.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_resolves_after_cancel_from_another_task() {
        let flag = CancelFlag::new();
        let waiter = flag.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });
        tokio::time::sleep(Duration::from_millis(5)).await;
        flag.cancel();
        timeout(Duration::from_secs(1), handle)
            .await
            .expect("cancellation observed")
            .expect("task joined");
    }

    #[tokio::test]
    async fn cancelled_ignores_clear_transitions() {
        let flag = CancelFlag::new();
        let waiter = flag.clone();
        flag.clear();
        let pending = timeout(Duration::from_millis(20), waiter.cancelled()).await;
        assert!(pending.is_err());
    }
}
