// src/exec/cancel.rs

//! Run-level cancellation.
//!
//! One [`CancelHandle`] per run; every task gets a [`CancelSignal`] cloned
//! from it. Sleeping loops (retry delay, watcher polling) select on
//! [`CancelSignal::cancelled`] so an abort interrupts them immediately.

use tokio::sync::watch;

/// Owner side: flips the run into the cancelled state.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer side, cheap to clone.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        // The sender drops here; `cancelled()` stays pending on a closed channel.
        let (_, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested. If the handle is dropped
    /// without cancelling, this never resolves.
    pub async fn cancelled(&mut self) {
        if self.rx.wait_for(|c| *c).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn signal_fires_after_cancel() {
        let handle = CancelHandle::new();
        let mut signal = handle.signal();
        assert!(!signal.is_cancelled());

        handle.cancel();
        tokio::time::timeout(Duration::from_secs(1), signal.cancelled())
            .await
            .expect("signal should resolve");
        assert!(signal.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_handle_does_not_cancel() {
        let handle = CancelHandle::new();
        let mut signal = handle.signal();
        drop(handle);

        let res = tokio::time::timeout(Duration::from_secs(5), signal.cancelled()).await;
        assert!(res.is_err());
        assert!(!signal.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn never_signal_stays_pending() {
        let mut signal = CancelSignal::never();
        let res = tokio::time::timeout(Duration::from_secs(5), signal.cancelled()).await;
        assert!(res.is_err());
        assert!(!signal.is_cancelled());
    }
}
