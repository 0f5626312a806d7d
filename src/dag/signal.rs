// src/dag/signal.rs

//! Single-fire completion signal.

use tokio::sync::watch;

/// "Signal once, observe many" event.
///
/// Firing is idempotent; any number of waiters (including ones that start
/// waiting after the signal fired) observe it.
#[derive(Debug)]
pub struct CompletionSignal {
    tx: watch::Sender<bool>,
}

impl CompletionSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Fire the signal. Returns `true` if this call was the one that fired it.
    pub fn signal(&self) -> bool {
        !self.tx.send_replace(true)
    }

    pub fn is_signalled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the signal has fired.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|done| *done).await;
    }
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}
