//! Fire-once stop/cancellation broadcast.

use std::sync::Arc;

use tokio::sync::watch;

/// A signal that can be fired once and awaited by any number of tasks.
///
/// Clones share the same state. Firing again after the first time is a
/// no-op, and waiters that subscribe after the signal fired return
/// immediately.
#[derive(Debug, Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Fire the signal. Returns `true` only for the call that actually
    /// changed the state.
    pub fn fire(&self) -> bool {
        self.tx.send_if_modified(|fired| {
            if *fired {
                false
            } else {
                *fired = true;
                true
            }
        })
    }

    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once the signal has fired.
    pub async fn fired(&self) {
        let mut rx = self.tx.subscribe();
        // `self` keeps the sender alive, so this only returns once fired.
        let _ = rx.wait_for(|fired| *fired).await;
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}
