//! Abort flag shared between the signal listener and the main control flow.
//!
//! The listener only flips the flag; whoever owns resources checks it at a
//! safe point and runs its own teardown. Nothing signal-related touches the
//! transaction or the process list directly.

use tokio::sync::watch;

/// Sending half, held by the signal listener.
#[derive(Debug)]
pub struct AbortTrigger {
    tx: watch::Sender<bool>,
}

/// Receiving half, cloned into every component that must stop early.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

/// Create a connected trigger/signal pair.
#[must_use]
pub fn abort_pair() -> (AbortTrigger, AbortSignal) {
    let (tx, rx) = watch::channel(false);
    (AbortTrigger { tx }, AbortSignal { rx })
}

impl AbortTrigger {
    /// Raise the flag. Returns `true` only for the call that raised it, so
    /// repeated signals can be told apart from the first one.
    pub fn trigger(&self) -> bool {
        self.tx.send_if_modified(|raised| {
            if *raised {
                false
            } else {
                *raised = true;
                true
            }
        })
    }
}

impl AbortSignal {
    /// A signal that is never raised.
    #[must_use]
    pub fn never() -> Self {
        abort_pair().1
    }

    /// Whether an abort has been requested.
    #[must_use]
    pub fn is_requested(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once an abort is requested. Pends forever if the trigger is
    /// dropped without firing.
    pub async fn requested(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|raised| *raised).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
