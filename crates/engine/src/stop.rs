//! Cancellation signal shared by the scheduler, reconciler and stability guard
//!
//! The handle side triggers once; every clone of the signal observes it.
//! Blocking code polls `is_triggered` between actions and sleeps through
//! `sleep`, async code awaits `triggered`.

use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Longest a blocking sleep goes without re-checking the signal
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Create a connected stop handle and signal
pub fn channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle { tx }, StopSignal { rx })
}

/// Triggering side of a stop signal
#[derive(Debug)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopHandle {
    /// Request a stop; idempotent
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }
}

/// Observing side of a stop signal
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    /// A signal that never fires
    pub fn never() -> Self {
        // A closed channel keeps its last value, so dropping the sender is fine
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    /// Check whether a stop was requested
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until a stop is requested
    ///
    /// If the handle is dropped without stopping, this never completes.
    pub async fn triggered(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|stopped| *stopped).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Blocking sleep that returns early on stop
    ///
    /// Returns false if the sleep was cut short by a stop request.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_triggered() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}
