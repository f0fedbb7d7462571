//! Operator stop signal shared by the batch executor and the monitor loop.
//!
//! Stopping is cooperative: work already in flight finishes, and the owner
//! checks the signal at its next boundary (chunk, retry round, or cycle).

use std::sync::Arc;

use tokio::sync::watch;

/// Requests a stop. Cloneable so it can be handed to a Ctrl-C handler.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

/// Observes the stop request.
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle { tx: Arc::new(tx) }, StopSignal { rx })
}

impl StopHandle {
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn signal(&self) -> StopSignal {
        StopSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl StopSignal {
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once a stop is requested. Never resolves if every handle is
    /// dropped without stopping.
    pub async fn stopped(&mut self) {
        if self.rx.wait_for(|stopped| *stopped).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_stop_is_observed_by_all_signals() {
        let (handle, signal) = stop_channel();
        let mut late = handle.signal();
        assert!(!signal.is_stopped());

        handle.stop();
        assert!(signal.is_stopped());
        tokio::time::timeout(Duration::from_secs(1), late.stopped())
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_handle_never_resolves() {
        let (handle, mut signal) = stop_channel();
        drop(handle);
        let waited = tokio::time::timeout(Duration::from_secs(60), signal.stopped()).await;
        assert!(waited.is_err());
    }
}
