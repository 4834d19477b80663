//! Cancellation signal for async store operations
//!
//! Built on a `tokio::sync::watch` channel: cancelling flips the value to
//! `true`, and every clone observes it.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

use crate::error::{Result, VaultError};

/// Cloneable cancellation signal
#[derive(Clone, Debug)]
pub struct CancellationToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }

    /// Signal cancellation to every clone
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancelled
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            // Sender gone without cancelling; never resolves
            std::future::pending::<()>().await;
        }
    }

    /// Fail fast with `Cancelled` if already signalled
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(VaultError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Drive `fut` unless cancelled first. A cancelled future is dropped
    /// mid-flight.
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(VaultError::Cancelled),
            result = fut => result,
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
