//! Caller-driven cancellation and deadlines
//!
//! Every blocking wait in the transport (backoff sleeps, link sends and
//! receives) races a [`Cancellation`]. A caller abandons a stuck send by
//! firing the paired [`CancelHandle`] or by attaching a deadline.
//!
//! ```rust,ignore
//! let (handle, cancel) = arx_radio::cancellation();
//! let cancel = cancel.with_timeout(Duration::from_secs(30));
//!
//! tokio::spawn(async move {
//!     // later...
//!     handle.cancel();
//! });
//!
//! transport.send_with(&command, &cancel).await?;
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::{RadioError, Result};

/// Fires the paired [`Cancellation`]
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Cancel every operation observing the paired signal
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Check if cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Cancellation signal with an optional deadline
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    rx: Option<watch::Receiver<bool>>,
    deadline: Option<Instant>,
}

/// Create a linked cancel handle and signal
pub fn cancellation() -> (CancelHandle, Cancellation) {
    let (tx, rx) = watch::channel(false);
    (
        CancelHandle { tx: Arc::new(tx) },
        Cancellation {
            rx: Some(rx),
            deadline: None,
        },
    )
}

impl Cancellation {
    /// A signal that never fires
    pub fn never() -> Self {
        Self::default()
    }

    /// Attach an absolute deadline
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Attach a deadline relative to now
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Check the signal without waiting
    pub fn check(&self) -> Result<()> {
        if self.rx.as_ref().is_some_and(|rx| *rx.borrow()) {
            return Err(RadioError::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(RadioError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Resolve once cancelled or past the deadline, with the matching error
    pub async fn fired(&self) -> RadioError {
        let flag = async {
            match self.rx.clone() {
                Some(mut rx) => loop {
                    if *rx.borrow_and_update() {
                        return;
                    }
                    if rx.changed().await.is_err() {
                        // Handle dropped without cancelling
                        std::future::pending::<()>().await;
                    }
                },
                None => std::future::pending::<()>().await,
            }
        };

        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = flag => RadioError::Cancelled,
                _ = tokio::time::sleep_until(deadline) => RadioError::DeadlineExceeded,
            },
            None => {
                flag.await;
                RadioError::Cancelled
            }
        }
    }

    /// Run a future unless the signal fires first
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        self.check()?;
        tokio::select! {
            biased;
            err = self.fired() => Err(err),
            value = fut => Ok(value),
        }
    }

    /// Sleep unless the signal fires first
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        self.run(tokio::time::sleep(duration)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_never_lets_future_finish() {
        let cancel = Cancellation::never();
        let value = cancel.run(async { 7 }).await.unwrap();
        assert_eq!(value, 7);
        assert!(cancel.sleep(Duration::from_secs(3600)).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_sleep() {
        let (handle, cancel) = cancellation();

        let waiter = tokio::spawn(async move { cancel.sleep(Duration::from_secs(60)).await });
        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.cancel();

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(RadioError::Cancelled)));
        assert!(handle.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_interrupts_sleep() {
        let cancel = Cancellation::never().with_timeout(Duration::from_secs(5));
        let started = Instant::now();

        let result = cancel.sleep(Duration::from_secs(60)).await;
        assert!(matches!(result, Err(RadioError::DeadlineExceeded)));
        assert!(started.elapsed() < Duration::from_secs(6));
    }

    #[tokio::test]
    async fn test_check_after_cancel() {
        let (handle, cancel) = cancellation();
        assert!(cancel.check().is_ok());
        handle.cancel();
        assert!(matches!(cancel.check(), Err(RadioError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_handle_never_fires() {
        let (handle, cancel) = cancellation();
        drop(handle);
        assert!(cancel.sleep(Duration::from_secs(10)).await.is_ok());
    }
}
