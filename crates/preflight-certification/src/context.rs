//! Cancellation and deadline context threaded through every entry point.

use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::PreflightError;

/// Cancellation/deadline context for a certification run.
///
/// Cloning is cheap; all clones observe the same cancellation signal.
#[derive(Debug, Clone)]
pub struct RunContext {
    cancel: watch::Receiver<bool>,
    deadline: Option<Instant>,
}

/// Handle that cancels every [`RunContext`] derived from it.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: std::sync::Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Signal cancellation. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl RunContext {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self {
            cancel: rx,
            deadline: None,
        }
    }

    /// A context paired with a handle that cancels it.
    pub fn with_cancel() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                cancel: rx,
                deadline: None,
            },
            CancelHandle {
                tx: std::sync::Arc::new(tx),
            },
        )
    }

    /// Derive a context whose deadline is `timeout` from now. An earlier
    /// existing deadline is kept.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        });
        self
    }

    /// Non-blocking probe: the reason this context is done, if it is.
    pub fn err(&self) -> Option<PreflightError> {
        if *self.cancel.borrow() {
            return Some(PreflightError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(PreflightError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolve once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> PreflightError {
        let mut rx = self.cancel.clone();
        let cancelled = async move {
            loop {
                if *rx.borrow_and_update() {
                    return;
                }
                if rx.changed().await.is_err() {
                    // Sender gone without cancelling: never fires.
                    std::future::pending::<()>().await;
                }
            }
        };

        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = cancelled => PreflightError::Cancelled,
                _ = tokio::time::sleep_until(deadline) => PreflightError::DeadlineExceeded,
            },
            None => {
                cancelled.await;
                PreflightError::Cancelled
            }
        }
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::background()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_background_is_never_done() {
        let ctx = RunContext::background();
        assert!(ctx.err().is_none());
    }

    #[tokio::test]
    async fn test_cancel_handle_cancels_clones() {
        let (ctx, handle) = RunContext::with_cancel();
        let clone = ctx.clone();
        handle.cancel();
        assert!(matches!(clone.err(), Some(PreflightError::Cancelled)));
        assert!(matches!(ctx.done().await, PreflightError::Cancelled));
    }

    #[tokio::test]
    async fn test_deadline_exceeded() {
        let ctx = RunContext::background().with_timeout(Duration::from_millis(10));
        let err = ctx.done().await;
        assert!(matches!(err, PreflightError::DeadlineExceeded));
        assert!(matches!(ctx.err(), Some(PreflightError::DeadlineExceeded)));
    }

    #[test]
    fn test_with_timeout_keeps_earlier_deadline() {
        let ctx = RunContext::background()
            .with_timeout(Duration::from_secs(1))
            .with_timeout(Duration::from_secs(3600));
        let deadline = ctx.deadline.expect("deadline set");
        assert!(deadline <= Instant::now() + Duration::from_secs(1));
    }
}
