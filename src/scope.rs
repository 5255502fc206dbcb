//! Cancellation Scopes
//!
//! Every networked operation in this crate takes a [`CancelScope`]. A scope
//! carries two things:
//!
//! 1. A cancellation signal, fired from a [`CancelHandle`] with a reason
//! 2. An optional deadline
//!
//! Operations combine the scope with their own configured timeout: the
//! effective deadline is `min(now + timeout, scope_deadline)`.
//!
//! ## Example
//!
//! ```
//! use mcinspect::scope::CancelScope;
//! use std::time::Duration;
//!
//! let (handle, scope) = CancelScope::new();
//! let scope = scope.with_timeout(Duration::from_secs(10));
//!
//! assert!(scope.reason().is_none());
//! handle.cancel("user pressed escape");
//! assert_eq!(scope.reason().as_deref(), Some("user pressed escape"));
//! ```
//!
//! The signal is a `tokio::sync::watch` channel, so a scope can be cloned
//! freely and every clone sees the same cancellation.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// The firing side of a cancellation scope.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<Option<String>>>,
}

impl CancelHandle {
    /// Fires the scope. Only the first reason is kept.
    pub fn cancel(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
    }

    /// Returns true once [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.tx.borrow().is_some()
    }
}

/// The observing side of a cancellation scope.
#[derive(Debug, Clone)]
pub struct CancelScope {
    rx: watch::Receiver<Option<String>>,
    deadline: Option<Instant>,
}

impl CancelScope {
    /// Creates a linked handle/scope pair with no deadline.
    pub fn new() -> (CancelHandle, CancelScope) {
        let (tx, rx) = watch::channel(None);
        (
            CancelHandle { tx: Arc::new(tx) },
            CancelScope { rx, deadline: None },
        )
    }

    /// A scope that never fires and has no deadline.
    pub fn background() -> CancelScope {
        let (_, scope) = CancelScope::new();
        scope
    }

    /// Returns this scope with `deadline` applied (keeps the earlier one).
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// Returns this scope with a deadline `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// The scope's own deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// `min(now + timeout, scope_deadline)`
    pub fn effective_deadline(&self, timeout: Duration) -> Instant {
        let configured = Instant::now() + timeout;
        match self.deadline {
            Some(deadline) => deadline.min(configured),
            None => configured,
        }
    }

    /// The cancellation reason, if the scope has fired.
    pub fn reason(&self) -> Option<String> {
        self.rx.borrow().clone()
    }

    /// Resolves with the reason once the scope fires.
    ///
    /// If every handle is dropped without cancelling, this never resolves.
    pub async fn cancelled(&self) -> String {
        let mut rx = self.rx.clone();
        loop {
            if let Some(reason) = rx.borrow_and_update().clone() {
                return reason;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for CancelScope {
    fn default() -> Self {
        CancelScope::background()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_reason_wins() {
        let (handle, scope) = CancelScope::new();
        handle.cancel("first");
        handle.cancel("second");
        assert_eq!(scope.reason().as_deref(), Some("first"));
        assert!(handle.is_cancelled());
    }

    #[test]
    fn test_clones_share_signal() {
        let (handle, scope) = CancelScope::new();
        let clone = scope.clone();
        handle.cancel("stop");
        assert_eq!(clone.reason().as_deref(), Some("stop"));
    }

    #[tokio::test]
    async fn test_cancelled_resolves_after_fire() {
        let (handle, scope) = CancelScope::new();

        let waiter = tokio::spawn(async move { scope.cancelled().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.cancel("bye");

        let reason = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reason, "bye");
    }

    #[tokio::test]
    async fn test_background_never_fires() {
        let scope = CancelScope::background();
        let result =
            tokio::time::timeout(Duration::from_millis(50), scope.cancelled()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_effective_deadline_takes_minimum() {
        let scope = CancelScope::background().with_timeout(Duration::from_millis(100));
        let effective = scope.effective_deadline(Duration::from_secs(30));
        assert_eq!(Some(effective), scope.deadline());

        let loose = CancelScope::background().with_timeout(Duration::from_secs(60));
        let effective = loose.effective_deadline(Duration::from_secs(1));
        assert!(effective < loose.deadline().unwrap());
    }

    #[test]
    fn test_with_deadline_keeps_earlier() {
        let now = Instant::now();
        let scope = CancelScope::background()
            .with_deadline(now + Duration::from_secs(1))
            .with_deadline(now + Duration::from_secs(5));
        assert_eq!(scope.deadline(), Some(now + Duration::from_secs(1)));
    }
}
