//! Cancellation for client-scoped suspension points.
//!
//! spec.md's `Cancel` registry is a client-scoped list of weak references to
//! cancelable objects; `quit()` drives each to terminate its wait. We ground
//! the actual cross-task signal in [`tokio_util::sync::CancellationToken`]
//! (already part of the teacher's dependency graph) and keep only the thin
//! "every suspension point observes this" contract on top of it, matching
//! `Client/Mutex.hpp` and `Client/Sleep.cpp` in the original implementation.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Raised when a cancel-aware wait is cancelled instead of completing
/// normally. Not a fault: it unwinds exactly the task that owns the token.
#[derive(Debug, thiserror::Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// One client's cancellation source. Cloning shares the same underlying
/// token; `child()` derives a scoped token that is cancelled either
/// directly or when the parent is (mirrors the registry-of-weak-refs
/// semantics without needing actual weak pointers: a dropped child token
/// simply stops mattering).
#[derive(Debug, Clone, Default)]
pub struct CancelToken(CancellationToken);

impl CancelToken {
    pub fn new() -> Self {
        Self(CancellationToken::new())
    }

    pub fn child(&self) -> Self {
        Self(self.0.child_token())
    }

    /// Cancels this token and every child derived from it. Mirrors
    /// `Client.quit()` invoking `cancel()` on every registered object.
    pub fn cancel(&self) {
        self.0.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.0.cancelled().await;
    }

    /// Cancel-aware sleep: a suspension point per spec.md §5. Returns
    /// `Err(Cancelled)` if the token fires before the duration elapses.
    pub async fn sleep(&self, duration: Duration) -> Result<(), Cancelled> {
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            _ = self.cancelled() => Err(Cancelled),
        }
    }

    /// Races an arbitrary future against cancellation. Used by every
    /// suspension point in §5 that isn't already one of the helpers here
    /// (e.g. awaiting a oneshot receiver, an HTTP response).
    pub async fn race<F: std::future::Future>(&self, fut: F) -> Result<F::Output, Cancelled> {
        tokio::select! {
            out = fut => Ok(out),
            _ = self.cancelled() => Err(Cancelled),
        }
    }
}

/// A `tokio::sync::Mutex` whose `lock` is a cancel-aware suspension point,
/// grounded on `Client/Mutex.hpp` ("the account-local Mutex, which is
/// cancel-aware").
#[derive(Debug)]
pub struct CancellableMutex<T>(tokio::sync::Mutex<T>);

impl<T> CancellableMutex<T> {
    pub fn new(value: T) -> Self {
        Self(tokio::sync::Mutex::new(value))
    }

    pub async fn lock(
        &self,
        cancel: &CancelToken,
    ) -> Result<tokio::sync::MutexGuard<'_, T>, Cancelled> {
        cancel.race(self.0.lock()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sleep_completes_without_cancel() {
        let token = CancelToken::new();
        assert!(token.sleep(Duration::from_millis(1)).await.is_ok());
    }

    #[tokio::test]
    async fn sleep_is_interrupted_by_cancel() {
        let token = CancelToken::new();
        let waiter = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            waiter.cancel();
        });
        let result = token.sleep(Duration::from_secs(5)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn child_token_is_cancelled_with_parent() {
        let parent = CancelToken::new();
        let child = parent.child();
        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[tokio::test]
    async fn mutex_lock_is_cancel_aware() {
        let cancel = CancelToken::new();
        let mutex = std::sync::Arc::new(CancellableMutex::new(0u32));
        // Hold the lock for the whole test so a second `lock()` call blocks
        // and can only resolve via cancellation.
        let held = mutex.0.lock().await;
        let waiter = cancel.clone();
        let blocked = mutex.clone();
        let handle = tokio::spawn(async move { blocked.lock(&waiter).await.is_err() });
        tokio::time::sleep(Duration::from_millis(5)).await;
        cancel.cancel();
        assert!(handle.await.unwrap());
        drop(held);
    }
}
