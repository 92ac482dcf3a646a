//! The `Waiter` aggregation primitive (spec.md §4.6).
//!
//! A `Waiter` owns a set of weak references to heterogeneous `WaiterItem`s
//! and a shared "doorbell" notification. Any item's `wakeup()` rings the
//! doorbell; `wait()` re-checks every live item and returns as soon as one
//! reports `is_woken()`, or raises [`Cancelled`] if the waiter's token fires
//! first. This mirrors `Client/Waiter.hpp`/`Waiter.cpp` in the original
//! implementation, built on the same `tokio::select!`-around-a-task shape
//! used throughout `crates/network/client/src/discovery.rs`.

use std::{
    future::Future,
    sync::{Arc, Mutex, Weak},
    time::Duration,
};

use tokio::sync::Notify;

use crate::cancel::{CancelToken, Cancelled};

/// Anything that can be aggregated by a [`Waiter`]. `wakeup()` must be
/// thread-safe: it may be invoked from the shared I/O thread.
pub trait WaiterItem: Send + Sync {
    /// Non-blocking check: has this item got something ready to consume?
    fn is_woken(&self) -> bool;

    /// Called by the producer side; must ring the doorbell of every
    /// `Waiter` this item was registered with.
    fn wakeup(&self);
}

/// Aggregates a dynamic set of [`WaiterItem`]s behind one suspension point.
#[derive(Clone)]
pub struct Waiter {
    doorbell: Arc<Notify>,
    items: Arc<Mutex<Vec<Weak<dyn WaiterItem>>>>,
    cancel: CancelToken,
}

impl Waiter {
    pub fn new(cancel: CancelToken) -> Self {
        Self {
            doorbell: Arc::new(Notify::new()),
            items: Arc::new(Mutex::new(Vec::new())),
            cancel,
        }
    }

    /// Handle shared with item implementations that live outside this
    /// crate (e.g. a `Connection`), so they can ring the same doorbell.
    pub fn doorbell(&self) -> Arc<Notify> {
        self.doorbell.clone()
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Registers an externally constructed item (e.g. a connection-status
    /// item built by `steambot-client`). The item must have been built with
    /// [`Waiter::doorbell`] so its wakeups reach this waiter.
    pub fn register(&self, item: &Arc<dyn WaiterItem>) {
        self.items.lock().unwrap().push(Arc::downgrade(item));
    }

    /// Sleeps until at least one registered item reports woken, or the
    /// waiter's cancel token fires.
    pub async fn wait(&self) -> Result<(), Cancelled> {
        loop {
            if self.any_woken() {
                return Ok(());
            }
            tokio::select! {
                _ = self.doorbell.notified() => {}
                _ = self.cancel.cancelled() => return Err(Cancelled),
            }
        }
    }

    /// Same as [`Waiter::wait`] but bounded: returns `Ok(false)` on timeout
    /// without raising, matching spec.md §5 ("Waiter.wait(duration) returns
    /// false on timeout without raising").
    pub async fn wait_timeout(&self, timeout: Duration) -> Result<bool, Cancelled> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.any_woken() {
                return Ok(true);
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Ok(false);
            }
            tokio::select! {
                _ = self.doorbell.notified() => {}
                _ = tokio::time::sleep(remaining) => return Ok(self.any_woken()),
                _ = self.cancel.cancelled() => return Err(Cancelled),
            }
        }
    }

    fn any_woken(&self) -> bool {
        let mut items = self.items.lock().unwrap();
        items.retain(|item| item.strong_count() > 0);
        items
            .iter()
            .filter_map(Weak::upgrade)
            .any(|item| item.is_woken())
    }
}

/// Single-shot waiter item: a producer calls `set` then `complete`; the
/// consumer's `wait()` wakes once and `get()` returns the value.
pub struct ResultWaiter<T> {
    doorbell: Arc<Notify>,
    slot: Mutex<Option<T>>,
    completed: std::sync::atomic::AtomicBool,
}

impl<T: Send + Sync> ResultWaiter<T> {
    pub fn new(waiter: &Waiter) -> Arc<Self> {
        let item = Arc::new(Self {
            doorbell: waiter.doorbell(),
            slot: Mutex::new(None),
            completed: std::sync::atomic::AtomicBool::new(false),
        });
        let dyn_item: Arc<dyn WaiterItem> = item.clone();
        waiter.register(&dyn_item);
        item
    }

    pub fn set(&self, value: T) {
        *self.slot.lock().unwrap() = Some(value);
    }

    pub fn complete(&self) {
        self.completed
            .store(true, std::sync::atomic::Ordering::SeqCst);
        self.wakeup();
    }

    pub fn get(&self) -> Option<T> {
        if self.completed.load(std::sync::atomic::Ordering::SeqCst) {
            self.slot.lock().unwrap().take()
        } else {
            None
        }
    }
}

impl<T: Send + Sync> WaiterItem for ResultWaiter<T> {
    fn is_woken(&self) -> bool {
        self.completed.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn wakeup(&self) {
        // `notify_one`, not `notify_waiters`: it stores a permit when no
        // task is currently parked in `notified()`, which is what closes
        // the race between `Waiter::any_woken` returning false and the
        // subsequent `notified()` registering (see `Waiter::wait`).
        self.doorbell.notify_one();
    }
}

/// FIFO of closures to run on the task that owns a `Waiter`, grounded on
/// `Client/Execute.hpp`. A producer enqueues a closure and awaits the
/// returned future; the owning task drains the queue (e.g. inside its
/// select loop) and the producer resolves once its closure has run.
pub struct ExecuteQueue {
    doorbell: Arc<Notify>,
    queue: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
}

impl ExecuteQueue {
    pub fn new(waiter: &Waiter) -> Arc<Self> {
        let item = Arc::new(Self {
            doorbell: waiter.doorbell(),
            queue: Mutex::new(Vec::new()),
        });
        let dyn_item: Arc<dyn WaiterItem> = item.clone();
        waiter.register(&dyn_item);
        item
    }

    /// Enqueues `f` and resolves once the owning task has run it.
    pub fn execute<F, R>(&self, f: F) -> impl Future<Output = R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.queue.lock().unwrap().push(Box::new(move || {
            let _ = tx.send(f());
        }));
        self.wakeup();
        async move { rx.await.expect("ExecuteQueue closure dropped without running") }
    }

    /// Runs every queued closure; called by the owning task.
    pub fn drain(&self) {
        let pending: Vec<_> = std::mem::take(&mut *self.queue.lock().unwrap());
        for closure in pending {
            closure();
        }
    }
}

impl WaiterItem for ExecuteQueue {
    fn is_woken(&self) -> bool {
        !self.queue.lock().unwrap().is_empty()
    }

    fn wakeup(&self) {
        self.doorbell.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn result_waiter_wakes_on_complete() {
        let waiter = Waiter::new(CancelToken::new());
        let result = ResultWaiter::<u32>::new(&waiter);
        let completer = result.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            completer.set(42);
            completer.complete();
        });
        waiter.wait().await.unwrap();
        assert_eq!(result.get(), Some(42));
    }

    #[tokio::test]
    async fn wait_timeout_returns_false_without_raising() {
        let waiter = Waiter::new(CancelToken::new());
        let _unused = ResultWaiter::<u32>::new(&waiter);
        let woke = waiter.wait_timeout(Duration::from_millis(10)).await.unwrap();
        assert!(!woke);
    }

    #[tokio::test]
    async fn cancelled_waiter_raises_on_wait() {
        let cancel = CancelToken::new();
        let waiter = Waiter::new(cancel.clone());
        cancel.cancel();
        assert!(waiter.wait().await.is_err());
    }

    #[tokio::test]
    async fn execute_queue_runs_closure_on_drain() {
        let waiter = Waiter::new(CancelToken::new());
        let queue = ExecuteQueue::new(&waiter);
        let queue_for_task = queue.clone();
        let fut = tokio::spawn(async move { queue_for_task.execute(|| 7).await });
        // Give the spawned task a chance to enqueue.
        tokio::time::sleep(Duration::from_millis(5)).await;
        queue.drain();
        assert_eq!(fut.await.unwrap(), 7);
    }
}
