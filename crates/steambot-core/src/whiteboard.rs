//! The whiteboard: a per-client, last-writer-wins, type-indexed store
//! (spec.md §3/§4.7).
//!
//! Grounded on `crates/settings/src/settings/store.rs`'s
//! `HashMap<TypeId, Box<dyn AnySettingValue>>` registry — here simplified to
//! a single global value per type (no layered sources) plus waiter
//! notification on write.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
    sync::{Arc, Mutex, Weak},
};

use tokio::sync::Notify;

use crate::waiter::{Waiter, WaiterItem};

type AnyValue = Box<dyn Any + Send + Sync>;

#[derive(Default)]
pub struct Whiteboard {
    values: Mutex<HashMap<TypeId, AnyValue>>,
    waiters: Mutex<HashMap<TypeId, Vec<Weak<dyn WaiterItem>>>>,
}

impl Whiteboard {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Replaces the stored value for `T` and synchronously wakes every
    /// waiter registered for `T` before returning, per spec.md §4.7.
    pub fn set<T: Clone + Send + Sync + 'static>(&self, value: T) {
        let type_id = TypeId::of::<T>();
        self.values
            .lock()
            .unwrap()
            .insert(type_id, Box::new(value));

        let mut registry = self.waiters.lock().unwrap();
        if let Some(items) = registry.get_mut(&type_id) {
            items.retain(|item| item.strong_count() > 0);
            for item in items.iter().filter_map(Weak::upgrade) {
                item.wakeup();
            }
        }
    }

    pub fn has<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.values
            .lock()
            .unwrap()
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
            .cloned()
    }

    pub fn get<T: Clone + Send + Sync + 'static>(&self, default: T) -> T {
        self.has::<T>().unwrap_or(default)
    }

    /// Creates a waiter item for `T`, registering it with both `self` (for
    /// write notification) and `waiter` (for aggregation).
    pub fn create_waiter<T: Clone + Send + Sync + 'static>(
        self: &Arc<Self>,
        waiter: &Waiter,
    ) -> Arc<WhiteboardWaiter<T>> {
        let item = Arc::new(WhiteboardWaiter {
            board: self.clone(),
            doorbell: waiter.doorbell(),
            woken: std::sync::atomic::AtomicBool::new(self.has::<T>().is_some()),
            _marker: std::marker::PhantomData,
        });

        let dyn_item: Arc<dyn WaiterItem> = item.clone();
        self.waiters
            .lock()
            .unwrap()
            .entry(TypeId::of::<T>())
            .or_default()
            .push(Arc::downgrade(&dyn_item));
        waiter.register(&dyn_item);
        item
    }
}

/// A [`WaiterItem`] woken when the whiteboard's value for `T` changes.
pub struct WhiteboardWaiter<T> {
    board: Arc<Whiteboard>,
    doorbell: Arc<Notify>,
    woken: std::sync::atomic::AtomicBool,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Clone + Send + Sync + 'static> WhiteboardWaiter<T> {
    /// Returns the latest snapshot and clears this item's woken flag, so a
    /// subsequent `Waiter::wait()` blocks again until the next write.
    pub fn get(&self) -> Option<T> {
        self.woken.store(false, std::sync::atomic::Ordering::SeqCst);
        self.board.has::<T>()
    }
}

impl<T: Send + Sync> WaiterItem for WhiteboardWaiter<T> {
    fn is_woken(&self) -> bool {
        self.woken.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn wakeup(&self) {
        self.woken.store(true, std::sync::atomic::Ordering::SeqCst);
        self.doorbell.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;

    #[derive(Clone, Debug, PartialEq)]
    struct Ping(u32);

    #[tokio::test]
    async fn last_writer_wins() {
        let board = Whiteboard::new();
        board.set(Ping(1));
        board.set(Ping(2));
        board.set(Ping(3));
        assert_eq!(board.has::<Ping>(), Some(Ping(3)));
    }

    #[tokio::test]
    async fn get_falls_back_to_default() {
        let board = Whiteboard::new();
        assert_eq!(board.get(Ping(0)), Ping(0));
    }

    #[tokio::test]
    async fn waiter_created_before_set_wakes_at_least_once() {
        let board = Whiteboard::new();
        let waiter = Waiter::new(CancelToken::new());
        let item = board.create_waiter::<Ping>(&waiter);

        let board_for_task = board.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            board_for_task.set(Ping(9));
        });

        waiter.wait().await.unwrap();
        assert_eq!(item.get(), Some(Ping(9)));
    }
}
