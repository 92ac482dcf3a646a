//! The messageboard: a per-client, typed fan-out broadcast with one FIFO per
//! subscriber (spec.md §3/§4.8).

use std::{
    any::{Any, TypeId},
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, Weak},
};

use tokio::sync::Notify;

use crate::waiter::{Waiter, WaiterItem};

trait AnySubscriber: Send + Sync {
    fn push(&self, value: Arc<dyn Any + Send + Sync>);
}

#[derive(Default)]
pub struct Messageboard {
    subscribers: Mutex<HashMap<TypeId, Vec<Weak<dyn AnySubscriber>>>>,
}

impl Messageboard {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Broadcasts `value` to every live subscriber of `T`, each receiving it
    /// in send order relative to its own previous deliveries.
    pub fn send<T: Send + Sync + 'static>(&self, value: Arc<T>) {
        let type_id = TypeId::of::<T>();
        let mut subscribers = self.subscribers.lock().unwrap();
        let Some(list) = subscribers.get_mut(&type_id) else {
            return;
        };
        list.retain(|sub| sub.strong_count() > 0);
        let erased: Arc<dyn Any + Send + Sync> = value;
        for sub in list.iter().filter_map(Weak::upgrade) {
            sub.push(erased.clone());
        }
    }

    pub fn create_waiter<T: Send + Sync + 'static>(
        self: &Arc<Self>,
        waiter: &Waiter,
    ) -> Arc<MessageboardWaiter<T>> {
        let item = Arc::new(MessageboardWaiter {
            doorbell: waiter.doorbell(),
            queue: Mutex::new(VecDeque::new()),
            _marker: std::marker::PhantomData,
        });

        let dyn_sub: Arc<dyn AnySubscriber> = item.clone();
        self.subscribers
            .lock()
            .unwrap()
            .entry(TypeId::of::<T>())
            .or_default()
            .push(Arc::downgrade(&dyn_sub));

        let dyn_item: Arc<dyn WaiterItem> = item.clone();
        waiter.register(&dyn_item);
        item
    }
}

/// Per-subscriber FIFO of broadcast messages of type `T`. Dropping it drops
/// its queue without affecting other subscribers.
pub struct MessageboardWaiter<T> {
    doorbell: Arc<Notify>,
    queue: Mutex<VecDeque<Arc<T>>>,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Send + Sync + 'static> AnySubscriber for MessageboardWaiter<T> {
    fn push(&self, value: Arc<dyn Any + Send + Sync>) {
        if let Ok(typed) = value.downcast::<T>() {
            self.queue.lock().unwrap().push_back(typed);
            self.doorbell.notify_one();
        }
    }
}

impl<T: Send + Sync> WaiterItem for MessageboardWaiter<T> {
    fn is_woken(&self) -> bool {
        !self.queue.lock().unwrap().is_empty()
    }

    fn wakeup(&self) {
        self.doorbell.notify_one();
    }
}

impl<T> MessageboardWaiter<T> {
    /// Pops the next message, if any, in send order.
    pub fn fetch(&self) -> Option<Arc<T>> {
        self.queue.lock().unwrap().pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;

    #[derive(Debug, PartialEq)]
    struct Chat(String);

    #[tokio::test]
    async fn subscribers_receive_broadcasts_independently_and_in_order() {
        let board = Messageboard::new();
        let waiter_a = Waiter::new(CancelToken::new());
        let waiter_b = Waiter::new(CancelToken::new());
        let subscriber_a = board.create_waiter::<Chat>(&waiter_a);
        let subscriber_b = board.create_waiter::<Chat>(&waiter_b);

        board.send(Arc::new(Chat("one".into())));
        board.send(Arc::new(Chat("two".into())));

        assert_eq!(subscriber_a.fetch().map(|m| m.0.clone()), Some("one".into()));
        assert_eq!(subscriber_a.fetch().map(|m| m.0.clone()), Some("two".into()));
        assert!(subscriber_a.fetch().is_none());

        // Subscriber B is independent and still has both messages queued.
        assert_eq!(subscriber_b.fetch().map(|m| m.0.clone()), Some("one".into()));
        assert_eq!(subscriber_b.fetch().map(|m| m.0.clone()), Some("two".into()));
    }

    #[tokio::test]
    async fn dropping_a_subscriber_does_not_affect_others() {
        let board = Messageboard::new();
        let waiter = Waiter::new(CancelToken::new());
        let kept = board.create_waiter::<Chat>(&waiter);
        {
            let _dropped = board.create_waiter::<Chat>(&waiter);
        }
        board.send(Arc::new(Chat("hello".into())));
        assert_eq!(kept.fetch().map(|m| m.0.clone()), Some("hello".into()));
    }

    #[tokio::test]
    async fn waiter_wakes_when_message_arrives() {
        let board = Messageboard::new();
        let waiter = Waiter::new(CancelToken::new());
        let subscriber = board.create_waiter::<Chat>(&waiter);
        let board_for_task = board.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            board_for_task.send(Arc::new(Chat("ping".into())));
        });
        waiter.wait().await.unwrap();
        assert!(subscriber.fetch().is_some());
    }
}
