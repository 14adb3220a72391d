use super::session::StreamState;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;

/// Notification sent to every subscriber, in mutation order per thread.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    Updated { thread_id: String, state: StreamState },
    /// The thread stopped receiving events: done, errored or paused on an interrupt.
    Completed { thread_id: String },
}

impl SessionUpdate {
    pub fn thread_id(&self) -> &str {
        match self {
            Self::Updated { thread_id, .. } | Self::Completed { thread_id } => thread_id,
        }
    }
}

pub type SubscriberId = u64;

/// Receiving end handed out by [`CallbackBus::subscribe`]. Dropping it unsubscribes.
pub struct Subscription {
    id: SubscriberId,
    receiver: mpsc::UnboundedReceiver<SessionUpdate>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub async fn recv(&mut self) -> Option<SessionUpdate> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<SessionUpdate> {
        self.receiver.try_recv().ok()
    }

    /// Everything queued right now.
    pub fn drain(&mut self) -> Vec<SessionUpdate> {
        let mut updates = Vec::new();
        while let Ok(update) = self.receiver.try_recv() {
            updates.push(update);
        }
        updates
    }
}

#[derive(Default)]
pub struct CallbackBus {
    subscribers: Mutex<Vec<(SubscriberId, mpsc::UnboundedSender<SessionUpdate>)>>,
    next_id: AtomicU64,
}

impl CallbackBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, sender));
        Subscription { id, receiver }
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        let before = subscribers.len();
        subscribers.retain(|(existing, _)| *existing != id);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn notify_update(&self, thread_id: &str, state: StreamState) {
        self.publish(SessionUpdate::Updated {
            thread_id: thread_id.to_string(),
            state,
        });
    }

    pub fn notify_complete(&self, thread_id: &str) {
        self.publish(SessionUpdate::Completed {
            thread_id: thread_id.to_string(),
        });
    }

    fn publish(&self, update: SessionUpdate) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        // Closed receivers are pruned on the next send.
        subscribers.retain(|(_, sender)| sender.send(update.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_subscriber_receives_updates_in_order() {
        let bus = CallbackBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.notify_update("t1", StreamState::default());
        bus.notify_complete("t1");

        for subscription in [&mut first, &mut second] {
            let updates = subscription.drain();
            assert_eq!(updates.len(), 2);
            assert!(matches!(updates[0], SessionUpdate::Updated { .. }));
            assert_eq!(
                updates[1],
                SessionUpdate::Completed {
                    thread_id: "t1".to_string()
                }
            );
        }
    }

    #[test]
    fn test_unsubscribe_and_drop_remove_subscribers() {
        let bus = CallbackBus::new();
        let kept = bus.subscribe();
        let removed = bus.subscribe();
        let dropped = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 3);

        assert!(bus.unsubscribe(removed.id()));
        assert!(!bus.unsubscribe(removed.id()));
        drop(dropped);
        bus.notify_complete("t");
        assert_eq!(bus.subscriber_count(), 1);
        drop(kept);
    }
}
