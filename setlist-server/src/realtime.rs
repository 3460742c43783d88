//! Per-setlist realtime fan-out
//!
//! Each setlist with at least one subscriber owns a broadcast channel.
//! Publishing to a setlist nobody watches is a no-op. Channels whose
//! receivers are all gone are dropped on the next publish or subscribe.

use std::collections::HashMap;

use setlist_common::events::SessionEvent;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;
use uuid::Uuid;

/// Buffered events per setlist before slow subscribers start lagging
const CHANNEL_CAPACITY: usize = 64;

#[derive(Default)]
pub struct SessionHub {
    channels: RwLock<HashMap<Uuid, broadcast::Sender<SessionEvent>>>,
}

impl SessionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to one setlist's session events
    pub async fn subscribe(&self, setlist_id: Uuid) -> broadcast::Receiver<SessionEvent> {
        let mut channels = self.channels.write().await;
        channels.retain(|_, sender| sender.receiver_count() > 0);
        channels
            .entry(setlist_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Send an event to every subscriber of the setlist
    pub async fn publish(&self, setlist_id: Uuid, event: SessionEvent) {
        let mut channels = self.channels.write().await;
        let Some(sender) = channels.get(&setlist_id) else {
            return;
        };

        debug!(setlist_id = %setlist_id, event = event.event_type(), "Publishing session event");
        if sender.send(event).is_err() {
            // Every receiver is gone
            channels.remove(&setlist_id);
        }
    }

    #[cfg(test)]
    async fn subscriber_count(&self, setlist_id: Uuid) -> usize {
        self.channels
            .read()
            .await
            .get(&setlist_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    #[cfg(test)]
    async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_are_scoped_to_setlist() {
        let hub = SessionHub::new();
        let watched = Uuid::new_v4();
        let other = Uuid::new_v4();

        let mut rx = hub.subscribe(watched).await;
        let mut other_rx = hub.subscribe(other).await;

        let session_id = Uuid::new_v4();
        hub.publish(watched, SessionEvent::SessionEnded { session_id }).await;

        assert_eq!(rx.recv().await.unwrap(), SessionEvent::SessionEnded { session_id });
        assert!(other_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_noop() {
        let hub = SessionHub::new();
        let setlist_id = Uuid::new_v4();

        hub.publish(setlist_id, SessionEvent::SessionEnded { session_id: Uuid::nil() })
            .await;
        assert_eq!(hub.subscriber_count(setlist_id).await, 0);
    }

    #[tokio::test]
    async fn test_dropped_subscribers_release_channel() {
        let hub = SessionHub::new();
        let setlist_id = Uuid::new_v4();

        let rx = hub.subscribe(setlist_id).await;
        assert_eq!(hub.subscriber_count(setlist_id).await, 1);
        drop(rx);

        hub.publish(setlist_id, SessionEvent::SessionEnded { session_id: Uuid::nil() })
            .await;
        assert_eq!(hub.subscriber_count(setlist_id).await, 0);
    }

    #[tokio::test]
    async fn test_disconnected_setlists_pruned_on_subscribe() {
        let hub = SessionHub::new();

        let idle = hub.subscribe(Uuid::new_v4()).await;
        drop(idle);
        assert_eq!(hub.channel_count().await, 1);

        let _live = hub.subscribe(Uuid::new_v4()).await;
        assert_eq!(hub.channel_count().await, 1);
    }
}
