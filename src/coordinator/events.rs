//! Status event fan-out.
//!
//! One broadcast channel carries every transition; a second channel per
//! collection is created lazily on first subscription so a scoreboard
//! widget can watch `score_points` without filtering the firehose.
//! There is no replay buffer: late subscribers only see future events.

use std::pin::Pin;
use std::task::{Context, Poll};

use dashmap::DashMap;
use futures::Stream;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::warn;

use super::types::SyncEvent;

pub(super) struct EventBus {
    capacity: usize,
    global: broadcast::Sender<SyncEvent>,
    per_collection: DashMap<String, broadcast::Sender<SyncEvent>>,
}

impl EventBus {
    pub(super) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (global, _) = broadcast::channel(capacity);
        Self {
            capacity,
            global,
            per_collection: DashMap::new(),
        }
    }

    /// Deliver one event to the global channel and, when anyone has ever
    /// subscribed to the collection, to its dedicated channel. A send
    /// error only means nobody is listening right now.
    pub(super) fn emit(&self, event: SyncEvent) {
        if let Some(tx) = self.per_collection.get(&event.collection) {
            let _ = tx.send(event.clone());
        }
        let _ = self.global.send(event);
    }

    pub(super) fn subscribe_all(&self) -> EventStream {
        EventStream::new(self.global.subscribe())
    }

    pub(super) fn subscribe(&self, collection: &str) -> EventStream {
        let tx = self
            .per_collection
            .entry(collection.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        EventStream::new(tx.subscribe())
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("capacity", &self.capacity)
            .field("collections", &self.per_collection.len())
            .finish()
    }
}

/// Infinite stream of [`SyncEvent`]s for one subscriber.
///
/// Dropping the stream unsubscribes without affecting other subscribers.
/// A subscriber that falls behind the channel capacity skips the missed
/// events with a warning and continues from the oldest retained one.
#[derive(Debug)]
pub struct EventStream {
    inner: BroadcastStream<SyncEvent>,
}

impl EventStream {
    fn new(rx: broadcast::Receiver<SyncEvent>) -> Self {
        Self {
            inner: BroadcastStream::new(rx),
        }
    }

    /// Wait for the next event. Returns `None` once the coordinator has
    /// been dropped.
    pub async fn recv(&mut self) -> Option<SyncEvent> {
        use futures::StreamExt;
        self.next().await
    }
}

impl Stream for EventStream {
    type Item = SyncEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(event))) => return Poll::Ready(Some(event)),
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(missed)))) => {
                    warn!(missed, "event subscriber lagged, skipping missed events");
                    crate::metrics::record_events_lagged(missed);
                    // receiver has resynced to the oldest retained event
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::SyncStatus;
    use crate::entity::now_millis;

    fn event(collection: &str, status: SyncStatus) -> SyncEvent {
        SyncEvent {
            collection: collection.to_string(),
            status,
            pending: 0,
            at: now_millis(),
        }
    }

    #[tokio::test]
    async fn test_no_replay_for_late_subscribers() {
        let bus = EventBus::new(8);
        bus.emit(event("matches", SyncStatus::Syncing));

        let mut stream = bus.subscribe_all();
        bus.emit(event("matches", SyncStatus::Idle));

        // Only the post-subscription event arrives.
        let got = stream.recv().await.unwrap();
        assert_eq!(got.status, SyncStatus::Idle);
    }

    #[tokio::test]
    async fn test_collection_stream_filters() {
        let bus = EventBus::new(8);
        let mut matches = bus.subscribe("matches");

        bus.emit(event("players", SyncStatus::Syncing));
        bus.emit(event("matches", SyncStatus::Syncing));

        let got = matches.recv().await.unwrap();
        assert_eq!(got.collection, "matches");
    }

    #[tokio::test]
    async fn test_every_subscriber_sees_every_event() {
        let bus = EventBus::new(8);
        let mut a = bus.subscribe_all();
        let mut b = bus.subscribe_all();

        bus.emit(event("teams", SyncStatus::Error));

        assert_eq!(a.recv().await.unwrap().status, SyncStatus::Error);
        assert_eq!(b.recv().await.unwrap().status, SyncStatus::Error);
    }

    #[tokio::test]
    async fn test_dropping_one_subscriber_leaves_others() {
        let bus = EventBus::new(8);
        let a = bus.subscribe_all();
        let mut b = bus.subscribe_all();

        drop(a);
        bus.emit(event("sets", SyncStatus::Syncing));

        assert_eq!(b.recv().await.unwrap().collection, "sets");
    }

    #[tokio::test]
    async fn test_lagged_subscriber_skips_and_continues() {
        let bus = EventBus::new(2);
        let mut slow = bus.subscribe_all();

        for i in 0..5 {
            bus.emit(SyncEvent {
                collection: "matches".into(),
                status: SyncStatus::Syncing,
                pending: i,
                at: now_millis(),
            });
        }

        // Capacity 2: the oldest events are gone, the stream resumes at
        // the earliest retained one instead of erroring.
        let got = slow.recv().await.unwrap();
        assert!(got.pending >= 3);
    }
}
