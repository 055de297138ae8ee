//! Multicast bus for submission outcomes.
//!
//! Any number of observers can subscribe at any time. Observers only see
//! outcomes published after they subscribed. Publishing never waits on
//! observers: a subscriber that falls more than `capacity` outcomes behind
//! skips the oldest ones.

pub mod outcome;
pub mod quiescence;

use futures::stream::{self, BoxStream, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, warn};

pub use outcome::SubmissionOutcome;
pub use quiescence::await_quiescence;

#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

struct BusInner {
    // None once the bus is closed
    tx: RwLock<Option<broadcast::Sender<SubmissionOutcome>>>,
    published: AtomicU64,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(BusInner {
                tx: RwLock::new(Some(tx)),
                published: AtomicU64::new(0),
            }),
        }
    }

    /// Publish an outcome to every current subscriber.
    ///
    /// Having no subscribers is not an error, and neither is publishing after
    /// the bus closed: the outcome is dropped.
    pub fn publish(&self, outcome: SubmissionOutcome) {
        let guard = self.inner.tx.read().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(tx) => {
                self.inner.published.fetch_add(1, Ordering::Relaxed);
                // Err only means nobody is listening right now
                let _ = tx.send(outcome);
            }
            None => {
                debug!(
                    sequence = outcome.sequence,
                    "Event bus closed, dropping late outcome"
                );
            }
        }
    }

    pub fn subscribe(&self) -> OutcomeSubscription {
        let guard = self.inner.tx.read().unwrap_or_else(|e| e.into_inner());
        let rx = match guard.as_ref() {
            Some(tx) => tx.subscribe(),
            None => {
                // Subscribing to a closed bus yields an already finished stream
                let (tx, rx) = broadcast::channel(1);
                drop(tx);
                rx
            }
        };
        OutcomeSubscription { rx }
    }

    /// Stop delivering outcomes. Subscribers drain what they already
    /// received, then see the end of the stream.
    pub fn close(&self) {
        let mut guard = self.inner.tx.write().unwrap_or_else(|e| e.into_inner());
        if guard.take().is_some() {
            debug!(
                published = self.inner.published.load(Ordering::Relaxed),
                "Event bus closed"
            );
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner
            .tx
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_none()
    }

    /// Total outcomes published while the bus was open.
    pub fn published(&self) -> u64 {
        self.inner.published.load(Ordering::Relaxed)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .tx
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map_or(0, |tx| tx.receiver_count())
    }
}

/// A single observer's view of the outcome stream.
pub struct OutcomeSubscription {
    rx: broadcast::Receiver<SubmissionOutcome>,
}

impl OutcomeSubscription {
    /// Next outcome, or `None` once the bus is closed and drained.
    pub async fn recv(&mut self) -> Option<SubmissionOutcome> {
        loop {
            match self.rx.recv().await {
                Ok(outcome) => return Some(outcome),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped = skipped, "Outcome subscriber lagged, skipped outcomes");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next outcome if one is already buffered.
    pub fn try_recv(&mut self) -> Option<SubmissionOutcome> {
        loop {
            match self.rx.try_recv() {
                Ok(outcome) => return Some(outcome),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped = skipped, "Outcome subscriber lagged, skipped outcomes");
                    continue;
                }
                Err(_) => return None,
            }
        }
    }

    pub fn into_stream(self) -> BoxStream<'static, SubmissionOutcome> {
        stream::unfold(self, |mut subscription| async move {
            subscription
                .recv()
                .await
                .map(|outcome| (outcome, subscription))
        })
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration;
    use uuid::Uuid;

    fn make_outcome(sequence: u64) -> SubmissionOutcome {
        SubmissionOutcome {
            batch_id: Uuid::new_v4(),
            sequence,
            success: true,
            timestamp: Utc::now(),
            line_count: 1,
            bytes_sent: 10,
            bytes_received: 0,
            status_code: Some(204),
            error: None,
            duration: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_does_not_fail() {
        let bus = EventBus::new(4);
        for i in 0..10 {
            bus.publish(make_outcome(i));
        }
        assert_eq!(bus.published(), 10);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_no_history() {
        let bus = EventBus::new(16);
        bus.publish(make_outcome(0));
        bus.publish(make_outcome(1));

        let mut sub = bus.subscribe();
        assert!(sub.try_recv().is_none());

        bus.publish(make_outcome(2));
        assert_eq!(sub.recv().await.unwrap().sequence, 2);
    }

    #[tokio::test]
    async fn test_every_subscriber_receives_every_outcome() {
        let bus = EventBus::new(16);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        for i in 0..3 {
            bus.publish(make_outcome(i));
        }

        for i in 0..3 {
            assert_eq!(first.recv().await.unwrap().sequence, i);
            assert_eq!(second.recv().await.unwrap().sequence, i);
        }
    }

    #[tokio::test]
    async fn test_slow_subscriber_skips_oldest() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.publish(make_outcome(i));
        }

        // Only the newest `capacity` outcomes survive
        assert_eq!(sub.recv().await.unwrap().sequence, 3);
        assert_eq!(sub.recv().await.unwrap().sequence, 4);
    }

    #[tokio::test]
    async fn test_close_ends_streams_and_ignores_late_publish() {
        let bus = EventBus::new(8);
        let mut sub = bus.subscribe();
        let stream = bus.subscribe().into_stream();

        bus.publish(make_outcome(0));
        bus.close();
        assert!(bus.is_closed());

        // Publishing after close is silently dropped
        bus.publish(make_outcome(1));
        assert_eq!(bus.published(), 1);

        assert_eq!(sub.recv().await.unwrap().sequence, 0);
        assert!(sub.recv().await.is_none());

        let collected: Vec<_> = stream.collect().await;
        assert_eq!(collected.len(), 1);

        let mut after_close = bus.subscribe();
        assert!(after_close.recv().await.is_none());
    }
}
