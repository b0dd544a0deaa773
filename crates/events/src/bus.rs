//! Mask-routed event bus.

use std::sync::{
    Arc, RwLock,
    atomic::{AtomicBool, Ordering},
};

use {
    async_trait::async_trait,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use herald_metrics::{bus as bus_metrics, counter, labels};

use crate::{Error, Result, event::Event, trigger::TriggerMask};

/// Receives events whose kind intersects [`EventSubscriber::mask`].
///
/// `update` must not fail: subscribers contain their own errors.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    fn name(&self) -> &str;

    fn mask(&self) -> TriggerMask;

    async fn update(&self, event: &Event);
}

/// Anything events can be handed to. The accumulator publishes through this.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver the event; returns how many subscribers received it.
    async fn publish(&self, event: Event) -> Result<usize>;
}

/// Fans events out to interested subscribers.
pub struct EventBus {
    subscribers: RwLock<Vec<Arc<dyn EventSubscriber>>>,
    closed: AtomicBool,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Add a subscriber. A subscriber with the same name is replaced.
    pub fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) {
        let mut subs = self
            .subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner());
        if let Some(pos) = subs.iter().position(|s| s.name() == subscriber.name()) {
            warn!(
                subscriber = subscriber.name(),
                "replacing subscriber with the same name"
            );
            subs.remove(pos);
        }
        info!(
            subscriber = subscriber.name(),
            mask = %subscriber.mask(),
            "event subscriber registered"
        );
        subs.push(subscriber);
    }

    /// Remove a subscriber by name. Returns whether it was registered.
    pub fn unsubscribe(&self, name: &str) -> bool {
        let mut subs = self
            .subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner());
        let before = subs.len();
        subs.retain(|s| s.name() != name);
        let removed = subs.len() != before;
        if removed {
            debug!(subscriber = name, "event subscriber removed");
        }
        removed
    }

    pub fn subscriber_names(&self) -> Vec<String> {
        self.subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    /// Stop accepting events. Subscribers stay registered until unsubscribed.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Subscribers interested in `kind`, snapshotted so no lock is held
    /// while they run.
    fn interested(&self, kind: TriggerMask) -> Vec<Arc<dyn EventSubscriber>> {
        self.subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|s| s.mask().intersects(kind))
            .cloned()
            .collect()
    }

    /// Deliver `event` to every interested subscriber concurrently and wait
    /// for all of them.
    pub async fn publish(&self, event: Event) -> Result<usize> {
        if self.is_closed() {
            return Err(Error::Closed { kind: event.kind });
        }

        let targets = self.interested(event.kind);

        #[cfg(feature = "metrics")]
        counter!(bus_metrics::EVENTS_PUBLISHED_TOTAL, labels::KIND => event.kind.name().unwrap_or("mixed")).increment(1);

        if targets.is_empty() {
            debug!(kind = %event.kind, "event has no subscribers");
            #[cfg(feature = "metrics")]
            counter!(bus_metrics::EVENTS_UNROUTED_TOTAL).increment(1);
            return Ok(0);
        }

        debug!(kind = %event.kind, count = targets.len(), "dispatching event");
        let event = &event;
        futures::future::join_all(targets.iter().map(|s| s.update(event))).await;
        Ok(targets.len())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSink for EventBus {
    async fn publish(&self, event: Event) -> Result<usize> {
        EventBus::publish(self, event).await
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::event::EventPayload, rstest::rstest, std::sync::Mutex};

    struct Recorder {
        name: String,
        mask: TriggerMask,
        seen: Mutex<Vec<TriggerMask>>,
    }

    impl Recorder {
        fn new(name: &str, mask: TriggerMask) -> Arc<Self> {
            Arc::new(Self {
                name: name.into(),
                mask,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn seen(&self) -> Vec<TriggerMask> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventSubscriber for Recorder {
        fn name(&self) -> &str {
            &self.name
        }

        fn mask(&self) -> TriggerMask {
            self.mask
        }

        async fn update(&self, event: &Event) {
            self.seen.lock().unwrap().push(event.kind);
        }
    }

    #[rstest]
    #[case(EventPayload::PlayerJoined { player_id: 1, name: "a".into() }, 1)]
    #[case(EventPayload::ServerStopped, 2)]
    #[case(EventPayload::ChatMessage { player_id: None, author: "x".into(), text: "hi".into() }, 0)]
    #[tokio::test]
    async fn routes_by_mask_intersection(#[case] payload: EventPayload, #[case] expected: usize) {
        let bus = EventBus::new();
        bus.subscribe(Recorder::new(
            "players",
            TriggerMask::PLAYER_JOINED | TriggerMask::SERVER_STOPPED,
        ));
        bus.subscribe(Recorder::new("status", TriggerMask::SERVER_STOPPED));

        assert_eq!(bus.publish(Event::new(payload)).await.unwrap(), expected);
    }

    #[tokio::test]
    async fn unsubscribe_and_replace() {
        let bus = EventBus::new();
        let first = Recorder::new("board", TriggerMask::TIMER);
        let second = Recorder::new("board", TriggerMask::TIMER);
        bus.subscribe(first.clone());
        bus.subscribe(second.clone());
        assert_eq!(bus.subscriber_names(), vec!["board".to_string()]);

        bus.publish(Event::timer()).await.unwrap();
        assert!(first.seen().is_empty());
        assert_eq!(second.seen(), vec![TriggerMask::TIMER]);

        assert!(bus.unsubscribe("board"));
        assert!(!bus.unsubscribe("board"));
        assert_eq!(bus.publish(Event::timer()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn closed_bus_rejects_events() {
        let bus = EventBus::new();
        let rec = Recorder::new("any", TriggerMask::ALL);
        bus.subscribe(rec.clone());
        bus.close();
        let err = bus.publish(Event::config_changed()).await.unwrap_err();
        assert!(matches!(err, Error::Closed { kind } if kind == TriggerMask::CONFIG_CHANGED));
        assert!(rec.seen().is_empty());
    }
}
