//! Fixed-window micro-batching of correlated sub-events.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use {
    tokio::{
        task::JoinHandle,
        time::{self, Instant, MissedTickBehavior},
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use herald_metrics::{accumulator as acc_metrics, counter, histogram};

use crate::{
    bus::EventSink,
    event::{AccumulationBucket, AccumulationKey, Event, EventPayload},
};

/// Derives the correlation key for a payload. `None` means "do not batch".
pub type KeyFn = Arc<dyn Fn(&EventPayload) -> Option<AccumulationKey> + Send + Sync>;

/// Collects payloads into per-key buckets and emits one `AGGREGATED` event
/// per window.
pub struct EventAccumulator {
    buckets: Mutex<HashMap<AccumulationKey, AccumulationBucket>>,
    sink: Arc<dyn EventSink>,
    period: Duration,
    key_fn: KeyFn,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl EventAccumulator {
    /// Accumulator keyed by [`EventPayload::accumulation_key`].
    pub fn new(sink: Arc<dyn EventSink>, period: Duration) -> Arc<Self> {
        Self::with_key_fn(sink, period, Arc::new(EventPayload::accumulation_key))
    }

    pub fn with_key_fn(sink: Arc<dyn EventSink>, period: Duration, key_fn: KeyFn) -> Arc<Self> {
        Arc::new(Self {
            buckets: Mutex::new(HashMap::new()),
            sink,
            period,
            key_fn,
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Append `payload` to its bucket. Returns `false` when the payload has
    /// no key; the caller should publish it directly instead.
    pub fn push(&self, payload: EventPayload) -> bool {
        let Some(key) = (self.key_fn)(&payload) else {
            return false;
        };
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        buckets
            .entry(key.clone())
            .or_insert_with(|| AccumulationBucket {
                key,
                items: Vec::new(),
            })
            .items
            .push(payload);

        #[cfg(feature = "metrics")]
        counter!(acc_metrics::EVENTS_TOTAL).increment(1);
        true
    }

    /// Number of payloads waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.buckets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .map(|b| b.items.len())
            .sum()
    }

    /// Snapshot and clear all buckets, then publish them as one event.
    /// Returns the number of buckets flushed.
    pub async fn flush(&self) -> usize {
        let mut drained: Vec<AccumulationBucket> = {
            let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
            buckets.drain().map(|(_, bucket)| bucket).collect()
        };
        if drained.is_empty() {
            return 0;
        }

        drained.sort_by(|a, b| a.key.cmp(&b.key));
        let count = drained.len();

        #[cfg(feature = "metrics")]
        {
            counter!(acc_metrics::FLUSHES_TOTAL).increment(1);
            histogram!(acc_metrics::BUCKETS_PER_FLUSH).record(count as f64);
        }

        debug!(buckets = count, "flushing accumulated events");
        if let Err(e) = self.sink.publish(Event::aggregated(drained)).await {
            warn!(error = %e, buckets = count, "dropping aggregated event");
            #[cfg(feature = "metrics")]
            counter!(acc_metrics::DELIVERY_FAILURES_TOTAL).increment(1);
        }
        count
    }

    /// Spawn the flush loop. Calling it twice has no effect.
    pub fn start(self: &Arc<Self>) {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if task.is_some() || self.cancel.is_cancelled() {
            return;
        }

        let this = Arc::clone(self);
        let cancel = self.cancel.clone();
        *task = Some(tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + this.period, this.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        this.flush().await;
                    },
                }
            }
        }));
        info!(period_ms = self.period.as_millis() as u64, "event accumulator started");
    }

    /// Stop the flush loop and publish whatever is still buffered.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handle = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            warn!(error = %e, "accumulator task ended abnormally");
        }
        let flushed = self.flush().await;
        info!(buckets = flushed, "event accumulator stopped");
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{Error, Result, trigger::TriggerMask},
        async_trait::async_trait,
    };

    #[derive(Default)]
    struct Capture {
        events: Mutex<Vec<Event>>,
        fail: bool,
    }

    impl Capture {
        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventSink for Capture {
        async fn publish(&self, event: Event) -> Result<usize> {
            if self.fail {
                return Err(Error::Closed { kind: event.kind });
            }
            self.events.lock().unwrap().push(event);
            Ok(1)
        }
    }

    fn trade(tx: &str, item: &str) -> EventPayload {
        EventPayload::TradeItem {
            transaction_id: tx.into(),
            player_id: 3,
            item: item.into(),
            quantity: 1,
            price: 10,
        }
    }

    fn buckets(event: &Event) -> &[AccumulationBucket] {
        match &event.payload {
            EventPayload::Aggregated { buckets } => buckets,
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[tokio::test]
    async fn one_window_yields_one_bucket_in_arrival_order() {
        let sink = Arc::new(Capture::default());
        let acc = EventAccumulator::new(sink.clone(), Duration::from_secs(1));
        let items: Vec<_> = (1..=5).map(|i| trade("K", &format!("e{i}"))).collect();
        for item in &items {
            assert!(acc.push(item.clone()));
        }
        assert_eq!(acc.pending(), 5);

        assert_eq!(acc.flush().await, 1);
        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, TriggerMask::AGGREGATED);
        let got = buckets(&events[0]);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].key.as_str(), "trade:K");
        assert_eq!(got[0].items, items);

        // A later event starts a fresh bucket.
        acc.push(trade("K", "e6"));
        acc.flush().await;
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(buckets(&events[1])[0].items, vec![trade("K", "e6")]);
    }

    #[tokio::test]
    async fn separate_keys_separate_buckets() {
        let sink = Arc::new(Capture::default());
        let acc = EventAccumulator::new(sink.clone(), Duration::from_secs(1));
        acc.push(trade("b", "x"));
        acc.push(trade("a", "y"));
        acc.push(trade("b", "z"));
        assert_eq!(acc.flush().await, 2);
        let events = sink.events();
        let got = buckets(&events[0]);
        assert_eq!(got[0].items.len(), 1);
        assert_eq!(got[1].items.len(), 2);
    }

    #[tokio::test]
    async fn unkeyed_payloads_are_rejected_and_empty_flush_is_silent() {
        let sink = Arc::new(Capture::default());
        let acc = EventAccumulator::new(sink.clone(), Duration::from_secs(1));
        assert!(!acc.push(EventPayload::PlayerLeft { player_id: 1 }));
        assert_eq!(acc.flush().await, 0);
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn delivery_failure_is_dropped() {
        let sink = Arc::new(Capture {
            fail: true,
            ..Capture::default()
        });
        let acc = EventAccumulator::new(sink, Duration::from_secs(1));
        acc.push(trade("K", "e1"));
        assert_eq!(acc.flush().await, 1);
        assert_eq!(acc.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_flushes_each_window_and_stop_flushes_the_rest() {
        let sink = Arc::new(Capture::default());
        let acc = EventAccumulator::new(sink.clone(), Duration::from_millis(1000));
        acc.start();

        acc.push(trade("K", "e1"));
        time::sleep(Duration::from_millis(500)).await;
        acc.push(trade("K", "e2"));
        assert!(sink.events().is_empty());

        time::sleep(Duration::from_millis(600)).await;
        assert_eq!(sink.events().len(), 1);
        assert_eq!(buckets(&sink.events()[0])[0].items.len(), 2);

        acc.push(trade("K", "e3"));
        acc.stop().await;
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(buckets(&events[1])[0].items, vec![trade("K", "e3")]);
    }

    #[tokio::test]
    async fn custom_key_fn() {
        let sink = Arc::new(Capture::default());
        let key_fn: KeyFn = Arc::new(|p: &EventPayload| match p {
            EventPayload::ChatMessage { author, .. } => Some(AccumulationKey::new(author.clone())),
            _ => None,
        });
        let acc = EventAccumulator::with_key_fn(sink.clone(), Duration::from_secs(1), key_fn);
        assert!(acc.push(EventPayload::ChatMessage {
            player_id: None,
            author: "ana".into(),
            text: "hi".into(),
        }));
        assert!(!acc.push(trade("K", "e1")));
    }
}
