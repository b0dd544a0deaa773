//! Composition root: owns the bus, the accumulator, the configuration and
//! every module runner.

use std::sync::Arc;

use {
    herald_config::{ConfigHandle, HeraldConfig},
    herald_events::{
        Event, EventAccumulator, EventBus, EventSink, EventSubscriber, Result, TriggerMask,
    },
    tracing::{debug, info},
};

#[cfg(feature = "metrics")]
use herald_metrics::{config as config_metrics, counter};

use crate::{module::Module, runner::ModuleRunner};

pub struct Host {
    config: ConfigHandle,
    bus: Arc<EventBus>,
    accumulator: Arc<EventAccumulator>,
    runners: Vec<Arc<ModuleRunner>>,
    extra: Vec<String>,
    batched: TriggerMask,
}

impl Host {
    /// Host whose accumulator batches `TRADE_ITEM` events.
    pub fn new(config: ConfigHandle) -> Self {
        Self::with_batched(config, TriggerMask::TRADE_ITEM)
    }

    /// Host that routes the kinds in `batched` through the accumulator.
    /// Payloads of those kinds without a correlation key are published
    /// directly.
    pub fn with_batched(config: ConfigHandle, batched: TriggerMask) -> Self {
        let bus = Arc::new(EventBus::new());
        let period = config.current().dispatch.accumulator_flush();
        let sink: Arc<dyn EventSink> = bus.clone();
        let accumulator = EventAccumulator::new(sink, period);
        Self {
            config,
            bus,
            accumulator,
            runners: Vec::new(),
            extra: Vec::new(),
            batched,
        }
    }

    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn accumulator(&self) -> &Arc<EventAccumulator> {
        &self.accumulator
    }

    pub fn runners(&self) -> &[Arc<ModuleRunner>] {
        &self.runners
    }

    pub fn runner(&self, name: &str) -> Option<&Arc<ModuleRunner>> {
        self.runners.iter().find(|r| r.name() == name)
    }

    /// Wrap `module` in a runner and subscribe it to the bus.
    pub fn register(&mut self, module: Box<dyn Module>) -> Arc<ModuleRunner> {
        let runner = ModuleRunner::new(module, self.config.clone());
        self.bus.subscribe(runner.clone());
        self.runners.push(runner.clone());
        runner
    }

    /// Subscribe a plain listener that is not a module.
    pub fn subscribe(&mut self, subscriber: Arc<dyn EventSubscriber>) {
        self.extra.push(subscriber.name().to_string());
        self.bus.subscribe(subscriber);
    }

    /// Start the accumulator and every module whose `should_run` holds.
    pub async fn start(&self) {
        self.accumulator.start();
        for runner in &self.runners {
            let state = runner.evaluate().await;
            debug!(module = runner.name(), %state, "initial lifecycle evaluation");
        }
        info!(modules = self.runners.len(), "host started");
    }

    /// Feed one occurrence into the system. Returns the number of
    /// subscribers reached, 0 when the event was buffered.
    pub async fn ingest(&self, event: Event) -> Result<usize> {
        if event.kind.intersects(self.batched) && self.accumulator.push(event.payload.clone()) {
            return Ok(0);
        }
        self.bus.publish(event).await
    }

    /// Install a new configuration and announce it with `CONFIG_CHANGED`.
    /// Returns `false` when nothing changed.
    pub async fn reload_config(&self, config: HeraldConfig) -> Result<bool> {
        if !self.config.replace(config) {
            debug!("configuration unchanged");
            return Ok(false);
        }
        #[cfg(feature = "metrics")]
        counter!(config_metrics::RELOADS_TOTAL).increment(1);
        info!("configuration reloaded");
        self.bus.publish(Event::config_changed()).await?;
        Ok(true)
    }

    /// Flush the accumulator, then stop every module.
    pub async fn shutdown(&self) {
        self.accumulator.stop().await;
        futures::future::join_all(self.runners.iter().map(|r| r.shutdown())).await;
        info!("host shut down");
    }

    /// Detach everything from the bus and close it.
    pub fn destroy(&self) {
        for runner in &self.runners {
            self.bus.unsubscribe(runner.name());
        }
        for name in &self.extra {
            self.bus.unsubscribe(name);
        }
        self.bus.close();
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::module::Lifecycle,
        async_trait::async_trait,
        herald_config::ModuleConfig,
        herald_events::EventPayload,
        std::{sync::Mutex, time::Duration},
    };

    struct Ledger {
        name: &'static str,
        triggers: TriggerMask,
        seen: Arc<Mutex<Vec<EventPayload>>>,
    }

    #[async_trait]
    impl Module for Ledger {
        fn name(&self) -> &str {
            self.name
        }

        fn triggers(&self) -> TriggerMask {
            self.triggers
        }

        async fn update_internal(
            &mut self,
            _trigger: TriggerMask,
            event: &Event,
        ) -> anyhow::Result<()> {
            self.seen.lock().unwrap().push(event.payload.clone());
            Ok(())
        }
    }

    fn enabled(names: &[&str]) -> HeraldConfig {
        let mut cfg = HeraldConfig::default();
        for name in names {
            cfg.modules.insert((*name).into(), ModuleConfig::default());
        }
        cfg
    }

    fn trade(tx: &str) -> Event {
        Event::new(EventPayload::TradeItem {
            transaction_id: tx.into(),
            player_id: 1,
            item: "rope".into(),
            quantity: 2,
            price: 5,
        })
    }

    fn ledger(
        host: &mut Host,
        name: &'static str,
        triggers: TriggerMask,
    ) -> Arc<Mutex<Vec<EventPayload>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        host.register(Box::new(Ledger {
            name,
            triggers,
            seen: seen.clone(),
        }));
        seen
    }

    #[tokio::test(start_paused = true)]
    async fn batched_kinds_arrive_aggregated() {
        let mut host = Host::new(ConfigHandle::new(enabled(&["trades"])));
        let seen = ledger(&mut host, "trades", TriggerMask::AGGREGATED | TriggerMask::TRADE_ITEM);
        host.start().await;

        assert_eq!(host.ingest(trade("t1")).await.unwrap(), 0);
        assert_eq!(host.ingest(trade("t1")).await.unwrap(), 0);
        assert!(seen.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        match &seen[0] {
            EventPayload::Aggregated { buckets } => assert_eq!(buckets[0].items.len(), 2),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[tokio::test]
    async fn reload_starts_and_stops_modules() {
        let mut host = Host::new(ConfigHandle::new(enabled(&[])));
        let seen = ledger(&mut host, "chat", TriggerMask::CHAT_MESSAGE);
        host.start().await;
        let runner = host.runner("chat").unwrap().clone();
        assert_eq!(runner.lifecycle().await, Lifecycle::Stopped);

        assert!(host.reload_config(enabled(&["chat"])).await.unwrap());
        assert!(!host.reload_config(enabled(&["chat"])).await.unwrap());
        assert!(runner.is_running());

        let chat = Event::new(EventPayload::ChatMessage {
            player_id: Some(1),
            author: "ana".into(),
            text: "hello".into(),
        });
        assert_eq!(host.ingest(chat.clone()).await.unwrap(), 1);
        assert_eq!(seen.lock().unwrap().len(), 1);

        host.reload_config(enabled(&[])).await.unwrap();
        assert!(!runner.is_running());
        host.ingest(chat).await.unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reload_after_shutdown_keeps_modules_stopped() {
        let mut host = Host::new(ConfigHandle::new(enabled(&["chat"])));
        let seen = ledger(&mut host, "chat", TriggerMask::CHAT_MESSAGE);
        host.start().await;
        host.shutdown().await;

        let mut cfg = enabled(&["chat"]);
        cfg.dispatch.debounce_ms = 750;
        assert!(host.reload_config(cfg).await.unwrap());
        let runner = host.runner("chat").unwrap();
        assert_eq!(runner.lifecycle().await, Lifecycle::Stopped);
        assert!(!runner.is_running());

        host.ingest(Event::new(EventPayload::ChatMessage {
            player_id: None,
            author: "ana".into(),
            text: "late".into(),
        }))
        .await
        .unwrap();
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn shutdown_then_destroy_closes_the_bus() {
        let mut host = Host::new(ConfigHandle::new(enabled(&["chat"])));
        ledger(&mut host, "chat", TriggerMask::CHAT_MESSAGE);
        host.start().await;
        host.shutdown().await;
        assert!(!host.runner("chat").unwrap().is_running());

        host.destroy();
        assert!(host.bus().subscriber_names().is_empty());
        assert!(host.ingest(Event::timer()).await.is_err());
    }
}
