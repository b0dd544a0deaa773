use std::sync::Arc;

use {
    async_trait::async_trait,
    herald_channels::RemoteGateway,
    herald_config::HeraldConfig,
    herald_events::{Event, EventPayload, TriggerMask},
    herald_modules::Module,
    tracing::debug,
};

use crate::{reconciler::DisplayReconciler, strategy::ContentStrategy};

/// A display board: a [`ContentStrategy`] driven by the module runner.
///
/// Every pass reconciles all targets. `ITEM_DELETED` events only drop the
/// tracked entry, and do so even while a debounce is pending. Configuration
/// changes re-resolve targets and then run a pass against the new set.
pub struct DisplayModule<S> {
    reconciler: DisplayReconciler<S>,
}

impl<S: ContentStrategy + 'static> DisplayModule<S> {
    pub fn new(strategy: Arc<S>, gateway: Arc<dyn RemoteGateway>) -> Self {
        Self {
            reconciler: DisplayReconciler::new(strategy, gateway),
        }
    }

    pub fn boxed(strategy: Arc<S>, gateway: Arc<dyn RemoteGateway>) -> Box<dyn Module> {
        Box::new(Self::new(strategy, gateway))
    }

    pub fn reconciler(&self) -> &DisplayReconciler<S> {
        &self.reconciler
    }
}

#[async_trait]
impl<S: ContentStrategy + 'static> Module for DisplayModule<S> {
    fn name(&self) -> &str {
        self.reconciler.strategy().name()
    }

    fn triggers(&self) -> TriggerMask {
        self.reconciler.strategy().triggers() | TriggerMask::ITEM_DELETED | TriggerMask::CONFIG_CHANGED
    }

    fn high_frequency(&self) -> TriggerMask {
        self.reconciler.strategy().high_frequency()
    }

    fn should_run(&self, config: &HeraldConfig) -> bool {
        self.reconciler.strategy().should_run(config)
    }

    async fn initialize(&mut self, config: &HeraldConfig) -> anyhow::Result<()> {
        self.reconciler.refresh_targets(config).await;
        Ok(())
    }

    async fn config_changed(&mut self, config: &HeraldConfig) {
        self.reconciler.refresh_targets(config).await;
    }

    async fn observe(&mut self, event: &Event) {
        if let EventPayload::ItemDeleted { target, item_id } = &event.payload {
            self.reconciler.forget(target, *item_id);
            return;
        }
        let strategy = self.reconciler.strategy();
        if event.kind.intersects(strategy.triggers()) {
            strategy.observe(event).await;
        }
    }

    async fn update_internal(&mut self, trigger: TriggerMask, event: &Event) -> anyhow::Result<()> {
        if matches!(event.payload, EventPayload::ItemDeleted { .. }) {
            return Ok(());
        }

        let report = self.reconciler.run_pass().await;
        debug!(
            board = self.reconciler.strategy().name(),
            %trigger,
            mutations = report.mutations(),
            "board updated"
        );
        Ok(())
    }
}
