//! Single-flight, debounced execution of one module.

use std::{
    any::Any,
    panic::AssertUnwindSafe,
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, Ordering},
    },
};

use {
    async_trait::async_trait,
    futures::FutureExt,
    herald_config::{ConfigHandle, HeraldConfig},
    herald_events::{Event, EventSubscriber, TriggerMask},
    tokio::{
        sync::Mutex,
        task::JoinHandle,
        time::Instant,
    },
    tracing::{debug, error, info, warn},
};

#[cfg(feature = "metrics")]
use herald_metrics::{counter, gauge, histogram, labels, modules as module_metrics};

use crate::{
    module::{Lifecycle, Module},
    stats::ModuleStats,
};

struct Slot {
    module: Box<dyn Module>,
    state: Lifecycle,
    debounce: Option<JoinHandle<()>>,
    last_run_at: Option<Instant>,
}

impl Slot {
    fn disarm(&mut self) {
        if let Some(timer) = self.debounce.take() {
            timer.abort();
        }
    }
}

/// Drives one [`Module`]: lifecycle, single-flight passes, debouncing and
/// failure containment.
///
/// All module calls happen under one `tokio::sync::Mutex`, held across the
/// module's awaits, so passes never overlap. The `running` flag mirrors the
/// lifecycle so disabled runners return without locking. Once
/// [`shutdown`](Self::shutdown) has run the runner stays stopped.
pub struct ModuleRunner {
    name: String,
    triggers: TriggerMask,
    high_frequency: TriggerMask,
    config: ConfigHandle,
    slot: Mutex<Slot>,
    running: AtomicBool,
    shutting_down: AtomicBool,
    stats: ModuleStats,
    this: Weak<Self>,
}

impl ModuleRunner {
    pub fn new(module: Box<dyn Module>, config: ConfigHandle) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            name: module.name().to_string(),
            triggers: module.triggers(),
            high_frequency: module.high_frequency(),
            config,
            slot: Mutex::new(Slot {
                module,
                state: Lifecycle::Stopped,
                debounce: None,
                last_run_at: None,
            }),
            running: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
            stats: ModuleStats::default(),
            this: this.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> &ModuleStats {
        &self.stats
    }

    pub async fn lifecycle(&self) -> Lifecycle {
        self.slot.lock().await.state
    }

    /// Start time of the most recent pass.
    pub async fn last_run_at(&self) -> Option<Instant> {
        self.slot.lock().await.last_run_at
    }

    /// Whether a debounce timer is armed.
    pub async fn debounce_pending(&self) -> bool {
        self.slot.lock().await.debounce.is_some()
    }

    /// Bring the lifecycle in line with `should_run` under the current
    /// configuration. Returns the resulting state.
    pub async fn evaluate(&self) -> Lifecycle {
        let config = self.config.current();
        let mut slot = self.slot.lock().await;
        if self.is_shut_down() {
            return slot.state;
        }
        let wanted = slot.module.should_run(&config);
        match (slot.state, wanted) {
            (Lifecycle::Stopped, true) => self.start_locked(&mut slot, &config).await,
            (Lifecycle::Running, false) => self.stop_locked(&mut slot).await,
            (Lifecycle::Running, true) => slot.module.config_changed(&config).await,
            _ => {},
        }
        slot.state
    }

    /// Drain any in-flight pass, cancel the debounce timer and stop the module.
    /// Terminal: later events and configuration changes are ignored.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        let mut slot = self.slot.lock().await;
        slot.disarm();
        if matches!(slot.state, Lifecycle::Running | Lifecycle::Starting) {
            self.stop_locked(&mut slot).await;
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Handle one event.
    pub async fn update(&self, event: &Event) {
        if self.is_shut_down() {
            return;
        }
        if event.kind.intersects(TriggerMask::CONFIG_CHANGED) {
            self.evaluate().await;
        }
        if !event.kind.intersects(self.triggers) {
            return;
        }
        if !self.is_running() {
            return;
        }

        let mut slot = self.slot.lock().await;
        if slot.state != Lifecycle::Running {
            return;
        }

        // Every delivered event is observed, even one that only joins a
        // pending debounce.
        if AssertUnwindSafe(slot.module.observe(event))
            .catch_unwind()
            .await
            .is_err()
        {
            self.stats.record_panic();
            error!(module = %self.name, trigger = %event.kind, "module panicked while observing");
        }

        if slot.debounce.is_some() {
            debug!(module = %self.name, trigger = %event.kind, "coalesced into pending debounce");
            self.stats.record_coalesced();
            #[cfg(feature = "metrics")]
            counter!(module_metrics::DEBOUNCE_COALESCED_TOTAL, labels::MODULE => self.name.clone())
                .increment(1);
            return;
        }

        if event.kind.intersects(self.high_frequency) {
            self.arm_debounce(&mut slot);
            return;
        }

        self.run_pass(&mut slot, event.kind, event).await;
    }

    fn arm_debounce(&self, slot: &mut Slot) {
        let delay = self.config.current().debounce_for(&self.name);
        let runner = self.this.clone();
        debug!(module = %self.name, delay_ms = delay.as_millis() as u64, "debounce armed");
        slot.debounce = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(runner) = runner.upgrade() {
                runner.fire_debounce().await;
            }
        }));
    }

    async fn fire_debounce(&self) {
        let mut slot = self.slot.lock().await;
        // Our own handle; dropping it detaches.
        slot.debounce = None;
        if slot.state != Lifecycle::Running || self.is_shut_down() {
            return;
        }
        let event = Event::timer();
        self.run_pass(&mut slot, TriggerMask::TIMER, &event).await;
    }

    async fn run_pass(&self, slot: &mut Slot, trigger: TriggerMask, event: &Event) {
        let started = Instant::now();
        slot.last_run_at = Some(started);
        self.stats.record_pass();

        let outcome = AssertUnwindSafe(slot.module.update_internal(trigger, event))
            .catch_unwind()
            .await;

        #[cfg(feature = "metrics")]
        {
            counter!(module_metrics::UPDATES_TOTAL, labels::MODULE => self.name.clone())
                .increment(1);
            histogram!(module_metrics::UPDATE_DURATION_SECONDS, labels::MODULE => self.name.clone())
                .record(started.elapsed().as_secs_f64());
        }

        match outcome {
            Ok(Ok(())) => {
                debug!(
                    module = %self.name,
                    %trigger,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "update pass finished"
                );
            },
            Ok(Err(e)) => {
                warn!(module = %self.name, %trigger, error = %e, "update pass failed");
                self.stats.record_error();
                #[cfg(feature = "metrics")]
                counter!(module_metrics::UPDATE_ERRORS_TOTAL, labels::MODULE => self.name.clone(), labels::ERROR_TYPE => "error")
                    .increment(1);
            },
            Err(panic) => {
                error!(
                    module = %self.name,
                    %trigger,
                    panic = panic_message(panic.as_ref()),
                    "update pass panicked"
                );
                self.stats.record_panic();
                #[cfg(feature = "metrics")]
                counter!(module_metrics::UPDATE_ERRORS_TOTAL, labels::MODULE => self.name.clone(), labels::ERROR_TYPE => "panic")
                    .increment(1);
            },
        }
    }

    async fn start_locked(&self, slot: &mut Slot, config: &HeraldConfig) {
        slot.state = Lifecycle::Starting;
        let outcome = AssertUnwindSafe(slot.module.initialize(config))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(())) => {
                slot.state = Lifecycle::Running;
                self.running.store(true, Ordering::SeqCst);
                info!(module = %self.name, triggers = %self.triggers, "module started");
                #[cfg(feature = "metrics")]
                gauge!(module_metrics::RUNNING).increment(1.0);
            },
            Ok(Err(e)) => {
                slot.state = Lifecycle::Stopped;
                self.stats.record_error();
                warn!(module = %self.name, error = %e, "module failed to initialize");
            },
            Err(panic) => {
                slot.state = Lifecycle::Stopped;
                self.stats.record_panic();
                error!(
                    module = %self.name,
                    panic = panic_message(panic.as_ref()),
                    "module panicked during initialize"
                );
            },
        }
    }

    async fn stop_locked(&self, slot: &mut Slot) {
        let was_running = slot.state == Lifecycle::Running;
        slot.state = Lifecycle::Stopping;
        self.running.store(false, Ordering::SeqCst);
        slot.disarm();
        if AssertUnwindSafe(slot.module.shutdown())
            .catch_unwind()
            .await
            .is_err()
        {
            self.stats.record_panic();
            error!(module = %self.name, "module panicked during shutdown");
        }
        slot.state = Lifecycle::Stopped;
        info!(module = %self.name, was_running, "module stopped");
        #[cfg(feature = "metrics")]
        if was_running {
            gauge!(module_metrics::RUNNING).decrement(1.0);
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

#[async_trait]
impl EventSubscriber for ModuleRunner {
    fn name(&self) -> &str {
        &self.name
    }

    /// Module triggers plus `CONFIG_CHANGED`, which always drives lifecycle.
    fn mask(&self) -> TriggerMask {
        self.triggers | TriggerMask::CONFIG_CHANGED
    }

    async fn update(&self, event: &Event) {
        ModuleRunner::update(self, event).await;
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        herald_config::ModuleConfig,
        herald_events::EventPayload,
        std::{
            sync::{
                Mutex as StdMutex,
                atomic::AtomicUsize,
            },
            time::Duration,
        },
    };

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Mode {
        Ok,
        Fail,
        Panic,
    }

    #[derive(Default)]
    struct Probe {
        active: AtomicUsize,
        max_active: AtomicUsize,
        runs: StdMutex<Vec<TriggerMask>>,
        observed: StdMutex<Vec<TriggerMask>>,
        inits: AtomicUsize,
        shutdowns: AtomicUsize,
    }

    impl Probe {
        fn runs(&self) -> Vec<TriggerMask> {
            self.runs.lock().unwrap().clone()
        }

        fn observed(&self) -> Vec<TriggerMask> {
            self.observed.lock().unwrap().clone()
        }
    }

    struct ProbeModule {
        probe: Arc<Probe>,
        mode: Mode,
        work: Duration,
    }

    #[async_trait]
    impl Module for ProbeModule {
        fn name(&self) -> &str {
            "probe"
        }

        fn triggers(&self) -> TriggerMask {
            TriggerMask::PLAYER_JOINED | TriggerMask::ENTITY_CHANGED | TriggerMask::TIMER
        }

        fn high_frequency(&self) -> TriggerMask {
            TriggerMask::ENTITY_CHANGED
        }

        async fn initialize(&mut self, _config: &HeraldConfig) -> anyhow::Result<()> {
            self.probe.inits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn observe(&mut self, event: &Event) {
            self.probe.observed.lock().unwrap().push(event.kind);
        }

        async fn update_internal(
            &mut self,
            trigger: TriggerMask,
            _event: &Event,
        ) -> anyhow::Result<()> {
            let now = self.probe.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.probe.max_active.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.work).await;
            self.probe.runs.lock().unwrap().push(trigger);
            self.probe.active.fetch_sub(1, Ordering::SeqCst);
            match self.mode {
                Mode::Ok => Ok(()),
                Mode::Fail => anyhow::bail!("remote unavailable"),
                Mode::Panic => panic!("boom"),
            }
        }

        async fn shutdown(&mut self) {
            self.probe.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn config(enabled: bool) -> HeraldConfig {
        let mut cfg = HeraldConfig::default();
        cfg.modules.insert("probe".into(), ModuleConfig {
            enabled,
            ..Default::default()
        });
        cfg
    }

    async fn runner(mode: Mode, enabled: bool) -> (Arc<ModuleRunner>, Arc<Probe>, ConfigHandle) {
        let probe = Arc::new(Probe::default());
        let handle = ConfigHandle::new(config(enabled));
        let runner = ModuleRunner::new(
            Box::new(ProbeModule {
                probe: probe.clone(),
                mode,
                work: Duration::from_millis(10),
            }),
            handle.clone(),
        );
        runner.evaluate().await;
        (runner, probe, handle)
    }

    fn joined() -> Event {
        Event::new(EventPayload::PlayerJoined {
            player_id: 1,
            name: "Ana".into(),
        })
    }

    fn entity() -> Event {
        Event::new(EventPayload::EntityChanged {
            entity_id: 9,
            owner_id: None,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_updates_never_overlap() {
        let (runner, probe, _) = runner(Mode::Ok, true).await;
        let event = joined();
        futures::future::join_all((0..8).map(|_| runner.update(&event))).await;
        assert_eq!(probe.runs().len(), 8);
        assert_eq!(probe.max_active.load(Ordering::SeqCst), 1);
        assert_eq!(runner.stats().snapshot().passes, 8);
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_high_frequency_events_runs_one_timer_pass() {
        let (runner, probe, _) = runner(Mode::Ok, true).await;
        for _ in 0..5 {
            runner.update(&entity()).await;
        }
        // Non-high-frequency events are swallowed while the timer is armed.
        runner.update(&joined()).await;
        assert!(probe.runs().is_empty());
        assert!(runner.debounce_pending().await);

        tokio::time::sleep(Duration::from_millis(1_900)).await;
        assert!(probe.runs().is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(probe.runs(), vec![TriggerMask::TIMER]);
        assert!(!runner.debounce_pending().await);
        assert_eq!(runner.stats().snapshot().coalesced, 5);

        runner.update(&joined()).await;
        assert_eq!(probe.runs(), vec![TriggerMask::TIMER, TriggerMask::PLAYER_JOINED]);
    }

    #[tokio::test(start_paused = true)]
    async fn coalesced_events_are_still_observed() {
        let (runner, probe, _) = runner(Mode::Ok, true).await;
        runner.update(&entity()).await;
        runner.update(&joined()).await;
        runner.update(&entity()).await;
        assert!(probe.runs().is_empty());
        assert_eq!(probe.observed(), vec![
            TriggerMask::ENTITY_CHANGED,
            TriggerMask::PLAYER_JOINED,
            TriggerMask::ENTITY_CHANGED,
        ]);

        tokio::time::sleep(Duration::from_millis(2_100)).await;
        assert_eq!(probe.runs(), vec![TriggerMask::TIMER]);
        // The timer pass is not an observed event.
        assert_eq!(probe.observed().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn per_module_debounce_override() {
        let (runner, probe, handle) = runner(Mode::Ok, true).await;
        let mut cfg = config(true);
        cfg.modules.get_mut("probe").unwrap().debounce_ms = Some(500);
        handle.replace(cfg);

        runner.update(&entity()).await;
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(probe.runs(), vec![TriggerMask::TIMER]);
    }

    #[tokio::test]
    async fn disabled_module_has_no_side_effects() {
        let (runner, probe, _) = runner(Mode::Ok, false).await;
        assert_eq!(runner.lifecycle().await, Lifecycle::Stopped);
        runner.update(&joined()).await;
        runner.update(&entity()).await;
        assert!(probe.runs().is_empty());
        assert!(!runner.debounce_pending().await);
        assert_eq!(probe.inits.load(Ordering::SeqCst), 0);
    }

    #[rstest::rstest]
    #[case(Mode::Fail, 1, 0)]
    #[case(Mode::Panic, 0, 1)]
    #[tokio::test(start_paused = true)]
    async fn failures_are_contained(
        #[case] mode: Mode,
        #[case] errors: u64,
        #[case] panics: u64,
    ) {
        let (runner, probe, _) = runner(mode, true).await;
        runner.update(&joined()).await;
        runner.update(&joined()).await;

        let snap = runner.stats().snapshot();
        assert_eq!(snap.passes, 2);
        assert_eq!(snap.errors, errors * 2);
        assert_eq!(snap.panics, panics * 2);
        assert_eq!(probe.runs().len(), 2);
        assert!(runner.is_running());
    }

    #[tokio::test]
    async fn config_changes_drive_lifecycle() {
        let (runner, probe, handle) = runner(Mode::Ok, true).await;
        assert_eq!(runner.lifecycle().await, Lifecycle::Running);
        assert_eq!(probe.inits.load(Ordering::SeqCst), 1);

        handle.replace(config(false));
        runner.update(&Event::config_changed()).await;
        assert_eq!(runner.lifecycle().await, Lifecycle::Stopped);
        assert_eq!(probe.shutdowns.load(Ordering::SeqCst), 1);

        handle.replace(config(true));
        runner.update(&Event::config_changed()).await;
        assert!(runner.is_running());
        assert_eq!(probe.inits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn shutdown_is_terminal() {
        let (runner, probe, _) = runner(Mode::Ok, true).await;
        runner.shutdown().await;
        assert_eq!(runner.lifecycle().await, Lifecycle::Stopped);
        assert!(runner.is_shut_down());

        runner.update(&Event::config_changed()).await;
        assert_eq!(runner.evaluate().await, Lifecycle::Stopped);
        runner.update(&joined()).await;

        assert_eq!(runner.lifecycle().await, Lifecycle::Stopped);
        assert!(!runner.is_running());
        assert_eq!(probe.inits.load(Ordering::SeqCst), 1);
        assert!(probe.runs().is_empty());
        assert!(probe.observed().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_pending_timer() {
        let (runner, probe, _) = runner(Mode::Ok, true).await;
        runner.update(&entity()).await;
        runner.shutdown().await;
        assert_eq!(runner.lifecycle().await, Lifecycle::Stopped);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(probe.runs().is_empty());
        assert_eq!(probe.shutdowns.load(Ordering::SeqCst), 1);
        assert_eq!(
            EventSubscriber::mask(runner.as_ref()),
            TriggerMask::PLAYER_JOINED
                | TriggerMask::ENTITY_CHANGED
                | TriggerMask::TIMER
                | TriggerMask::CONFIG_CHANGED
        );
    }
}
