use std::fmt;

use {
    async_trait::async_trait,
    herald_config::HeraldConfig,
    herald_events::{Event, TriggerMask},
};

/// Business logic driven by events.
///
/// Runners call every method while holding the module lock, so
/// implementations never see concurrent calls and may keep plain mutable
/// state.
#[async_trait]
pub trait Module: Send {
    /// Stable identity, used as the subscriber name and the config key.
    fn name(&self) -> &str;

    /// Event kinds this module reacts to.
    fn triggers(&self) -> TriggerMask;

    /// Kinds that arrive in bursts. They arm a debounce timer instead of
    /// running a pass; the timer later runs one pass with `TIMER`.
    fn high_frequency(&self) -> TriggerMask {
        TriggerMask::NONE
    }

    /// Whether the module should be running under `config`. Must be cheap
    /// and idempotent.
    fn should_run(&self, config: &HeraldConfig) -> bool {
        config.module(self.name()).is_some_and(|m| m.enabled)
    }

    async fn initialize(&mut self, _config: &HeraldConfig) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called on a running module when configuration changed and it should
    /// keep running.
    async fn config_changed(&mut self, _config: &HeraldConfig) {}

    /// Called for every delivered trigger event while running, before the
    /// runner decides whether to run, debounce or coalesce. Events folded
    /// into a pending debounce never reach `update_internal`, so state that
    /// must not be lost belongs here.
    async fn observe(&mut self, _event: &Event) {}

    /// One pass of business logic.
    async fn update_internal(&mut self, trigger: TriggerMask, event: &Event)
    -> anyhow::Result<()>;

    async fn shutdown(&mut self) {}
}

/// Runner lifecycle. Transitions happen under the module lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl Lifecycle {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
