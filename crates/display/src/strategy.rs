use {
    async_trait::async_trait,
    herald_channels::Target,
    herald_config::HeraldConfig,
    herald_events::{Event, TriggerMask},
};

/// One item a target should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredContentBlock {
    pub sub_tag: String,
    pub content: String,
}

impl DesiredContentBlock {
    pub fn new(sub_tag: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            sub_tag: sub_tag.into(),
            content: content.into(),
        }
    }
}

/// Supplies what a display board shows. The reconciler decides how to get
/// the remote side there.
#[async_trait]
pub trait ContentStrategy: Send + Sync {
    /// Module name; also the config key under `[modules]`.
    fn name(&self) -> &str;

    /// Header tag marking items owned by this board.
    fn base_tag(&self) -> &str;

    fn triggers(&self) -> TriggerMask;

    fn high_frequency(&self) -> TriggerMask {
        TriggerMask::NONE
    }

    /// Configured targets for this board.
    fn targets(&self, config: &HeraldConfig) -> Vec<Target> {
        config.targets_for(self.name())
    }

    /// Defaults to "enabled with at least one valid target".
    fn should_run(&self, config: &HeraldConfig) -> bool {
        !self.targets(config).is_empty()
    }

    /// Fold an event into whatever state the strategy keeps. Called once for
    /// every delivered trigger event, including those coalesced into a
    /// pending debounce; the debounced `TIMER` pass itself is not observed.
    async fn observe(&self, _event: &Event) {}

    /// Blocks the target should show right now, in display order.
    async fn desired_content(&self, target: &Target) -> anyhow::Result<Vec<DesiredContentBlock>>;
}
