//! Config schema types.

use std::{collections::BTreeMap, time::Duration};

use {
    herald_channels::Target,
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeraldConfig {
    pub dispatch: DispatchConfig,
    pub metrics: MetricsConfig,
    /// Per-module settings keyed by module name.
    pub modules: BTreeMap<String, ModuleConfig>,
}

impl HeraldConfig {
    pub fn module(&self, name: &str) -> Option<&ModuleConfig> {
        self.modules.get(name)
    }

    /// Debounce delay for a module: its own override, else the global default.
    pub fn debounce_for(&self, name: &str) -> Duration {
        let ms = self
            .module(name)
            .and_then(|m| m.debounce_ms)
            .unwrap_or(self.dispatch.debounce_ms);
        Duration::from_millis(ms)
    }

    /// Syntactically valid targets configured for a module. Empty when the
    /// module is missing or disabled.
    pub fn targets_for(&self, name: &str) -> Vec<Target> {
        self.module(name)
            .filter(|m| m.enabled)
            .map(|m| Target::parse_all(&m.targets).0)
            .unwrap_or_default()
    }
}

/// Event dispatch timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Delay before a burst of high-frequency events runs one pass. Defaults to 2000.
    pub debounce_ms: u64,
    /// Window of the micro-batch accumulator. Defaults to 1000.
    pub accumulator_flush_ms: u64,
}

impl DispatchConfig {
    pub fn accumulator_flush(&self) -> Duration {
        Duration::from_millis(self.accumulator_flush_ms)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 2_000,
            accumulator_flush_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// Labels attached to every exported metric.
    pub labels: BTreeMap<String, String>,
}

/// Settings for one module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleConfig {
    pub enabled: bool,
    /// Target strings, `channel:<id>` or `dm:<id>`.
    pub targets: Vec<String>,
    pub debounce_ms: Option<u64>,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            targets: Vec::new(),
            debounce_ms: None,
        }
    }
}
