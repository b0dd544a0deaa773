use std::sync::Arc;

use tokio::sync::watch;

use crate::schema::HeraldConfig;

/// Shared, swappable view of the current configuration.
///
/// Readers take a cheap `Arc` snapshot; writers replace the whole value.
/// Watchers are woken on every replacement.
#[derive(Clone)]
pub struct ConfigHandle {
    tx: Arc<watch::Sender<Arc<HeraldConfig>>>,
}

impl ConfigHandle {
    pub fn new(config: HeraldConfig) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(config));
        Self { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> Arc<HeraldConfig> {
        Arc::clone(&self.tx.borrow())
    }

    /// Install a new configuration. Returns `false` when it equals the current one.
    pub fn replace(&self, config: HeraldConfig) -> bool {
        self.tx.send_if_modified(|current| {
            if **current == config {
                return false;
            }
            *current = Arc::new(config);
            true
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<HeraldConfig>> {
        self.tx.subscribe()
    }
}

impl Default for ConfigHandle {
    fn default() -> Self {
        Self::new(HeraldConfig::default())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::schema::ModuleConfig};

    #[test]
    fn replace_reports_changes_only() {
        let handle = ConfigHandle::default();
        let mut rx = handle.subscribe();
        assert!(!handle.replace(HeraldConfig::default()));
        assert!(!rx.has_changed().unwrap());

        let mut next = HeraldConfig::default();
        next.modules
            .insert("players".into(), ModuleConfig::default());
        assert!(handle.replace(next.clone()));
        assert!(rx.has_changed().unwrap());
        assert_eq!(*handle.current(), next);
    }
}
