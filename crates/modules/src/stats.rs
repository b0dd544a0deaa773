//! Per-module counters.

use std::{
    collections::VecDeque,
    sync::{
        Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use tokio::time::Instant;

const OPS_WINDOW: Duration = Duration::from_secs(60);

/// Counters for one runner. The operations-per-minute figure is a sliding
/// window over pass start times.
#[derive(Default)]
pub struct ModuleStats {
    passes: AtomicU64,
    errors: AtomicU64,
    panics: AtomicU64,
    coalesced: AtomicU64,
    recent: Mutex<VecDeque<Instant>>,
}

/// Point-in-time copy of [`ModuleStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub passes: u64,
    pub errors: u64,
    pub panics: u64,
    pub coalesced: u64,
    pub ops_per_minute: usize,
}

impl ModuleStats {
    pub(crate) fn record_pass(&self) {
        self.passes.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        let mut recent = self.recent.lock().unwrap_or_else(|e| e.into_inner());
        prune(&mut recent, now);
        recent.push_back(now);
    }

    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_panic(&self) {
        self.panics.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    /// Passes started in the last minute.
    pub fn ops_per_minute(&self) -> usize {
        let mut recent = self.recent.lock().unwrap_or_else(|e| e.into_inner());
        prune(&mut recent, Instant::now());
        recent.len()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            passes: self.passes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            panics: self.panics.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            ops_per_minute: self.ops_per_minute(),
        }
    }
}

fn prune(recent: &mut VecDeque<Instant>, now: Instant) {
    while recent
        .front()
        .is_some_and(|&ts| now.duration_since(ts) >= OPS_WINDOW)
    {
        recent.pop_front();
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn ops_window_slides() {
        let stats = ModuleStats::default();
        stats.record_pass();
        tokio::time::sleep(Duration::from_secs(30)).await;
        stats.record_pass();
        stats.record_error();
        assert_eq!(stats.ops_per_minute(), 2);

        tokio::time::sleep(Duration::from_secs(31)).await;
        let snap = stats.snapshot();
        assert_eq!(snap.ops_per_minute, 1);
        assert_eq!(snap.passes, 2);
        assert_eq!(snap.errors, 1);
    }
}
