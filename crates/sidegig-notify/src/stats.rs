use std::sync::{Arc, RwLock};

/// Counters for the sync runtime. Staleness drops (old subscription epochs,
/// superseded snapshot generations) are expected steady-state behavior, so
/// they are counted here instead of surfaced as errors.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncStats {
    /// Row changes applied to the store (including idempotent redeliveries).
    pub events_applied: u64,
    /// Row changes held back while a bootstrap fetch was outstanding.
    pub events_buffered: u64,
    /// Row changes dropped because they carried an old subscription epoch.
    pub stale_epoch_drops: u64,
    /// Row changes dropped because the replay buffer overflowed.
    pub buffer_overflow_drops: u64,
    /// Mutation confirmations discarded against a newer snapshot generation.
    pub stale_generation_drops: u64,
    /// Snapshots installed.
    pub bootstraps: u64,
    pub bootstrap_failures: u64,
    /// Superseded fetch results (an older fetch landing after a newer one
    /// started) that were thrown away.
    pub stale_fetch_drops: u64,
    pub mutations_confirmed: u64,
    /// Failed confirmations that rolled the optimistic change back.
    pub rollbacks: u64,
    /// Subscription cycles that went active after a previous active cycle.
    pub reconnects: u64,
    pub alerts_fired: u64,
}

impl SyncStats {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Thread-safe wrapper so the engine can record while handles read.
#[derive(Debug, Clone)]
pub struct SharedSyncStats {
    inner: Arc<RwLock<SyncStats>>,
}

impl Default for SharedSyncStats {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedSyncStats {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(SyncStats::new())),
        }
    }

    pub(crate) fn record(&self, update: impl FnOnce(&mut SyncStats)) {
        if let Ok(mut stats) = self.inner.write() {
            update(&mut stats);
        }
    }

    pub fn snapshot(&self) -> SyncStats {
        self.inner.read().map(|s| s.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_snapshot() {
        let shared = SharedSyncStats::new();
        shared.record(|s| s.events_applied += 1);
        shared.record(|s| {
            s.events_applied += 1;
            s.bootstraps += 1;
        });

        let snapshot = shared.snapshot();
        assert_eq!(snapshot.events_applied, 2);
        assert_eq!(snapshot.bootstraps, 1);
        assert_eq!(snapshot.rollbacks, 0);
    }
}
