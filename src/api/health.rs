//! Shared health state for the /health endpoint.
//! Updated by FeedRefresher, read by the API.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::Serialize;

#[derive(Default)]
pub struct HealthState {
    /// True once the first snapshot has been published.
    pub ready: AtomicBool,
    /// True while a refresh cycle is running.
    pub refreshing: AtomicBool,
    /// Epoch milliseconds of the last published snapshot (0 = none).
    pub last_refresh_at_ms: AtomicU64,
    pub cycles: AtomicU64,
    /// Degraded sources in the last cycle.
    pub degraded_sources: AtomicU64,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct HealthReport {
    pub status: &'static str,
    pub refreshing: bool,
    pub cycles: u64,
    pub last_refresh_at_ms: Option<u64>,
    pub degraded_sources: u64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_refreshing(&self, v: bool) {
        self.refreshing.store(v, Ordering::Relaxed);
    }

    pub fn record_cycle(&self, at_ms: u64, degraded_sources: u64) {
        self.last_refresh_at_ms.store(at_ms, Ordering::Relaxed);
        self.degraded_sources.store(degraded_sources, Ordering::Relaxed);
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.ready.store(true, Ordering::Relaxed);
    }

    pub fn ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    pub fn report(&self) -> HealthReport {
        let degraded_sources = self.degraded_sources.load(Ordering::Relaxed);
        let status = match (self.ready(), degraded_sources) {
            (false, _) => "starting",
            (true, 0) => "ok",
            (true, _) => "degraded",
        };
        let last = self.last_refresh_at_ms.load(Ordering::Relaxed);
        HealthReport {
            status,
            refreshing: self.refreshing.load(Ordering::Relaxed),
            cycles: self.cycles(),
            last_refresh_at_ms: (last > 0).then_some(last),
            degraded_sources,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_follows_cycles() {
        let h = HealthState::new();
        assert_eq!(h.report().status, "starting");
        assert_eq!(h.report().last_refresh_at_ms, None);

        h.record_cycle(1_700_000_000_000, 1);
        assert_eq!(h.report().status, "degraded");

        h.record_cycle(1_700_000_300_000, 0);
        let r = h.report();
        assert_eq!(r.status, "ok");
        assert_eq!(r.cycles, 2);
        assert_eq!(r.last_refresh_at_ms, Some(1_700_000_300_000));
    }
}
