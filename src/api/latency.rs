//! In-memory histogram of refresh-cycle durations.

use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

/// Shared cycle-duration stats. FeedRefresher records, API reads.
/// Values stored in milliseconds.
pub struct LatencyStats {
    inner: Mutex<hdrhistogram::Histogram<u64>>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct LatencySummary {
    pub samples: u64,
    pub p50_ms: Option<u64>,
    pub p95_ms: Option<u64>,
    pub p99_ms: Option<u64>,
    pub max_ms: Option<u64>,
}

impl LatencyStats {
    /// Tracks 1ms to 1h, 3 significant figures.
    pub fn new() -> Self {
        let histogram = hdrhistogram::Histogram::new_with_bounds(1, 3_600_000, 3)
            .expect("valid histogram bounds");
        Self {
            inner: Mutex::new(histogram),
        }
    }

    pub fn record(&self, d: Duration) {
        let ms = d.as_millis().clamp(1, 3_600_000) as u64;
        if let Ok(mut h) = self.inner.lock() {
            let _ = h.record(ms);
        }
    }

    pub fn summary(&self) -> LatencySummary {
        let Ok(h) = self.inner.lock() else {
            return LatencySummary {
                samples: 0,
                p50_ms: None,
                p95_ms: None,
                p99_ms: None,
                max_ms: None,
            };
        };
        if h.len() == 0 {
            return LatencySummary {
                samples: 0,
                p50_ms: None,
                p95_ms: None,
                p99_ms: None,
                max_ms: None,
            };
        }
        LatencySummary {
            samples: h.len(),
            p50_ms: Some(h.value_at_quantile(0.5)),
            p95_ms: Some(h.value_at_quantile(0.95)),
            p99_ms: Some(h.value_at_quantile(0.99)),
            max_ms: Some(h.max()),
        }
    }
}

impl Default for LatencyStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_histogram_has_no_percentiles() {
        let s = LatencyStats::new().summary();
        assert_eq!(s.samples, 0);
        assert_eq!(s.p50_ms, None);
    }

    #[test]
    fn records_cycle_durations() {
        let stats = LatencyStats::new();
        for ms in [100u64, 200, 300, 400, 5_000] {
            stats.record(Duration::from_millis(ms));
        }
        // Sub-millisecond cycles still count.
        stats.record(Duration::from_micros(10));

        let s = stats.summary();
        assert_eq!(s.samples, 6);
        assert!(s.p50_ms.unwrap() >= 100 && s.p50_ms.unwrap() <= 300);
        assert!(s.max_ms.unwrap() >= 4_990);
    }
}
