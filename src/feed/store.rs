use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::types::{FailureManifest, Opportunity, ValidatorView};

/// Manifest entry name used for the validator feed.
pub const VALIDATOR_SOURCE: &str = "validators";

/// Everything one refresh cycle produced. Replaced wholesale, never mutated.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FeedSnapshot {
    pub cycle: u64,
    pub refreshed_at_ms: u64,
    pub opportunities: Vec<Opportunity>,
    pub validators: Vec<ValidatorView>,
    pub manifest: FailureManifest,
    /// Sources whose records were carried over from an earlier cycle because
    /// they delivered nothing this time.
    pub stale_sources: Vec<String>,
    /// For each stale source, `refreshed_at_ms` of the last cycle it actually delivered in.
    pub stale_since_ms: BTreeMap<String, u64>,
}

pub struct FeedStore {
    latest: RwLock<Option<Arc<FeedSnapshot>>>,
    max_stale_age: Duration,
}

impl FeedStore {
    /// Records of a failed source are carried forward for at most `max_stale_age`.
    pub fn new(max_stale_age: Duration) -> Arc<Self> {
        Arc::new(Self {
            latest: RwLock::new(None),
            max_stale_age,
        })
    }

    pub fn latest(&self) -> Option<Arc<FeedSnapshot>> {
        self.latest.read().ok().and_then(|guard| guard.clone())
    }

    /// Publish a new snapshot. A failed source that produced no records keeps its
    /// previous records (listed in `stale_sources`) instead of vanishing from the feed,
    /// until they are older than the store's max stale age.
    pub fn publish(&self, mut next: FeedSnapshot) -> Arc<FeedSnapshot> {
        if let Some(prev) = self.latest() {
            carry_forward(&prev, &mut next, self.max_stale_age);
        }
        let snapshot = Arc::new(next);
        match self.latest.write() {
            Ok(mut guard) => *guard = Some(Arc::clone(&snapshot)),
            Err(e) => warn!("Feed store lock poisoned, snapshot not published: {e}"),
        }
        snapshot
    }
}

fn carry_forward(prev: &FeedSnapshot, next: &mut FeedSnapshot, max_age: Duration) {
    let failed: Vec<String> = next
        .manifest
        .failed_sources()
        .into_iter()
        .map(str::to_string)
        .collect();
    for source in failed {
        let since_ms = prev.stale_since_ms.get(&source).copied().unwrap_or(prev.refreshed_at_ms);
        let age_ms = next.refreshed_at_ms.saturating_sub(since_ms);

        if source == VALIDATOR_SOURCE {
            if !next.validators.is_empty() || prev.validators.is_empty() {
                continue;
            }
            if age_ms > max_age.as_millis() as u64 {
                warn!(source = %source, age_ms, "Previous records too old, dropping them");
                continue;
            }
            next.validators = prev.validators.clone();
        } else {
            if next.opportunities.iter().any(|o| o.platform == source) {
                continue;
            }
            let carried: Vec<Opportunity> =
                prev.opportunities.iter().filter(|o| o.platform == source).cloned().collect();
            if carried.is_empty() {
                continue;
            }
            if age_ms > max_age.as_millis() as u64 {
                warn!(
                    source = %source,
                    age_ms,
                    records = carried.len(),
                    "Previous records too old, dropping them"
                );
                continue;
            }
            info!(
                source = %source,
                records = carried.len(),
                from_cycle = prev.cycle,
                age_ms,
                "Serving previous records for failed source"
            );
            next.opportunities.extend(carried);
        }
        next.stale_since_ms.insert(source.clone(), since_ms);
        next.stale_sources.push(source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{SourceError, SourceErrorKind};
    use crate::types::OpportunityDraft;

    fn opp(platform: &str, id: &str) -> Opportunity {
        Opportunity::new(OpportunityDraft {
            platform: platform.into(),
            provider_id: id.into(),
            ..Default::default()
        })
    }

    fn store() -> Arc<FeedStore> {
        FeedStore::new(Duration::from_secs(900))
    }

    fn astroport_failed() -> FailureManifest {
        let mut manifest = FailureManifest::new(2);
        manifest.record("astroport", &SourceError::new(SourceErrorKind::Timeout, "slow"));
        manifest
    }

    #[test]
    fn empty_store_has_no_snapshot() {
        assert!(store().latest().is_none());
    }

    #[test]
    fn failed_source_keeps_previous_records() {
        let store = store();
        store.publish(FeedSnapshot {
            cycle: 1,
            opportunities: vec![opp("osmosis", "1"), opp("astroport", "a")],
            manifest: FailureManifest::new(2),
            ..Default::default()
        });

        let snap = store.publish(FeedSnapshot {
            cycle: 2,
            opportunities: vec![opp("osmosis", "2")],
            manifest: astroport_failed(),
            ..Default::default()
        });

        let ids: Vec<_> = snap.opportunities.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["osmosis:2", "astroport:a"]);
        assert_eq!(snap.stale_sources, vec!["astroport"]);
        assert_eq!(store.latest().map(|s| s.cycle), Some(2));
    }

    #[test]
    fn healthy_sources_replace_old_records() {
        let store = store();
        store.publish(FeedSnapshot {
            opportunities: vec![opp("osmosis", "1")],
            ..Default::default()
        });
        let snap = store.publish(FeedSnapshot {
            opportunities: vec![],
            ..Default::default()
        });
        assert!(snap.opportunities.is_empty());
        assert!(snap.stale_sources.is_empty());
    }

    #[test]
    fn stale_records_expire_after_max_age() {
        let store = FeedStore::new(Duration::from_secs(60));
        store.publish(FeedSnapshot {
            cycle: 1,
            refreshed_at_ms: 1_000,
            opportunities: vec![opp("osmosis", "1"), opp("astroport", "a")],
            manifest: FailureManifest::new(2),
            ..Default::default()
        });

        // Failing every cycle; age is measured from cycle 1, not from the previous carry.
        let mut last = None;
        for (cycle, at_ms) in [(2, 31_000), (3, 61_000)] {
            let snap = store.publish(FeedSnapshot {
                cycle,
                refreshed_at_ms: at_ms,
                opportunities: vec![opp("osmosis", "1")],
                manifest: astroport_failed(),
                ..Default::default()
            });
            assert_eq!(snap.stale_sources, vec!["astroport"]);
            assert_eq!(snap.stale_since_ms.get("astroport"), Some(&1_000));
            last = Some(snap);
        }
        assert_eq!(last.map(|s| s.opportunities.len()), Some(2));

        let snap = store.publish(FeedSnapshot {
            cycle: 4,
            refreshed_at_ms: 61_001,
            opportunities: vec![opp("osmosis", "1")],
            manifest: astroport_failed(),
            ..Default::default()
        });
        assert!(snap.stale_sources.is_empty());
        assert!(snap.stale_since_ms.is_empty());
        assert!(snap.opportunities.iter().all(|o| o.platform == "osmosis"));
    }

    #[test]
    fn recovered_source_resets_its_stale_age() {
        let store = FeedStore::new(Duration::from_secs(60));
        store.publish(FeedSnapshot {
            refreshed_at_ms: 1_000,
            opportunities: vec![opp("astroport", "a")],
            ..Default::default()
        });
        store.publish(FeedSnapshot {
            refreshed_at_ms: 50_000,
            manifest: astroport_failed(),
            ..Default::default()
        });
        // Delivers again.
        store.publish(FeedSnapshot {
            refreshed_at_ms: 55_000,
            opportunities: vec![opp("astroport", "b")],
            ..Default::default()
        });
        let snap = store.publish(FeedSnapshot {
            refreshed_at_ms: 100_000,
            manifest: astroport_failed(),
            ..Default::default()
        });
        assert_eq!(snap.stale_since_ms.get("astroport"), Some(&55_000));
        assert_eq!(snap.opportunities[0].id, "astroport:b");
    }
}
