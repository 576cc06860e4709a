use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde_json::Value;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::aggregator::aggregate_until;
use crate::api::{HealthState, LatencyStats};
use crate::cache::TtlCache;
use crate::error::{SourceError, SourceErrorKind};
use crate::feed::{FeedSnapshot, FeedStore, VALIDATOR_SOURCE};
use crate::sources::{SourceAdapter, StakingAdapter, ValidatorFeed};
use crate::types::FailureManifest;

/// Resolves once `rx` reads `true`. A dropped sender never resolves it.
pub fn shutdown_signal(mut rx: watch::Receiver<bool>) -> impl Future<Output = ()> {
    async move {
        let sender_gone = rx.wait_for(|stop| *stop).await.is_err();
        if sender_gone {
            std::future::pending::<()>().await;
        }
    }
}

/// Periodically rebuilds the feed snapshot: every opportunity source plus the
/// validator feed, concurrently.
pub struct FeedRefresher {
    sources: Vec<Arc<dyn SourceAdapter>>,
    validators: Option<Arc<StakingAdapter>>,
    store: Arc<FeedStore>,
    health: Arc<HealthState>,
    latency: Arc<LatencyStats>,
    response_cache: Option<Arc<TtlCache<Value>>>,
    refresh_interval: Duration,
    source_timeout: Duration,
    shutdown: watch::Receiver<bool>,
}

impl FeedRefresher {
    pub fn new(
        sources: Vec<Arc<dyn SourceAdapter>>,
        store: Arc<FeedStore>,
        health: Arc<HealthState>,
        latency: Arc<LatencyStats>,
        refresh_interval: Duration,
        source_timeout: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            sources,
            validators: None,
            store,
            health,
            latency,
            response_cache: None,
            refresh_interval,
            source_timeout,
            shutdown,
        }
    }

    pub fn with_validators(mut self, staking: Arc<StakingAdapter>) -> Self {
        self.validators = Some(staking);
        self
    }

    /// Expired entries of this cache are purged after every cycle.
    pub fn with_response_cache(mut self, cache: Arc<TtlCache<Value>>) -> Self {
        self.response_cache = Some(cache);
        self
    }

    pub async fn run(self) {
        let mut ticker = interval(self.refresh_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // First tick completes immediately.
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown_signal(self.shutdown.clone()) => break,
            }
            if self.refresh_once().await.is_none() {
                break;
            }
        }
        info!("Feed refresher stopped");
    }

    /// One full cycle. `None` when shutdown interrupted it; nothing is published then.
    pub async fn refresh_once(&self) -> Option<Arc<FeedSnapshot>> {
        self.health.set_refreshing(true);
        let started = Instant::now();

        let (aggregated, validator_feed) = tokio::join!(
            aggregate_until(
                &self.sources,
                self.source_timeout,
                shutdown_signal(self.shutdown.clone()),
            ),
            self.validator_feed(),
        );
        self.health.set_refreshing(false);

        let (opportunities, mut manifest) = aggregated?;
        let validators = match validator_feed? {
            Some(feed) => {
                let mut validator_manifest = FailureManifest::new(1);
                if let Some(err) = &feed.error {
                    validator_manifest.record(VALIDATOR_SOURCE, err);
                }
                manifest.merge(validator_manifest);
                feed.validators
            }
            None => Vec::new(),
        };

        let refreshed_at_ms = epoch_ms();
        let snapshot = self.store.publish(FeedSnapshot {
            cycle: self.health.cycles() + 1,
            refreshed_at_ms,
            opportunities,
            validators,
            manifest,
            stale_sources: Vec::new(),
            stale_since_ms: Default::default(),
        });

        let elapsed = started.elapsed();
        self.latency.record(elapsed);
        self.health.record_cycle(refreshed_at_ms, snapshot.manifest.failures.len() as u64);
        if let Some(cache) = &self.response_cache {
            let purged = cache.purge_expired();
            let stats = cache.stats();
            debug!(
                purged,
                size = stats.size,
                hits = stats.hits,
                misses = stats.misses,
                evictions = stats.evictions,
                "Response cache"
            );
        }

        info!(
            cycle = snapshot.cycle,
            opportunities = snapshot.opportunities.len(),
            validators = snapshot.validators.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Feed refreshed: {}",
            snapshot.manifest.summary()
        );
        if !snapshot.stale_sources.is_empty() {
            warn!(stale = ?snapshot.stale_sources, "Serving stale records for failed sources");
        }
        Some(snapshot)
    }

    /// `None` if shutdown fired; `Some(None)` when no validator source is configured.
    async fn validator_feed(&self) -> Option<Option<ValidatorFeed>> {
        let Some(staking) = &self.validators else {
            return Some(None);
        };
        tokio::select! {
            biased;
            _ = shutdown_signal(self.shutdown.clone()) => None,
            feed = tokio::time::timeout(self.source_timeout, staking.fetch_validator_feed()) => {
                Some(Some(feed.unwrap_or_else(|_| ValidatorFeed {
                    validators: Vec::new(),
                    error: Some(SourceError::new(
                        SourceErrorKind::Timeout,
                        format!("no result within {}ms", self.source_timeout.as_millis()),
                    )),
                })))
            }
        }
    }
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::metrics::slashing::BatchPolicy;
    use crate::sources::staking::StakingParams;
    use crate::testkit::{
        bonded_validators, delayed_fetcher_with, fetcher_with, not_found, StaticSource,
    };
    use serde_json::json;

    struct Harness {
        store: Arc<FeedStore>,
        health: Arc<HealthState>,
        latency: Arc<LatencyStats>,
        stop: watch::Sender<bool>,
    }

    fn refresher(sources: Vec<Arc<dyn SourceAdapter>>) -> (FeedRefresher, Harness) {
        let (stop, rx) = watch::channel(false);
        let h = Harness {
            store: FeedStore::new(Duration::from_secs(900)),
            health: Arc::new(HealthState::new()),
            latency: Arc::new(LatencyStats::new()),
            stop,
        };
        let r = FeedRefresher::new(
            sources,
            Arc::clone(&h.store),
            Arc::clone(&h.health),
            Arc::clone(&h.latency),
            Duration::from_secs(3600),
            Duration::from_secs(2),
            rx,
        );
        (r, h)
    }

    #[tokio::test]
    async fn first_tick_is_immediate_and_shutdown_stops_the_loop() {
        let (r, h) = refresher(vec![StaticSource::ok("osmosis", vec!["1"])]);
        let task = tokio::spawn(r.run());

        let mut waited = 0;
        while h.health.cycles() == 0 && waited < 100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            waited += 1;
        }
        let snap = h.store.latest().unwrap();
        assert_eq!(snap.cycle, 1);
        assert_eq!(snap.opportunities.len(), 1);
        assert_eq!(h.health.report().status, "ok");
        assert_eq!(h.latency.summary().samples, 1);

        h.stop.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn shutdown_during_a_cycle_publishes_nothing() {
        let slow: Arc<dyn SourceAdapter> = Arc::new(StaticSource {
            name: "osmosis",
            ids: vec!["1"],
            error: None,
            delay: Duration::from_secs(5),
        });
        let (r, h) = refresher(vec![slow]);
        h.stop.send(true).unwrap();

        assert!(r.refresh_once().await.is_none());
        assert!(h.store.latest().is_none());
        assert!(!h.health.ready());
    }

    #[tokio::test]
    async fn validator_failure_joins_the_manifest() {
        let staking = StakingAdapter::new(
            fetcher_with(|url| Err(not_found(url))),
            StakingParams {
                lcd_url: "https://lcd.example".into(),
                chain: "cosmoshub".into(),
                denom: "uatom".into(),
                exponent: 6,
                symbol: "ATOM".into(),
                bech32_prefix: "cosmos".into(),
                price_url: None,
                slash_policy: BatchPolicy {
                    batch_size: 5,
                    delay: Duration::ZERO,
                },
                slash_deadline: Duration::from_secs(1),
            },
        );
        let (r, h) = refresher(vec![StaticSource::ok("osmosis", vec!["1"])]);
        let r = r.with_validators(Arc::new(staking));

        let snap = r.refresh_once().await.unwrap();
        assert_eq!(snap.manifest.sources_total, 2);
        assert_eq!(snap.manifest.failed_sources(), vec![VALIDATOR_SOURCE]);
        assert!(snap.validators.is_empty());
        assert_eq!(h.health.report().status, "degraded");
    }

    fn forty_validators(url: &str) -> Result<Value, TransportError> {
        let path = url.strip_prefix("https://lcd.example").unwrap_or(url);
        if path.starts_with("/cosmos/staking/v1beta1/validators") {
            Ok(bonded_validators(40))
        } else if path.starts_with("/cosmos/slashing/v1beta1/signing_infos") {
            Ok(json!({"info": [], "pagination": {"next_key": null}}))
        } else if path.starts_with("/cosmos/slashing/v1beta1/params") {
            Ok(json!({"params": {"signed_blocks_window": "10000"}}))
        } else if path.starts_with("/cosmos/tx/v1beta1/txs") {
            Ok(json!({"tx_responses": []}))
        } else {
            Err(not_found(url))
        }
    }

    #[tokio::test]
    async fn paced_slash_lookups_do_not_cost_the_validator_feed() {
        // 8 batches of 5 at 150ms each plus 300ms pauses: ~3.3s unbounded.
        let tx_search = "/cosmos/tx/v1beta1/txs";
        let fetcher = delayed_fetcher_with(tx_search, Duration::from_millis(150), forty_validators);
        let staking = StakingAdapter::new(
            fetcher,
            StakingParams {
                lcd_url: "https://lcd.example".into(),
                chain: "cosmoshub".into(),
                denom: "uatom".into(),
                exponent: 6,
                symbol: "ATOM".into(),
                bech32_prefix: "cosmos".into(),
                price_url: None,
                slash_policy: BatchPolicy {
                    batch_size: 5,
                    delay: Duration::from_millis(300),
                },
                slash_deadline: Duration::from_millis(500),
            },
        );
        let (r, _h) = refresher(vec![StaticSource::ok("osmosis", vec!["1"])]);
        let r = r.with_validators(Arc::new(staking));

        let snap = r.refresh_once().await.unwrap();
        assert_eq!(snap.validators.len(), 40);
        assert!(snap.validators.iter().all(|v| v.stats.slash_count == 0));
        let failure = &snap.manifest.failures[0];
        assert_eq!(failure.source, VALIDATOR_SOURCE);
        assert_eq!(failure.kind, SourceErrorKind::PartialData);
    }
}
