use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::cache::TtlCache;
use crate::fetcher::Fetcher;
use crate::resolver::registry::{known_denom_symbol, shorten_denom, AssetIndex};
use crate::transport::envelope::pointer;
use crate::types::PoolAsset;

/// A failed registry fetch or IBC trace lookup is remembered this long, so a
/// dead upstream is not re-requested for every denom in a cycle.
const LOOKUP_FAILURE_TTL: Duration = Duration::from_secs(60);

/// Turns opaque on-chain denominations into display symbols.
///
/// Resolution order, first hit wins:
/// 1. primary chain registry
/// 2. the pool's own chain registry, when it differs from the primary chain
/// 3. the well-known denom table
/// 4. for `ibc/<hash>`: the IBC trace's base denom, run back through 1–3
/// 5. a shortened form of the identifier
///
/// Never fails.
pub struct AssetResolver {
    fetcher: Fetcher,
    registry_base_url: String,
    primary_chain: String,
    /// chain name → LCD base URL used for IBC trace lookups
    trace_lcds: HashMap<String, String>,
    registries: Arc<TtlCache<Arc<AssetIndex>>>,
    /// Held while a registry is (re)fetched so concurrent lookups wait for one request.
    registry_load: Mutex<()>,
    /// `ibc/<hash>` → base denom, permanent once established; `None` is a
    /// remembered failure that expires after `LOOKUP_FAILURE_TTL`
    traces: Arc<TtlCache<Option<String>>>,
    registry_ttl: Duration,
}

impl AssetResolver {
    pub fn new(
        fetcher: Fetcher,
        registry_base_url: &str,
        primary_chain: &str,
        trace_lcds: HashMap<String, String>,
        registry_ttl: Duration,
    ) -> Self {
        Self {
            fetcher,
            registry_base_url: registry_base_url.trim_end_matches('/').to_string(),
            primary_chain: primary_chain.to_string(),
            trace_lcds,
            registries: Arc::new(TtlCache::new()),
            registry_load: Mutex::new(()),
            traces: Arc::new(TtlCache::new()),
            registry_ttl,
        }
    }

    pub async fn resolve_symbol(&self, denom: &str, chain: &str) -> String {
        let denom = denom.trim();
        if denom.is_empty() {
            return shorten_denom(denom);
        }

        if let Some(symbol) = self.lookup_known(denom, chain).await {
            return symbol;
        }

        if denom.starts_with("ibc/") {
            if let Some(base) = self.trace_base_denom(denom, chain).await {
                if let Some(symbol) = self.lookup_known(&base, chain).await {
                    return symbol;
                }
                debug!(denom, base = %base, "Traced base denom is not in any registry");
            }
        }

        let short = shorten_denom(denom);
        debug!(denom, chain, symbol = %short, "Unresolved denom, using shortened form");
        short
    }

    /// Resolve every `(denom, raw_amount)` pair of a pool concurrently, keeping order.
    pub async fn resolve_pool_assets(
        &self,
        raw: Vec<(String, Option<String>)>,
        chain: &str,
    ) -> Vec<PoolAsset> {
        let lookups = raw.into_iter().map(|(denom, raw_amount)| async move {
            let resolved_symbol = self.resolve_symbol(&denom, chain).await;
            PoolAsset {
                denom_reference: denom,
                resolved_symbol,
                raw_amount,
            }
        });
        join_all(lookups).await
    }

    async fn lookup_known(&self, denom: &str, chain: &str) -> Option<String> {
        if let Some(index) = self.registry(&self.primary_chain).await {
            if let Some(symbol) = index.lookup(denom) {
                return Some(symbol.to_string());
            }
        }
        if !chain.is_empty() && chain != self.primary_chain {
            if let Some(index) = self.registry(chain).await {
                if let Some(symbol) = index.lookup(denom) {
                    return Some(symbol.to_string());
                }
            }
        }
        known_denom_symbol(denom).map(str::to_string)
    }

    async fn registry(&self, chain: &str) -> Option<Arc<AssetIndex>> {
        if let Some(index) = self.registries.get(chain) {
            return (!index.is_empty()).then_some(index);
        }
        let _loading = self.registry_load.lock().await;
        // Someone else may have loaded it while we waited.
        if let Some(index) = self.registries.get(chain) {
            return (!index.is_empty()).then_some(index);
        }

        let url = format!("{}/{}/assetlist.json", self.registry_base_url, chain);
        let index = match self.fetcher.get(&url).await {
            Ok(payload) => match AssetIndex::from_asset_list(payload) {
                Ok(index) => index,
                Err(e) => {
                    warn!(chain, "Asset registry payload unreadable: {e}");
                    self.registries.set(chain, Arc::new(AssetIndex::default()), LOOKUP_FAILURE_TTL);
                    return None;
                }
            },
            Err(e) => {
                warn!(chain, "Asset registry fetch failed: {e}");
                self.registries.set(chain, Arc::new(AssetIndex::default()), LOOKUP_FAILURE_TTL);
                return None;
            }
        };

        debug!(chain, denoms = index.len(), "Asset registry refreshed");
        let index = Arc::new(index);
        self.registries.set(chain, Arc::clone(&index), self.registry_ttl);
        Some(index)
    }

    /// Base denom behind an `ibc/<hash>` voucher, via the chain's LCD.
    async fn trace_base_denom(&self, denom: &str, chain: &str) -> Option<String> {
        if let Some(cached) = self.traces.get(denom) {
            return cached;
        }

        let hash = denom.strip_prefix("ibc/")?;
        let lcd = self
            .trace_lcds
            .get(chain)
            .or_else(|| self.trace_lcds.get(&self.primary_chain))?;

        let endpoints = [
            format!("{lcd}/ibc/apps/transfer/v1/denom_traces/{hash}"),
            format!("{lcd}/ibc/apps/transfer/v1/denoms/{hash}"),
        ];
        for url in &endpoints {
            match self.fetcher.get(url).await {
                Ok(payload) => {
                    if let Some(base) = parse_trace_base(&payload) {
                        self.traces.set_permanent(denom, Some(base.clone()));
                        return Some(base);
                    }
                    debug!(denom, url = %url, "Trace payload had no base denom");
                }
                Err(e) => debug!(denom, "Trace lookup failed: {e}"),
            }
        }
        warn!(denom, chain, "IBC trace lookup found nothing");
        self.traces.set(denom, None, LOOKUP_FAILURE_TTL);
        None
    }
}

/// Accepts the legacy `{denom_trace: {base_denom}}` and newer `{denom: {base}}` shapes.
fn parse_trace_base(payload: &Value) -> Option<String> {
    pointer(payload, &["denom_trace", "base_denom"])
        .or_else(|| pointer(payload, &["denom", "base"]))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
