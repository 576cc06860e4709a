use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::FetchError;
use crate::fetcher::Fetcher;
use crate::metrics::{normalize_yield, YieldUnit};
use crate::resolver::AssetResolver;
use crate::sources::{SourceAdapter, SourceReport, TrackedAsset};
use crate::transport::envelope::{
    as_f64_lenient, decode_list, f64_field, pointer, str_field, POOL_LIST_KEYS,
};
use crate::types::{Opportunity, OpportunityDraft};

const NAME: &str = "astroport";
const CHAIN: &str = "neutron";

/// Astroport pools on Neutron. Yield arrives as a fraction and is required.
pub struct AstroportAdapter {
    fetcher: Fetcher,
    resolver: Arc<AssetResolver>,
    tracked: Arc<TrackedAsset>,
    pools_url: String,
    pool_ttl: Duration,
}

#[derive(Debug, Clone, PartialEq)]
struct RawPool {
    address: String,
    name: Option<String>,
    assets: Vec<(String, Option<String>)>,
    symbols: Vec<String>,
    liquidity: Option<f64>,
    volume_24h: Option<f64>,
    yield_fraction: f64,
}

impl AstroportAdapter {
    pub fn new(
        fetcher: Fetcher,
        resolver: Arc<AssetResolver>,
        tracked: Arc<TrackedAsset>,
        pools_url: &str,
        pool_ttl: Duration,
    ) -> Self {
        Self {
            fetcher,
            resolver,
            tracked,
            pools_url: pools_url.to_string(),
            pool_ttl,
        }
    }

    async fn fetch_pools(&self) -> Result<Vec<RawPool>, FetchError> {
        let payload = self.fetcher.get_cached(&self.pools_url, self.pool_ttl).await?;
        let (shape, items) = decode_list(payload, POOL_LIST_KEYS)?;
        debug!(source = NAME, shape = %shape, count = items.len(), "Decoded pool listing");
        Ok(items.iter().filter_map(parse_pool).collect())
    }

    async fn normalize(&self, pool: RawPool) -> Opportunity {
        let assets = self.resolver.resolve_pool_assets(pool.assets, CHAIN).await;
        let label = assets
            .iter()
            .map(|a| a.resolved_symbol.as_str())
            .collect::<Vec<_>>()
            .join("/");

        Opportunity::new(OpportunityDraft {
            platform: NAME.to_string(),
            provider_id: pool.address.clone(),
            chain: CHAIN.to_string(),
            description: format!("Astroport {label} pool on Neutron"),
            label,
            assets,
            yield_percent: normalize_yield(pool.yield_fraction, YieldUnit::Fraction),
            locked_value_usd: pool.liquidity,
            volume_24h_usd: pool.volume_24h,
            action_url: format!("https://app.astroport.fi/pools/{}", pool.address),
        })
    }
}

#[async_trait]
impl SourceAdapter for AstroportAdapter {
    fn name(&self) -> &str {
        NAME
    }

    async fn fetch_and_normalize(&self) -> SourceReport {
        let pools = match self.fetch_pools().await {
            Ok(p) => p,
            Err(e) => return SourceReport::failed(NAME, e),
        };

        let relevant: Vec<RawPool> = pools
            .into_iter()
            .filter(|p| {
                let symbols: Vec<&str> = p.symbols.iter().map(String::as_str).collect();
                let denoms: Vec<&str> = p.assets.iter().map(|(d, _)| d.as_str()).collect();
                self.tracked.matches(&symbols, p.name.as_deref().unwrap_or_default(), &denoms)
            })
            .collect();

        let opportunities = join_all(relevant.into_iter().map(|p| self.normalize(p))).await;
        info!(source = NAME, count = opportunities.len(), "Normalized pools");
        SourceReport::ok(NAME, opportunities)
    }
}

fn parse_pool(item: &Value) -> Option<RawPool> {
    let Some(address) = str_field(item, &["poolAddress", "pool_address", "address"]) else {
        debug!(source = NAME, "Dropping pool without an address");
        return None;
    };

    let Some(yield_fraction) = pointer(item, &["yield", "total"]).and_then(as_f64_lenient) else {
        debug!(source = NAME, pool = %address, "Dropping pool without yield.total");
        return None;
    };

    let mut assets = Vec::new();
    let mut symbols = Vec::new();
    for asset in item.get("assets").and_then(Value::as_array).into_iter().flatten() {
        // CW20 tokens carry a contract address instead of a native denom.
        let Some(denom) = str_field(asset, &["denom", "address", "contract_addr"]) else {
            continue;
        };
        assets.push((denom, str_field(asset, &["amount"])));
        if let Some(symbol) = str_field(asset, &["symbol"]) {
            symbols.push(symbol);
        }
    }
    if assets.len() < 2 {
        debug!(source = NAME, pool = %address, "Dropping pool with fewer than two assets");
        return None;
    }

    Some(RawPool {
        address,
        name: str_field(item, &["name", "poolName", "pool_name"]),
        assets,
        symbols,
        liquidity: f64_field(item, &["poolLiquidityUsd", "pool_liquidity_usd"]),
        volume_24h: f64_field(item, &["dayVolumeUsd", "day_volume_usd"]),
        yield_fraction,
    })
}
