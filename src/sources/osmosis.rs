use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{FetchError, SourceError, SourceErrorKind};
use crate::fetcher::Fetcher;
use crate::metrics::{normalize_yield, YieldUnit};
use crate::resolver::AssetResolver;
use crate::sources::{SourceAdapter, SourceReport, TrackedAsset};
use crate::transport::envelope::{decode_list, f64_field, str_field, POOL_LIST_KEYS};
use crate::types::{Opportunity, OpportunityDraft};

const NAME: &str = "osmosis";
const RANKING_KEYS: &[&str] = &["data", "apr", "result", "pools"];

/// Osmosis liquidity pools: a pool listing plus a separate APR ranking.
pub struct OsmosisAdapter {
    fetcher: Fetcher,
    resolver: Arc<AssetResolver>,
    tracked: Arc<TrackedAsset>,
    pools_url: String,
    apr_url: String,
    pool_ttl: Duration,
}

/// A listed pool before symbol resolution.
#[derive(Debug, Clone, PartialEq)]
struct RawPool {
    pool_id: String,
    /// Listing's own display name, when it has one.
    name: Option<String>,
    tokens: Vec<(String, Option<String>)>,
    symbols: Vec<String>,
    liquidity: Option<f64>,
    volume_24h: Option<f64>,
}

impl OsmosisAdapter {
    pub fn new(
        fetcher: Fetcher,
        resolver: Arc<AssetResolver>,
        tracked: Arc<TrackedAsset>,
        pools_url: &str,
        apr_url: &str,
        pool_ttl: Duration,
    ) -> Self {
        Self {
            fetcher,
            resolver,
            tracked,
            pools_url: pools_url.to_string(),
            apr_url: apr_url.to_string(),
            pool_ttl,
        }
    }

    async fn fetch_pools(&self) -> Result<Vec<RawPool>, FetchError> {
        let payload = self.fetcher.get_cached(&self.pools_url, self.pool_ttl).await?;
        let (shape, items) = decode_list(payload, POOL_LIST_KEYS)?;
        debug!(source = NAME, shape = %shape, count = items.len(), "Decoded pool listing");
        Ok(items.iter().filter_map(parse_pool).collect())
    }

    async fn fetch_ranking(&self) -> Result<HashMap<String, f64>, FetchError> {
        let payload = self.fetcher.get_cached(&self.apr_url, self.pool_ttl).await?;
        let (shape, items) = decode_list(payload, RANKING_KEYS)?;
        debug!(source = NAME, shape = %shape, count = items.len(), "Decoded APR ranking");
        Ok(items.iter().filter_map(parse_ranking_entry).collect())
    }

    async fn normalize(&self, pool: RawPool, ranking: &HashMap<String, f64>) -> Opportunity {
        let assets = self.resolver.resolve_pool_assets(pool.tokens, NAME).await;
        let label = assets
            .iter()
            .map(|a| a.resolved_symbol.as_str())
            .collect::<Vec<_>>()
            .join("/");
        let yield_percent = ranking
            .get(&pool.pool_id)
            .and_then(|apr| normalize_yield(*apr, YieldUnit::Detect));

        Opportunity::new(OpportunityDraft {
            platform: NAME.to_string(),
            provider_id: pool.pool_id.clone(),
            chain: NAME.to_string(),
            description: format!("Osmosis liquidity pool #{} ({label})", pool.pool_id),
            label,
            assets,
            yield_percent,
            locked_value_usd: pool.liquidity,
            volume_24h_usd: pool.volume_24h,
            action_url: format!("https://app.osmosis.zone/pool/{}", pool.pool_id),
        })
    }
}

#[async_trait]
impl SourceAdapter for OsmosisAdapter {
    fn name(&self) -> &str {
        NAME
    }

    async fn fetch_and_normalize(&self) -> SourceReport {
        let (pools, ranking) = tokio::join!(self.fetch_pools(), self.fetch_ranking());

        let pools = match pools {
            Ok(p) => p,
            Err(e) => return SourceReport::failed(NAME, e),
        };
        let (ranking, ranking_error) = match ranking {
            Ok(r) => (r, None),
            Err(e) => {
                warn!(source = NAME, "APR ranking unavailable, yields unknown: {e}");
                let err =
                    SourceError::new(SourceErrorKind::PartialData, format!("apr ranking: {e}"));
                (HashMap::new(), Some(err))
            }
        };

        let relevant: Vec<RawPool> = pools
            .into_iter()
            .filter(|p| {
                let symbols: Vec<&str> = p.symbols.iter().map(String::as_str).collect();
                let denoms: Vec<&str> = p.tokens.iter().map(|(d, _)| d.as_str()).collect();
                self.tracked.matches(&symbols, p.name.as_deref().unwrap_or_default(), &denoms)
            })
            .collect();

        let opportunities =
            join_all(relevant.into_iter().map(|p| self.normalize(p, &ranking))).await;
        info!(source = NAME, count = opportunities.len(), "Normalized pools");

        match ranking_error {
            None => SourceReport::ok(NAME, opportunities),
            Some(e) => SourceReport::partial(NAME, opportunities, e),
        }
    }
}

fn parse_pool(item: &Value) -> Option<RawPool> {
    let Some(pool_id) = str_field(item, &["pool_id", "id"]) else {
        debug!(source = NAME, "Dropping pool without an id");
        return None;
    };

    let raw_tokens = item
        .get("pool_tokens")
        .or_else(|| item.get("tokens"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut tokens = Vec::with_capacity(raw_tokens.len());
    let mut symbols = Vec::new();
    for token in raw_tokens {
        let Some(denom) = str_field(token, &["denom"]) else {
            continue;
        };
        tokens.push((denom, str_field(token, &["amount"])));
        if let Some(symbol) = str_field(token, &["symbol"]) {
            symbols.push(symbol);
        }
    }
    if tokens.len() < 2 {
        debug!(source = NAME, pool_id = %pool_id, "Dropping pool with fewer than two assets");
        return None;
    }

    Some(RawPool {
        pool_id,
        name: str_field(item, &["name", "pool_name"]),
        tokens,
        symbols,
        liquidity: f64_field(item, &["liquidity", "liquidity_usd"]),
        volume_24h: f64_field(item, &["volume_24h", "volume_24h_usd"]),
    })
}

fn parse_ranking_entry(item: &Value) -> Option<(String, f64)> {
    let pool_id = str_field(item, &["pool_id", "id"])?;
    let apr = f64_field(item, &["apr", "total_apr", "apr_total"])?;
    Some((pool_id, apr))
}
