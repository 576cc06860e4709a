use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{FetchError, PayloadError};
use crate::fetcher::Fetcher;
use crate::metrics::{normalize_yield, YieldUnit};
use crate::sources::{SourceAdapter, SourceReport, TrackedAsset};
use crate::transport::envelope::{decode_list, f64_field, str_field};
use crate::types::{Opportunity, OpportunityDraft, PoolAsset};

const NAME: &str = "defillama";

/// DefiLlama's yield index, restricted to the configured chains.
pub struct DefiLlamaAdapter {
    fetcher: Fetcher,
    tracked: Arc<TrackedAsset>,
    pools_url: String,
    /// Lowercased DefiLlama chain names.
    chains: Vec<String>,
    pool_ttl: Duration,
}

impl DefiLlamaAdapter {
    pub fn new(
        fetcher: Fetcher,
        tracked: Arc<TrackedAsset>,
        pools_url: &str,
        chains: &[String],
        pool_ttl: Duration,
    ) -> Self {
        Self {
            fetcher,
            tracked,
            pools_url: pools_url.to_string(),
            chains: chains.iter().map(|c| c.to_lowercase()).collect(),
            pool_ttl,
        }
    }

    async fn fetch(&self) -> Result<Vec<Opportunity>, FetchError> {
        let payload = self.fetcher.get_cached(&self.pools_url, self.pool_ttl).await?;
        if let Some(status) = payload.get("status").and_then(Value::as_str) {
            if status != "success" {
                return Err(PayloadError::InvalidValue {
                    field: "status",
                    value: status.to_string(),
                }
                .into());
            }
        }
        let (shape, items) = decode_list(payload, &["data"])?;
        debug!(source = NAME, shape = %shape, count = items.len(), "Decoded pool index");

        Ok(items.iter().filter_map(|item| self.normalize(item)).collect())
    }

    fn normalize(&self, item: &Value) -> Option<Opportunity> {
        let chain = str_field(item, &["chain"])?.to_lowercase();
        if !self.chains.contains(&chain) {
            return None;
        }
        let symbol = str_field(item, &["symbol"]).unwrap_or_default();
        let project = str_field(item, &["project"]).unwrap_or_else(|| "unknown".to_string());
        let pool_meta = str_field(item, &["poolMeta"]);
        let description = match &pool_meta {
            Some(meta) => format!("{project} on {chain} ({meta})"),
            None => format!("{project} on {chain}"),
        };
        if !self.tracked.matches(&[symbol.as_str()], &description, &[]) {
            return None;
        }

        let Some(pool_id) = str_field(item, &["pool"]) else {
            debug!(source = NAME, symbol = %symbol, "Dropping record without a pool id");
            return None;
        };
        let Some(tvl) = f64_field(item, &["tvlUsd"]) else {
            debug!(source = NAME, pool = %pool_id, "Dropping record without tvlUsd");
            return None;
        };

        Some(Opportunity::new(OpportunityDraft {
            platform: NAME.to_string(),
            assets: symbol_assets(&symbol, item.get("underlyingTokens")),
            label: symbol,
            yield_percent: f64_field(item, &["apy"])
                .and_then(|apy| normalize_yield(apy, YieldUnit::Percent)),
            locked_value_usd: Some(tvl),
            volume_24h_usd: f64_field(item, &["volumeUsd1d"]),
            action_url: format!("https://defillama.com/yields/pool/{pool_id}"),
            provider_id: pool_id,
            chain,
            description,
        }))
    }
}

#[async_trait]
impl SourceAdapter for DefiLlamaAdapter {
    fn name(&self) -> &str {
        NAME
    }

    async fn fetch_and_normalize(&self) -> SourceReport {
        match self.fetch().await {
            Ok(opportunities) => {
                info!(source = NAME, count = opportunities.len(), "Normalized pools");
                SourceReport::ok(NAME, opportunities)
            }
            Err(e) => SourceReport::failed(NAME, e),
        }
    }
}

/// `ATOM-OSMO` → one asset per symbol part, paired with the underlying token
/// address when the index lists one.
fn symbol_assets(symbol: &str, underlying: Option<&Value>) -> Vec<PoolAsset> {
    let tokens: Vec<Option<&str>> = underlying
        .and_then(Value::as_array)
        .map(|arr| arr.iter().map(Value::as_str).collect())
        .unwrap_or_default();

    symbol
        .split(['-', '/'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .enumerate()
        .map(|(i, part)| PoolAsset {
            denom_reference: tokens.get(i).copied().flatten().unwrap_or(part).to_string(),
            resolved_symbol: part.to_string(),
            raw_amount: None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceErrorKind;
    use crate::testkit::fetcher_with;
    use serde_json::json;

    fn adapter(payload: Value) -> DefiLlamaAdapter {
        DefiLlamaAdapter::new(
            fetcher_with(move |_| Ok(payload.clone())),
            Arc::new(TrackedAsset::new("ATOM", &[])),
            "https://llama.example/pools",
            &["Cosmos".to_string(), "Osmosis".to_string()],
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn keeps_tracked_records_on_configured_chains() {
        let report = adapter(json!({"status": "success", "data": [
            {"pool": "p1", "chain": "Cosmos", "project": "stride", "symbol": "STATOM",
             "tvlUsd": 5000.0, "apy": 17.0},
            {"pool": "p2", "chain": "Osmosis", "project": "osmosis-dex", "symbol": "ATOM-OSMO",
             "tvlUsd": 2_000_000.0, "apy": 12.346, "volumeUsd1d": 1000.0,
             "underlyingTokens": ["uatom", null]},
            {"pool": "p3", "chain": "Ethereum", "project": "x", "symbol": "ATOM",
             "tvlUsd": 1.0, "apy": 1.0},
            {"pool": "p4", "chain": "Cosmos", "project": "lido", "symbol": "ATOM", "apy": 9.0},
            {"pool": "p5", "chain": "Cosmos", "project": "quicksilver", "symbol": "QATOM",
             "tvlUsd": 10.0, "poolMeta": "liquid staked ATOM", "apy": 0.4}
        ]}))
        .fetch_and_normalize()
        .await;

        assert!(report.error.is_none());
        let ids: Vec<_> = report.opportunities.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["defillama:p2", "defillama:p5"]);

        let p2 = &report.opportunities[0];
        assert_eq!(p2.chain, "osmosis");
        assert_eq!(p2.yield_display, "12.35%");
        assert_eq!(p2.locked_value_display, "$2.0M");
        assert_eq!(p2.assets[0].denom_reference, "uatom");
        assert_eq!(p2.assets[1].denom_reference, "OSMO");

        // Percent feeds are never rescaled, even below 1.
        assert_eq!(report.opportunities[1].yield_display, "0.40%");
    }

    #[tokio::test]
    async fn error_status_is_a_payload_failure() {
        let report = adapter(json!({"status": "error", "data": []})).fetch_and_normalize().await;
        assert_eq!(report.error.map(|e| e.kind), Some(SourceErrorKind::Payload));
    }

    #[test]
    fn symbol_assets_without_underlying_tokens() {
        let assets = symbol_assets("ATOM/USDC", None);
        let symbols: Vec<_> = assets.iter().map(|a| a.resolved_symbol.as_str()).collect();
        assert_eq!(symbols, vec!["ATOM", "USDC"]);
        assert_eq!(assets[1].denom_reference, "USDC");
    }
}
