//! Native staking on the tracked asset's home chain, via its Cosmos LCD.
//!
//! Produces one "native staking" opportunity per cycle, and separately the
//! validator feed with uptime and slashing statistics.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{FetchError, PayloadError, SourceError, SourceErrorKind};
use crate::fetcher::{with_query, Fetcher};
use crate::metrics::slashing::{fetch_slash_counts, BatchPolicy};
use crate::metrics::yield_calc::{from_base_units, staking_apr};
use crate::metrics::{compute_signing_stats, normalize_yield, YieldUnit};
use crate::sources::pagination::drain_pages;
use crate::sources::{SourceAdapter, SourceReport};
use crate::transport::envelope::{as_f64_lenient, pointer};
use crate::types::{
    BondStatus, ConsensusPubKey, Opportunity, OpportunityDraft, PoolAsset, SigningRecord,
    TokenAmount, Validator, ValidatorView,
};

const NAME: &str = "staking";

#[derive(Debug, Clone)]
pub struct StakingParams {
    pub lcd_url: String,
    pub chain: String,
    pub denom: String,
    pub exponent: u32,
    pub symbol: String,
    pub bech32_prefix: String,
    /// Optional USD price endpoint; without it the locked value is unknown.
    pub price_url: Option<String>,
    pub slash_policy: BatchPolicy,
    /// Budget for all slash lookups together; past it every count is 0.
    pub slash_deadline: Duration,
}

pub struct StakingAdapter {
    fetcher: Fetcher,
    params: StakingParams,
}

/// Validator rows plus whatever went wrong assembling them. Validators are kept
/// (with default statistics) when only the signing data failed.
#[derive(Debug, Clone, Default)]
pub struct ValidatorFeed {
    pub validators: Vec<ValidatorView>,
    pub error: Option<SourceError>,
}

/// Chain-level figures behind the staking APR.
#[derive(Debug, Clone, Copy, PartialEq)]
struct StakingInputs {
    inflation: f64,
    total_supply: f64,
    bonded: f64,
    community_tax: f64,
}

impl StakingAdapter {
    pub fn new(fetcher: Fetcher, params: StakingParams) -> Self {
        Self { fetcher, params }
    }

    fn lcd(&self, path: &str) -> String {
        format!("{}{path}", self.params.lcd_url.trim_end_matches('/'))
    }

    // -----------------------------------------------------------------------
    // Staking opportunity
    // -----------------------------------------------------------------------

    async fn fetch_inputs(&self) -> Result<Option<StakingInputs>, FetchError> {
        let supply_url = with_query(
            &self.lcd("/cosmos/bank/v1beta1/supply/by_denom"),
            &[("denom", self.params.denom.as_str())],
        )?;
        let inflation_url = self.lcd("/cosmos/mint/v1beta1/inflation");
        let pool_url = self.lcd("/cosmos/staking/v1beta1/pool");
        let distribution_url = self.lcd("/cosmos/distribution/v1beta1/params");
        let (inflation, pool, supply, distribution) = tokio::try_join!(
            self.fetcher.get(&inflation_url),
            self.fetcher.get(&pool_url),
            self.fetcher.get(&supply_url),
            self.fetcher.get(&distribution_url),
        )?;

        let Some(inflation) = inflation.get("inflation").and_then(as_f64_lenient) else {
            debug!(source = NAME, "Dropping staking record: no inflation");
            return Ok(None);
        };
        let bonded = pointer(&pool, &["pool", "bonded_tokens"]).and_then(as_f64_lenient);
        let Some(bonded) = bonded else {
            debug!(source = NAME, "Dropping staking record: no bonded_tokens");
            return Ok(None);
        };
        let total_supply = pointer(&supply, &["amount", "amount"])
            .and_then(as_f64_lenient)
            .ok_or(PayloadError::MissingField("amount.amount"))?;
        let community_tax = pointer(&distribution, &["params", "community_tax"])
            .and_then(as_f64_lenient)
            .unwrap_or_else(|| {
                debug!(source = NAME, "No community_tax, assuming 0");
                0.0
            });

        Ok(Some(StakingInputs {
            inflation,
            total_supply,
            bonded,
            community_tax,
        }))
    }

    async fn fetch_price(&self) -> Option<f64> {
        let url = self.params.price_url.as_deref()?;
        match self.fetcher.get(url).await {
            Ok(payload) => {
                let price = parse_price(&payload);
                if price.is_none() {
                    debug!(source = NAME, "Price payload had no usable price");
                }
                price
            }
            Err(e) => {
                warn!(source = NAME, "Price lookup failed, locked value unknown: {e}");
                None
            }
        }
    }

    fn build_opportunity(&self, inputs: StakingInputs, price: Option<f64>) -> Opportunity {
        let p = &self.params;
        let apr = staking_apr(
            inputs.inflation,
            inputs.total_supply,
            inputs.bonded,
            inputs.community_tax,
        );
        let locked_value_usd = price.map(|usd| from_base_units(inputs.bonded, p.exponent) * usd);

        Opportunity::new(OpportunityDraft {
            platform: NAME.to_string(),
            provider_id: p.chain.clone(),
            chain: p.chain.clone(),
            label: p.symbol.clone(),
            assets: vec![PoolAsset {
                denom_reference: p.denom.clone(),
                resolved_symbol: p.symbol.clone(),
                raw_amount: Some(format!("{:.0}", inputs.bonded)),
            }],
            yield_percent: apr.and_then(|a| normalize_yield(a, YieldUnit::Fraction)),
            locked_value_usd,
            volume_24h_usd: None,
            description: format!("Native {} staking on {}", p.symbol, p.chain),
            action_url: format!("https://wallet.keplr.app/chains/{}?tab=staking", p.chain),
        })
    }

    // -----------------------------------------------------------------------
    // Validator feed
    // -----------------------------------------------------------------------

    pub async fn fetch_validator_feed(&self) -> ValidatorFeed {
        let validators_url = self.lcd("/cosmos/staking/v1beta1/validators");
        let raw = match drain_pages(&self.fetcher, &validators_url, "validators").await {
            Ok(v) => v,
            Err(e) => {
                warn!(source = NAME, "Validator listing failed: {e}");
                return ValidatorFeed {
                    validators: Vec::new(),
                    error: Some(e.into()),
                };
            }
        };
        let validators: Vec<Validator> = raw.iter().filter_map(parse_validator).collect();
        debug!(source = NAME, listed = raw.len(), parsed = validators.len(), "Parsed validators");

        let bonded_ops: Vec<String> = validators
            .iter()
            .filter(|v| v.bond_status == BondStatus::Bonded)
            .map(|v| v.operator_address.clone())
            .collect();

        let signing_infos_url = self.lcd("/cosmos/slashing/v1beta1/signing_infos");
        let slash_deadline = self.params.slash_deadline;
        let (infos, window, slash_counts) = tokio::join!(
            drain_pages(&self.fetcher, &signing_infos_url, "info"),
            self.fetch_signing_window(),
            tokio::time::timeout(
                slash_deadline,
                fetch_slash_counts(
                    &self.fetcher,
                    &self.params.lcd_url,
                    &bonded_ops,
                    self.params.slash_policy,
                ),
            ),
        );

        let mut problems = Vec::new();
        let slash_counts = slash_counts.unwrap_or_else(|_| {
            problems.push(format!(
                "slash lookups: no result within {}ms, counting 0",
                slash_deadline.as_millis()
            ));
            HashMap::new()
        });
        let records: HashMap<String, SigningRecord> = match infos {
            Ok(items) => items
                .iter()
                .filter_map(parse_signing_record)
                .map(|r| (r.consensus_address.clone(), r))
                .collect(),
            Err(e) => {
                problems.push(format!("signing infos: {e}"));
                HashMap::new()
            }
        };
        let window = window.unwrap_or_else(|e| {
            problems.push(format!("slashing params: {e}"));
            0
        });

        let stats = compute_signing_stats(
            &validators,
            &records,
            &slash_counts,
            window,
            &self.params.bech32_prefix,
        );
        let views: Vec<ValidatorView> = validators
            .into_iter()
            .map(|v| {
                let stats = stats.get(&v.operator_address).copied().unwrap_or_default();
                ValidatorView {
                    validator: v,
                    stats,
                }
            })
            .collect();

        info!(
            source = NAME,
            validators = views.len(),
            signing_records = records.len(),
            window,
            "Validator feed assembled"
        );

        let error = (!problems.is_empty()).then(|| {
            warn!(source = NAME, "Validator statistics incomplete: {}", problems.join("; "));
            SourceError::new(SourceErrorKind::PartialData, problems.join("; "))
        });
        ValidatorFeed {
            validators: views,
            error,
        }
    }

    async fn fetch_signing_window(&self) -> Result<i64, FetchError> {
        let payload = self.fetcher.get(&self.lcd("/cosmos/slashing/v1beta1/params")).await?;
        let raw = pointer(&payload, &["params", "signed_blocks_window"])
            .ok_or(PayloadError::MissingField("params.signed_blocks_window"))?;
        let window = match raw {
            Value::String(s) => s.trim().parse::<i64>().ok(),
            other => other.as_i64(),
        };
        window.ok_or_else(|| {
            PayloadError::InvalidValue {
                field: "signed_blocks_window",
                value: raw.to_string(),
            }
            .into()
        })
    }
}

#[async_trait]
impl SourceAdapter for StakingAdapter {
    fn name(&self) -> &str {
        NAME
    }

    async fn fetch_and_normalize(&self) -> SourceReport {
        let (inputs, price) = tokio::join!(self.fetch_inputs(), self.fetch_price());
        match inputs {
            Ok(Some(inputs)) => {
                let opportunity = self.build_opportunity(inputs, price);
                info!(source = NAME, apr = %opportunity.yield_display, "Staking APR computed");
                SourceReport::ok(NAME, vec![opportunity])
            }
            Ok(None) => SourceReport::partial(
                NAME,
                Vec::new(),
                SourceError::new(
                    SourceErrorKind::PartialData,
                    "staking record dropped: missing inflation or bonded tokens",
                ),
            ),
            Err(e) => SourceReport::failed(NAME, e),
        }
    }
}

/// `{coins: {"<id>": {price}}}`; the first listed coin wins.
fn parse_price(payload: &Value) -> Option<f64> {
    payload
        .get("coins")
        .and_then(Value::as_object)?
        .values()
        .find_map(|coin| coin.get("price").and_then(as_f64_lenient))
        .filter(|p| *p > 0.0)
}

fn parse_validator(item: &Value) -> Option<Validator> {
    let operator_address = item.get("operator_address").and_then(Value::as_str)?.to_string();

    let tokens_raw = item.get("tokens").and_then(Value::as_str).unwrap_or("0");
    let voting_power_tokens = match tokens_raw.parse::<TokenAmount>() {
        Ok(t) => t,
        Err(e) => {
            warn!(
                validator = %operator_address,
                tokens = tokens_raw,
                "Skipping validator with unreadable tokens: {e}"
            );
            return None;
        }
    };

    let rate_raw = pointer(item, &["commission", "commission_rates", "rate"])
        .and_then(Value::as_str)
        .unwrap_or("0");
    let commission_rate = match Decimal::from_str(rate_raw) {
        Ok(rate) if rate >= Decimal::ZERO && rate <= Decimal::ONE => rate,
        _ => {
            warn!(
                validator = %operator_address,
                rate = rate_raw,
                "Skipping validator with invalid commission"
            );
            return None;
        }
    };

    let consensus_pub_key = item.get("consensus_pubkey").and_then(|k| {
        Some(ConsensusPubKey {
            type_url: k.get("@type")?.as_str()?.to_string(),
            key_base64: k.get("key")?.as_str()?.to_string(),
        })
    });

    Some(Validator {
        moniker: pointer(item, &["description", "moniker"])
            .and_then(Value::as_str)
            .map(|m| m.trim().to_string())
            .unwrap_or_default(),
        operator_address,
        commission_rate,
        voting_power_tokens,
        bond_status: BondStatus::from_lcd(
            item.get("status").and_then(Value::as_str).unwrap_or_default(),
        ),
        jailed: item.get("jailed").and_then(Value::as_bool).unwrap_or(false),
        consensus_pub_key,
    })
}

fn parse_signing_record(item: &Value) -> Option<SigningRecord> {
    let consensus_address = item.get("address").and_then(Value::as_str).filter(|a| !a.is_empty())?;
    let missed_blocks_count = match item.get("missed_blocks_counter") {
        Some(Value::String(s)) => s.parse::<u64>().ok()?,
        Some(v) => v.as_u64()?,
        None => 0,
    };
    Some(SigningRecord {
        consensus_address: consensus_address.to_string(),
        missed_blocks_count,
        tombstoned: item.get("tombstoned").and_then(Value::as_bool).unwrap_or(false),
        slash_event_count: 0,
    })
}
