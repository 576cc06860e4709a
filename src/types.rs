use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::error::{SourceError, SourceErrorKind};
use crate::metrics::yield_calc::{format_locked_value, format_yield, sanitize_amount};

// ---------------------------------------------------------------------------
// Opportunity
// ---------------------------------------------------------------------------

/// One asset inside a pool, with its on-chain identifier and resolved display symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolAsset {
    pub denom_reference: String,
    /// May be a shortened form of `denom_reference` when nothing resolved it.
    pub resolved_symbol: String,
    pub raw_amount: Option<String>,
}

/// Canonical, platform-agnostic yield-bearing position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Opportunity {
    /// `<platform>:<provider id>`; unique across the merged feed.
    pub id: String,
    pub platform: String,
    pub chain: String,
    pub pair_or_asset_label: String,
    pub assets: Vec<PoolAsset>,
    pub yield_percent: Option<f64>,
    pub locked_value_usd: Option<f64>,
    pub volume_24h_usd: Option<f64>,
    pub description: String,
    pub action_url: String,
    pub yield_display: String,
    pub locked_value_display: String,
}

/// Inputs for [`Opportunity::new`]. Numeric fields are sanitized on construction.
#[derive(Debug, Clone, Default)]
pub struct OpportunityDraft {
    pub platform: String,
    pub provider_id: String,
    pub chain: String,
    pub label: String,
    pub assets: Vec<PoolAsset>,
    pub yield_percent: Option<f64>,
    pub locked_value_usd: Option<f64>,
    pub volume_24h_usd: Option<f64>,
    pub description: String,
    pub action_url: String,
}

impl Opportunity {
    pub fn new(draft: OpportunityDraft) -> Self {
        let yield_percent = draft.yield_percent.and_then(sanitize_amount);
        let locked_value_usd = draft.locked_value_usd.and_then(sanitize_amount);
        let volume_24h_usd = draft.volume_24h_usd.and_then(sanitize_amount);
        Self {
            id: format!("{}:{}", draft.platform, draft.provider_id),
            platform: draft.platform,
            chain: draft.chain,
            pair_or_asset_label: draft.label,
            assets: draft.assets,
            yield_percent,
            locked_value_usd,
            volume_24h_usd,
            description: draft.description,
            action_url: draft.action_url,
            yield_display: format_yield(yield_percent),
            locked_value_display: format_locked_value(locked_value_usd),
        }
    }
}

// ---------------------------------------------------------------------------
// Validators
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BondStatus {
    Bonded,
    Unbonding,
    Unbonded,
    Unspecified,
}

impl BondStatus {
    /// Maps the LCD `BOND_STATUS_*` strings; anything else is `Unspecified`.
    pub fn from_lcd(s: &str) -> Self {
        match s {
            "BOND_STATUS_BONDED" => BondStatus::Bonded,
            "BOND_STATUS_UNBONDING" => BondStatus::Unbonding,
            "BOND_STATUS_UNBONDED" => BondStatus::Unbonded,
            _ => BondStatus::Unspecified,
        }
    }
}

impl std::fmt::Display for BondStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BondStatus::Bonded => "bonded",
            BondStatus::Unbonding => "unbonding",
            BondStatus::Unbonded => "unbonded",
            BondStatus::Unspecified => "unspecified",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsensusPubKey {
    /// e.g. `/cosmos.crypto.ed25519.PubKey`
    pub type_url: String,
    pub key_base64: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Validator {
    pub operator_address: String,
    pub moniker: String,
    pub commission_rate: Decimal,
    /// Bonded tokens in base units.
    pub voting_power_tokens: TokenAmount,
    pub bond_status: BondStatus,
    pub jailed: bool,
    pub consensus_pub_key: Option<ConsensusPubKey>,
}

/// Signing-info entry, keyed by consensus address rather than operator address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningRecord {
    pub consensus_address: String,
    pub missed_blocks_count: u64,
    pub tombstoned: bool,
    pub slash_event_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningStats {
    /// `None` when no signing record could be matched.
    pub uptime: Option<f64>,
    pub missed: u64,
    pub tombstoned: bool,
    pub slash_count: u32,
}

/// A validator joined with its signing statistics; one row of the validator feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorView {
    #[serde(flatten)]
    pub validator: Validator,
    #[serde(flatten)]
    pub stats: SigningStats,
}

// ---------------------------------------------------------------------------
// Failure manifest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceFailure {
    pub source: String,
    pub kind: SourceErrorKind,
    pub message: String,
}

/// Which sources failed during one aggregation pass, and why.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FailureManifest {
    pub sources_total: usize,
    pub failures: Vec<SourceFailure>,
}

impl FailureManifest {
    pub fn new(sources_total: usize) -> Self {
        Self {
            sources_total,
            failures: Vec::new(),
        }
    }

    pub fn record(&mut self, source: &str, error: &SourceError) {
        self.failures.push(SourceFailure {
            source: source.to_string(),
            kind: error.kind,
            message: error.message.clone(),
        });
    }

    pub fn failed_sources(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.source.as_str()).collect()
    }

    pub fn is_degraded(&self) -> bool {
        !self.failures.is_empty()
    }

    /// e.g. `"1 of 3 sources degraded"`.
    pub fn summary(&self) -> String {
        format!("{} of {} sources degraded", self.failures.len(), self.sources_total)
    }

    /// Fold another manifest (e.g. the validator feed's) into this one.
    pub fn merge(&mut self, other: FailureManifest) {
        self.sources_total += other.sources_total;
        self.failures.extend(other.failures);
    }
}

// ---------------------------------------------------------------------------
// Token amounts
// ---------------------------------------------------------------------------

/// Non-negative integer amount of any size, kept as its canonical decimal digits.
/// Orders numerically; serializes as a JSON string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TokenAmount(String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("not a non-negative integer: {0:?}")]
pub struct TokenAmountError(String);

impl TokenAmount {
    pub fn as_str(&self) -> &str {
        if self.0.is_empty() {
            "0"
        } else {
            &self.0
        }
    }
}

impl FromStr for TokenAmount {
    type Err = TokenAmountError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let digits = raw.trim();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TokenAmountError(raw.to_string()));
        }
        Ok(Self(digits.trim_start_matches('0').to_string()))
    }
}

impl From<u128> for TokenAmount {
    fn from(v: u128) -> Self {
        match v {
            0 => Self::default(),
            v => Self(v.to_string()),
        }
    }
}

impl Ord for TokenAmount {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.len().cmp(&other.0.len()).then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for TokenAmount {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        raw.parse().map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opportunity_never_turns_nan_into_zero() {
        let opp = Opportunity::new(OpportunityDraft {
            platform: "osmosis".into(),
            provider_id: "1".into(),
            yield_percent: Some(f64::NAN),
            locked_value_usd: Some(-5.0),
            ..Default::default()
        });
        assert_eq!(opp.id, "osmosis:1");
        assert_eq!(opp.yield_percent, None);
        assert_eq!(opp.locked_value_usd, None);
        assert_eq!(opp.yield_display, "N/A");
        assert_eq!(opp.locked_value_display, "N/A");
    }

    #[test]
    fn bond_status_parses_lcd_strings() {
        assert_eq!(BondStatus::from_lcd("BOND_STATUS_BONDED"), BondStatus::Bonded);
        assert_eq!(BondStatus::from_lcd("BOND_STATUS_UNBONDING"), BondStatus::Unbonding);
        assert_eq!(BondStatus::from_lcd("weird"), BondStatus::Unspecified);
    }

    #[test]
    fn manifest_summary_counts_failures() {
        let mut manifest = FailureManifest::new(3);
        manifest.record("astroport", &SourceError::new(SourceErrorKind::Timeout, "slow"));
        assert!(manifest.is_degraded());
        assert_eq!(manifest.failed_sources(), vec!["astroport"]);
        assert_eq!(manifest.summary(), "1 of 3 sources degraded");
    }

    #[test]
    fn validator_view_serializes_voting_power_as_string() {
        let huge = "999999999999999999999999999999999999999999";
        let view = ValidatorView {
            validator: Validator {
                operator_address: "cosmosvaloper1x".into(),
                moniker: "x".into(),
                commission_rate: Decimal::new(5, 2),
                voting_power_tokens: huge.parse().unwrap(),
                bond_status: BondStatus::Bonded,
                jailed: false,
                consensus_pub_key: None,
            },
            stats: SigningStats::default(),
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["votingPowerTokens"], huge);
        assert_eq!(json["bondStatus"], "bonded");
        assert!(json["uptime"].is_null());

        let back: ValidatorView = serde_json::from_value(json).unwrap();
        assert_eq!(back.validator.voting_power_tokens.as_str(), huge);
    }

    #[test]
    fn token_amounts_order_numerically_past_u128() {
        let max: TokenAmount = TokenAmount::from(u128::MAX);
        let bigger: TokenAmount = "340282366920938463463374607431768211456".parse().unwrap();
        assert!(bigger > max);
        assert!(TokenAmount::from(9) < TokenAmount::from(10));
        assert_eq!("000120".parse::<TokenAmount>().unwrap(), TokenAmount::from(120));
        assert_eq!("0".parse::<TokenAmount>().unwrap().as_str(), "0");
        assert!("12.5".parse::<TokenAmount>().is_err());
        assert!("-3".parse::<TokenAmount>().is_err());
        assert!("".parse::<TokenAmount>().is_err());
    }
}
