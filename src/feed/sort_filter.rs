use std::cmp::Ordering;

use serde::Deserialize;

use crate::types::{BondStatus, Opportunity, ValidatorView};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    fn apply(self, ord: Ordering) -> Ordering {
        match self {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolSortKey {
    #[default]
    Yield,
    #[serde(alias = "tvl")]
    LockedValue,
    Volume,
    Pair,
    Chain,
    Platform,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorSortKey {
    Uptime,
    Commission,
    VotingPower,
    Moniker,
}

// ---------------------------------------------------------------------------
// Ordering helpers
// ---------------------------------------------------------------------------

/// Known values ordered by `dir`; unknown values after all known ones either way.
fn cmp_known_last(a: Option<f64>, b: Option<f64>, dir: SortDirection) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => dir.apply(x.total_cmp(&y)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn cmp_text(a: &str, b: &str, dir: SortDirection) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (false, true) => Ordering::Less,
        (true, false) => Ordering::Greater,
        _ => dir.apply(a.to_lowercase().cmp(&b.to_lowercase())),
    }
}

// ---------------------------------------------------------------------------
// Sorting
// ---------------------------------------------------------------------------

/// Default validator ranking: uptime high→low (unknown last), then commission
/// low→high, then voting power low→high. Stable.
pub fn sort_validators(views: &mut [ValidatorView]) {
    views.sort_by(|a, b| {
        cmp_known_last(a.stats.uptime, b.stats.uptime, SortDirection::Desc)
            .then_with(|| a.validator.commission_rate.cmp(&b.validator.commission_rate))
            .then_with(|| a.validator.voting_power_tokens.cmp(&b.validator.voting_power_tokens))
    });
}

pub fn sort_validators_by(views: &mut [ValidatorView], key: ValidatorSortKey, dir: SortDirection) {
    views.sort_by(|a, b| match key {
        ValidatorSortKey::Uptime => cmp_known_last(a.stats.uptime, b.stats.uptime, dir),
        ValidatorSortKey::Commission => {
            dir.apply(a.validator.commission_rate.cmp(&b.validator.commission_rate))
        }
        ValidatorSortKey::VotingPower => dir.apply(
            a.validator
                .voting_power_tokens
                .cmp(&b.validator.voting_power_tokens),
        ),
        ValidatorSortKey::Moniker => cmp_text(&a.validator.moniker, &b.validator.moniker, dir),
    });
}

pub fn sort_opportunities(opps: &mut [Opportunity], key: PoolSortKey, dir: SortDirection) {
    opps.sort_by(|a, b| match key {
        PoolSortKey::Yield => cmp_known_last(a.yield_percent, b.yield_percent, dir),
        PoolSortKey::LockedValue => cmp_known_last(a.locked_value_usd, b.locked_value_usd, dir),
        PoolSortKey::Volume => cmp_known_last(a.volume_24h_usd, b.volume_24h_usd, dir),
        PoolSortKey::Pair => cmp_text(&a.pair_or_asset_label, &b.pair_or_asset_label, dir),
        PoolSortKey::Chain => cmp_text(&a.chain, &b.chain, dir),
        PoolSortKey::Platform => cmp_text(&a.platform, &b.platform, dir),
    });
}

// ---------------------------------------------------------------------------
// Filtering
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct OpportunityFilter {
    pub chain: Option<String>,
    pub platform: Option<String>,
    /// Opportunities with unknown yield never pass a minimum.
    pub min_yield: Option<f64>,
    /// Case-insensitive substring of the label, description or any asset symbol.
    pub search: Option<String>,
}

impl OpportunityFilter {
    pub fn matches(&self, opp: &Opportunity) -> bool {
        if let Some(chain) = non_blank(&self.chain) {
            if !opp.chain.eq_ignore_ascii_case(chain) {
                return false;
            }
        }
        if let Some(platform) = non_blank(&self.platform) {
            if !opp.platform.eq_ignore_ascii_case(platform) {
                return false;
            }
        }
        if let Some(min) = self.min_yield {
            if !opp.yield_percent.is_some_and(|y| y >= min) {
                return false;
            }
        }
        if let Some(q) = non_blank(&self.search) {
            let q = q.to_lowercase();
            let hit = opp.pair_or_asset_label.to_lowercase().contains(&q)
                || opp.description.to_lowercase().contains(&q)
                || opp.assets.iter().any(|a| a.resolved_symbol.to_lowercase().contains(&q));
            if !hit {
                return false;
            }
        }
        true
    }

    pub fn apply(&self, opps: Vec<Opportunity>) -> Vec<Opportunity> {
        opps.into_iter().filter(|o| self.matches(o)).collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidatorFilter {
    pub bonded_only: bool,
    pub hide_jailed: bool,
    /// Case-insensitive substring of the moniker or operator address.
    pub search: Option<String>,
}

impl ValidatorFilter {
    pub fn matches(&self, view: &ValidatorView) -> bool {
        let v = &view.validator;
        if self.bonded_only && v.bond_status != BondStatus::Bonded {
            return false;
        }
        if self.hide_jailed && v.jailed {
            return false;
        }
        match non_blank(&self.search) {
            Some(q) => {
                let q = q.to_lowercase();
                v.moniker.to_lowercase().contains(&q)
                    || v.operator_address.to_lowercase().contains(&q)
            }
            None => true,
        }
    }

    pub fn apply(&self, views: Vec<ValidatorView>) -> Vec<ValidatorView> {
        views.into_iter().filter(|v| self.matches(v)).collect()
    }
}

fn non_blank(s: &Option<String>) -> Option<&str> {
    s.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
