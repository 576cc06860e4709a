use std::collections::HashMap;

use serde::Deserialize;

use crate::config::{SHORT_DENOM_PREFIX, SHORT_DENOM_SUFFIX};

// ---------------------------------------------------------------------------
// chain-registry assetlist.json
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct AssetList {
    #[serde(default)]
    assets: Vec<RegistryAsset>,
}

#[derive(Debug, Deserialize)]
struct RegistryAsset {
    #[serde(default)]
    base: String,
    symbol: Option<String>,
    display: Option<String>,
    /// CW20 contract address, when the asset is a wrapped token contract.
    address: Option<String>,
    #[serde(default)]
    denom_units: Vec<DenomUnit>,
}

#[derive(Debug, Deserialize)]
struct DenomUnit {
    denom: String,
    #[serde(default)]
    aliases: Vec<String>,
}

/// denom → symbol lookup built from one chain's asset list.
#[derive(Debug, Default, Clone)]
pub struct AssetIndex {
    by_denom: HashMap<String, String>,
}

impl AssetIndex {
    /// Build from an `assetlist.json` payload. Every base denom, denom unit, alias and
    /// CW20 address maps to the asset's symbol.
    pub fn from_asset_list(payload: serde_json::Value) -> Result<Self, serde_json::Error> {
        let list: AssetList = serde_json::from_value(payload)?;
        let mut by_denom = HashMap::new();

        for asset in list.assets {
            let Some(symbol) = asset.symbol.or(asset.display).filter(|s| !s.is_empty()) else {
                continue;
            };
            let mut keys = vec![asset.base];
            keys.extend(asset.address);
            for unit in asset.denom_units {
                keys.push(unit.denom);
                keys.extend(unit.aliases);
            }
            for key in keys.into_iter().filter(|k| !k.is_empty()) {
                // First asset to claim a denom keeps it.
                by_denom.entry(key).or_insert_with(|| symbol.clone());
            }
        }

        Ok(Self { by_denom })
    }

    pub fn lookup(&self, denom: &str) -> Option<&str> {
        self.by_denom
            .get(denom)
            .or_else(|| denom.strip_prefix("cw20:").and_then(|addr| self.by_denom.get(addr)))
            .or_else(|| self.by_denom.get(&format!("cw20:{denom}")))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_denom.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_denom.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Well-known base denominations
// ---------------------------------------------------------------------------

const KNOWN_DENOMS: &[(&str, &str)] = &[
    ("uatom", "ATOM"),
    ("uosmo", "OSMO"),
    ("untrn", "NTRN"),
    ("uion", "ION"),
    ("ujuno", "JUNO"),
    ("ustars", "STARS"),
    ("uakt", "AKT"),
    ("uscrt", "SCRT"),
    ("utia", "TIA"),
    ("ustrd", "STRD"),
    ("stuatom", "stATOM"),
    ("inj", "INJ"),
    ("aevmos", "EVMOS"),
    ("adydx", "DYDX"),
];

pub fn known_denom_symbol(denom: &str) -> Option<&'static str> {
    KNOWN_DENOMS
        .iter()
        .find(|(d, _)| *d == denom)
        .map(|(_, sym)| *sym)
}

/// Display form for an identifier nothing could resolve: `ibc/27394F…5EB2`-style.
/// Never empty.
pub fn shorten_denom(denom: &str) -> String {
    shorten_with(denom, SHORT_DENOM_PREFIX, SHORT_DENOM_SUFFIX)
}

pub fn shorten_with(denom: &str, prefix: usize, suffix: usize) -> String {
    let denom = denom.trim();
    if denom.is_empty() {
        return "UNKNOWN".to_string();
    }
    let chars: Vec<char> = denom.chars().collect();
    if chars.len() <= prefix + suffix + 1 {
        return denom.to_string();
    }
    let head: String = chars[..prefix].iter().collect();
    let tail: String = chars[chars.len() - suffix..].iter().collect();
    format!("{head}…{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn osmosis_list() -> serde_json::Value {
        json!({
            "chain_name": "osmosis",
            "assets": [
                {
                    "base": "uosmo",
                    "symbol": "OSMO",
                    "denom_units": [
                        {"denom": "uosmo", "exponent": 0},
                        {"denom": "osmo", "exponent": 6}
                    ]
                },
                {
                    "base": "ibc/27394FB092D2ECCD56123C74F36E4C1F926001CEADA9CA97EA622B25F41E5EB2",
                    "symbol": "ATOM",
                    "denom_units": [{
                        "denom": "ibc/27394FB092D2ECCD56123C74F36E4C1F926001CEADA9CA97EA622B25F41E5EB2",
                        "exponent": 0,
                        "aliases": ["uatom"]
                    }],
                    "traces": [{
                        "type": "ibc",
                        "counterparty": {"base_denom": "uatom", "chain_name": "cosmoshub"}
                    }]
                },
                {
                    "base": "cw20:osmo1contractaddr",
                    "address": "osmo1contractaddr",
                    "symbol": "WRAP"
                },
                {"base": "nosymbol"}
            ]
        })
    }

    #[test]
    fn index_covers_base_units_aliases_and_contracts() {
        let index = AssetIndex::from_asset_list(osmosis_list()).unwrap();
        assert_eq!(index.lookup("uosmo"), Some("OSMO"));
        assert_eq!(index.lookup("osmo"), Some("OSMO"));
        assert_eq!(
            index.lookup("ibc/27394FB092D2ECCD56123C74F36E4C1F926001CEADA9CA97EA622B25F41E5EB2"),
            Some("ATOM")
        );
        assert_eq!(index.lookup("uatom"), Some("ATOM"));
        assert_eq!(index.lookup("osmo1contractaddr"), Some("WRAP"));
        assert_eq!(index.lookup("cw20:osmo1contractaddr"), Some("WRAP"));
        assert_eq!(index.lookup("nosymbol"), None);
    }

    #[test]
    fn malformed_asset_list_is_an_error() {
        assert!(AssetIndex::from_asset_list(json!({"assets": "nope"})).is_err());
        assert!(AssetIndex::from_asset_list(json!({})).unwrap().is_empty());
    }

    #[test]
    fn heuristic_table() {
        assert_eq!(known_denom_symbol("uatom"), Some("ATOM"));
        assert_eq!(known_denom_symbol("untrn"), Some("NTRN"));
        assert_eq!(known_denom_symbol("ufoo"), None);
    }

    #[test]
    fn shortened_form_has_fixed_prefix_and_suffix() {
        let denom = "ibc/0123456789ABCDEF0123456789ABCDEF0123456789ABCDEF0123456789ABCDEF";
        let short = shorten_denom(denom);
        assert_eq!(short, "ibc/012345…ABCDEF");
        assert_eq!(short.chars().count(), SHORT_DENOM_PREFIX + 1 + SHORT_DENOM_SUFFIX);
    }

    #[test]
    fn short_or_empty_inputs() {
        assert_eq!(shorten_denom("uatom"), "uatom");
        assert_eq!(shorten_denom("   "), "UNKNOWN");
        assert_eq!(shorten_with("abcdefghij", 2, 2), "ab…ij");
    }
}
