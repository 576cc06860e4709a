use std::collections::HashSet;

/// The one asset whose opportunities are aggregated, and how to recognise it.
#[derive(Debug, Clone)]
pub struct TrackedAsset {
    symbol: String,
    denoms: HashSet<String>,
}

impl TrackedAsset {
    pub fn new(symbol: &str, denoms: &[String]) -> Self {
        Self {
            symbol: symbol.trim().to_uppercase(),
            denoms: denoms.iter().map(|d| d.trim().to_string()).filter(|d| !d.is_empty()).collect(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// A record is relevant when any of its symbols contains the tracked symbol as a
    /// whole token, its description mentions it as a whole word, or one of its raw
    /// denominations is a known alias.
    pub fn matches(&self, symbols: &[&str], description: &str, denoms: &[&str]) -> bool {
        symbols.iter().any(|s| self.has_token(s))
            || self.has_token(description)
            || denoms.iter().any(|d| self.denoms.contains(d.trim()))
    }

    /// `ATOM/OSMO`, `atom-usdc` and `"Stake ATOM"` contain the token; `STATOM` and `ATOMIC` do not.
    pub fn has_token(&self, text: &str) -> bool {
        !self.symbol.is_empty()
            && text
                .split(|c: char| !c.is_alphanumeric())
                .any(|tok| tok.eq_ignore_ascii_case(&self.symbol))
    }
}
