use std::time::Duration;

use crate::error::{AppError, Result};

pub const REGISTRY_BASE_URL: &str = "https://raw.githubusercontent.com/cosmos/chain-registry/master";
pub const OSMOSIS_POOLS_URL: &str = "https://api-osmosis.imperator.co/pools/v2/all?low_liquidity=false";
pub const OSMOSIS_APR_URL: &str = "https://api-osmosis.imperator.co/apr/v2/all";
pub const OSMOSIS_LCD_URL: &str = "https://lcd.osmosis.zone";
pub const ASTROPORT_POOLS_URL: &str = "https://app.astroport.fi/api/pools?chainId=neutron-1";
pub const NEUTRON_LCD_URL: &str = "https://rest-kralum.neutron-1.neutron.org";
pub const DEFILLAMA_POOLS_URL: &str = "https://yields.llama.fi/pools";
pub const STAKING_LCD_URL: &str = "https://cosmos-rest.publicnode.com";
pub const PRICE_URL: &str = "https://coins.llama.fi/prices/current/coingecko:cosmos";

/// Asset registries are refreshed at most once an hour.
pub const REGISTRY_TTL_SECS: u64 = 3600;

/// Validators / signing infos requested per LCD page.
pub const LCD_PAGE_LIMIT: u32 = 200;

/// Hard stop for cursor-following; hitting it is reported as a payload error.
pub const MAX_PAGES: usize = 500;

/// Per-validator slash lookups run this many at a time...
pub const SLASH_BATCH_SIZE: usize = 5;

/// ...with this pause between batches.
pub const SLASH_BATCH_DELAY_MS: u64 = 300;

/// Unresolved denoms render as `<first N>…<last M>`.
pub const SHORT_DENOM_PREFIX: usize = 10;
pub const SHORT_DENOM_SUFFIX: usize = 6;

/// Rendered for any metric that is missing or not a usable number.
pub const UNKNOWN_SENTINEL: &str = "N/A";

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub api_port: u16,
    /// Symbol of the asset whose opportunities are aggregated (TRACKED_SYMBOL).
    pub tracked_symbol: String,
    /// Raw denominations that also count as the tracked asset (TRACKED_DENOMS, comma-separated).
    pub tracked_denoms: Vec<String>,
    /// Chain whose asset registry is consulted first (PRIMARY_CHAIN).
    pub primary_chain: String,
    pub registry_base_url: String,
    pub osmosis_pools_url: String,
    pub osmosis_apr_url: String,
    pub osmosis_lcd_url: String,
    pub astroport_pools_url: String,
    pub neutron_lcd_url: String,
    pub defillama_pools_url: String,
    /// DefiLlama chain names to keep (DEFILLAMA_CHAINS, comma-separated).
    pub defillama_chains: Vec<String>,
    pub staking_lcd_url: String,
    pub staking_chain: String,
    pub staking_denom: String,
    pub staking_exponent: u32,
    pub bech32_prefix: String,
    pub price_url: String,
    /// Local development proxy, tried first when set (DEV_PROXY_URL).
    pub dev_proxy_url: Option<String>,
    /// Generic pass-through relay, tried last when set (RELAY_URL).
    pub relay_url: Option<String>,
    pub attempt_timeout: Duration,
    pub source_timeout: Duration,
    pub refresh_interval: Duration,
    pub pool_cache_ttl: Duration,
    /// Budget for all per-validator slash lookups in one cycle (SLASH_LOOKUP_TIMEOUT_SECS).
    /// Capped at half the source timeout when wired up.
    pub slash_lookup_timeout: Duration,
    /// Records of a failed source are carried forward at most this long (STALE_MAX_AGE_SECS).
    pub stale_max_age: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            tracked_symbol: std::env::var("TRACKED_SYMBOL").unwrap_or_else(|_| "ATOM".to_string()),
            tracked_denoms: list_var(
                "TRACKED_DENOMS",
                "uatom,ibc/27394FB092D2ECCD56123C74F36E4C1F926001CEADA9CA97EA622B25F41E5EB2,\
                 ibc/C4CFF46FD6DE35CA4CF4CE031E643C8FDC9BA4B99AE598E9B0ED98FE3A2319F9",
            ),
            primary_chain: std::env::var("PRIMARY_CHAIN").unwrap_or_else(|_| "osmosis".to_string()),
            registry_base_url: var_or("REGISTRY_BASE_URL", REGISTRY_BASE_URL),
            osmosis_pools_url: var_or("OSMOSIS_POOLS_URL", OSMOSIS_POOLS_URL),
            osmosis_apr_url: var_or("OSMOSIS_APR_URL", OSMOSIS_APR_URL),
            osmosis_lcd_url: var_or("OSMOSIS_LCD_URL", OSMOSIS_LCD_URL),
            astroport_pools_url: var_or("ASTROPORT_POOLS_URL", ASTROPORT_POOLS_URL),
            neutron_lcd_url: var_or("NEUTRON_LCD_URL", NEUTRON_LCD_URL),
            defillama_pools_url: var_or("DEFILLAMA_POOLS_URL", DEFILLAMA_POOLS_URL),
            defillama_chains: list_var("DEFILLAMA_CHAINS", "Cosmos,Osmosis,Neutron"),
            staking_lcd_url: var_or("STAKING_LCD_URL", STAKING_LCD_URL),
            staking_chain: var_or("STAKING_CHAIN", "cosmoshub"),
            staking_denom: var_or("STAKING_DENOM", "uatom"),
            staking_exponent: parse_var("STAKING_EXPONENT", 6)?,
            bech32_prefix: var_or("BECH32_PREFIX", "cosmos"),
            price_url: var_or("PRICE_URL", PRICE_URL),
            dev_proxy_url: optional_var("DEV_PROXY_URL"),
            relay_url: optional_var("RELAY_URL"),
            attempt_timeout: Duration::from_secs(parse_var("ATTEMPT_TIMEOUT_SECS", 10)?),
            source_timeout: Duration::from_secs(parse_var("SOURCE_TIMEOUT_SECS", 60)?),
            refresh_interval: Duration::from_secs(parse_var("REFRESH_INTERVAL_SECS", 300)?),
            pool_cache_ttl: Duration::from_secs(parse_var("POOL_CACHE_TTL_SECS", 120)?),
            slash_lookup_timeout: Duration::from_secs(parse_var("SLASH_LOOKUP_TIMEOUT_SECS", 30)?),
            stale_max_age: Duration::from_secs(parse_var("STALE_MAX_AGE_SECS", 900)?),
        })
    }
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn list_var(name: &str, default: &str) -> Vec<String> {
    split_list(&var_or(name, default))
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("{name} has an invalid value: {raw}"))),
        Err(_) => Ok(default),
    }
}

/// Split a comma-separated list, dropping blanks.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
