use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use serde_json::Value;
use tracing::debug;

use crate::cache::TtlCache;
use crate::config::Config;
use crate::error::{Result, TransportError};
use crate::transport::TransportChain;

/// Shared reqwest client for every transport. Per-attempt deadlines are enforced
/// by the chain; this timeout is only a backstop.
pub fn build_http_client(cfg: &Config) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(cfg.attempt_timeout + Duration::from_secs(5))
        .user_agent(concat!("yieldscan/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// JSON GETs through the transport chain, with an optional response cache in front.
#[derive(Clone)]
pub struct Fetcher {
    chain: TransportChain,
    responses: Arc<TtlCache<Value>>,
}

impl Fetcher {
    pub fn new(chain: TransportChain, responses: Arc<TtlCache<Value>>) -> Self {
        Self { chain, responses }
    }

    /// Uncached GET.
    pub async fn get(&self, url: &str) -> std::result::Result<Value, TransportError> {
        self.chain.get_json(url).await
    }

    /// GET served from the response cache while fresh; a miss (or expiry) refetches.
    pub async fn get_cached(
        &self,
        url: &str,
        ttl: Duration,
    ) -> std::result::Result<Value, TransportError> {
        self.responses
            .get_or_try_fetch(url, ttl, || {
                debug!(url, "Response cache miss");
                self.chain.get_json(url)
            })
            .await
    }

    pub fn cache(&self) -> &Arc<TtlCache<Value>> {
        &self.responses
    }
}

/// Append query parameters to `base`, keeping any it already has.
pub fn with_query(
    base: &str,
    params: &[(&str, &str)],
) -> std::result::Result<String, TransportError> {
    Url::parse_with_params(base, params)
        .map(String::from)
        .map_err(|e| TransportError::Url {
            transport: "builder".to_string(),
            message: format!("{base}: {e}"),
        })
}
