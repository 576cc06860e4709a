//! In-process transports and sources for exercising the engine without the network.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};

use crate::cache::TtlCache;
use crate::error::{SourceError, SourceErrorKind, TransportError};
use crate::fetcher::Fetcher;
use crate::sources::{SourceAdapter, SourceReport};
use crate::transport::{Transport, TransportChain};
use crate::types::{Opportunity, OpportunityDraft};

type Handler = dyn Fn(&str) -> Result<Value, TransportError> + Send + Sync;

/// Answers every request with a closure of the requested URL.
pub struct FnTransport {
    name: String,
    handler: Box<Handler>,
}

impl FnTransport {
    pub fn new<F>(name: &str, handler: F) -> Self
    where
        F: Fn(&str) -> Result<Value, TransportError> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            handler: Box::new(handler),
        }
    }
}

#[async_trait]
impl Transport for FnTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn attempt(&self, url: &str) -> Result<Value, TransportError> {
        (self.handler)(url)
    }
}

/// Like [`FnTransport`], but sleeps before answering URLs containing `slow_path`.
pub struct DelayedFnTransport {
    inner: FnTransport,
    slow_path: String,
    delay: Duration,
}

impl DelayedFnTransport {
    pub fn new<F>(slow_path: &str, delay: Duration, handler: F) -> Self
    where
        F: Fn(&str) -> Result<Value, TransportError> + Send + Sync + 'static,
    {
        Self {
            inner: FnTransport::new("direct", handler),
            slow_path: slow_path.to_string(),
            delay,
        }
    }
}

#[async_trait]
impl Transport for DelayedFnTransport {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn attempt(&self, url: &str) -> Result<Value, TransportError> {
        if url.contains(&self.slow_path) {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.attempt(url).await
    }
}

/// Never answers within any sane timeout.
pub struct SlowTransport {
    name: String,
    delay: Duration,
}

impl SlowTransport {
    pub fn new(name: &str, delay: Duration) -> Self {
        Self {
            name: name.to_string(),
            delay,
        }
    }
}

#[async_trait]
impl Transport for SlowTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn attempt(&self, _url: &str) -> Result<Value, TransportError> {
        tokio::time::sleep(self.delay).await;
        Ok(Value::Null)
    }
}

/// Always returns `body`, counting calls.
pub fn counting_transport(body: Value) -> (Arc<dyn Transport>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let transport = FnTransport::new("direct", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(body.clone())
    });
    (Arc::new(transport), calls)
}

pub fn chain_of(transports: Vec<Arc<dyn Transport>>) -> TransportChain {
    TransportChain::new(transports, Duration::from_millis(200))
}

/// Fetcher backed by a single routing closure.
pub fn fetcher_with<F>(handler: F) -> Fetcher
where
    F: Fn(&str) -> Result<Value, TransportError> + Send + Sync + 'static,
{
    Fetcher::new(
        chain_of(vec![Arc::new(FnTransport::new("direct", handler))]),
        Arc::new(TtlCache::new()),
    )
}

/// Fetcher whose answers for `slow_path` URLs arrive after `delay`.
/// Keep `delay` under the 200ms attempt timeout of [`chain_of`].
pub fn delayed_fetcher_with<F>(slow_path: &str, delay: Duration, handler: F) -> Fetcher
where
    F: Fn(&str) -> Result<Value, TransportError> + Send + Sync + 'static,
{
    Fetcher::new(
        chain_of(vec![Arc::new(DelayedFnTransport::new(slow_path, delay, handler))]),
        Arc::new(TtlCache::new()),
    )
}

/// Listing payload of `n` bonded validators with distinct keys.
pub fn bonded_validators(n: u8) -> Value {
    let validators: Vec<Value> = (0..n)
        .map(|i| {
            json!({
                "operator_address": format!("valoper-{i}"),
                "consensus_pubkey": {
                    "@type": "/cosmos.crypto.ed25519.PubKey",
                    "key": STANDARD.encode([i; 32]),
                },
                "jailed": false,
                "status": "BOND_STATUS_BONDED",
                "tokens": "1000000",
                "description": {"moniker": format!("v{i}")},
                "commission": {"commission_rates": {"rate": "0.05"}},
            })
        })
        .collect();
    json!({"validators": validators, "pagination": {"next_key": null}})
}

pub fn not_found(url: &str) -> TransportError {
    TransportError::Status {
        transport: format!("direct {url}"),
        status: 404,
    }
}

/// Source that returns fixed records after `delay`, optionally with an error attached.
pub struct StaticSource {
    pub name: &'static str,
    pub ids: Vec<&'static str>,
    pub error: Option<SourceErrorKind>,
    pub delay: Duration,
}

impl StaticSource {
    pub fn ok(name: &'static str, ids: Vec<&'static str>) -> Arc<dyn SourceAdapter> {
        Arc::new(Self {
            name,
            ids,
            error: None,
            delay: Duration::ZERO,
        })
    }
}

#[async_trait]
impl SourceAdapter for StaticSource {
    fn name(&self) -> &str {
        self.name
    }

    async fn fetch_and_normalize(&self) -> SourceReport {
        tokio::time::sleep(self.delay).await;
        let opps = self
            .ids
            .iter()
            .map(|id| {
                Opportunity::new(OpportunityDraft {
                    platform: self.name.to_string(),
                    provider_id: id.to_string(),
                    ..Default::default()
                })
            })
            .collect();
        match self.error {
            None => SourceReport::ok(self.name, opps),
            Some(kind) => SourceReport::partial(self.name, opps, SourceError::new(kind, "partial")),
        }
    }
}
