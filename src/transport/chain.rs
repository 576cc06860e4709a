use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::TransportError;

/// One way of reaching an upstream URL. Implementations must not retry internally;
/// the [`TransportChain`] decides what to try next.
#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &str;

    async fn attempt(&self, url: &str) -> Result<Value, TransportError>;
}

// ---------------------------------------------------------------------------
// HTTP transports
// ---------------------------------------------------------------------------

/// How an [`HttpTransport`] maps the target URL onto the URL it actually requests.
#[derive(Debug, Clone)]
enum Route {
    /// Request the target as-is.
    Direct,
    /// Request `<base>?url=<target>` (local dev proxy or public relay).
    PassThrough(String),
}

pub struct HttpTransport {
    name: String,
    route: Route,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn direct(client: reqwest::Client) -> Self {
        Self {
            name: "direct".to_string(),
            route: Route::Direct,
            client,
        }
    }

    pub fn dev_proxy(client: reqwest::Client, base: &str) -> Self {
        Self {
            name: "dev_proxy".to_string(),
            route: Route::PassThrough(base.to_string()),
            client,
        }
    }

    pub fn relay(client: reqwest::Client, base: &str) -> Self {
        Self {
            name: "relay".to_string(),
            route: Route::PassThrough(base.to_string()),
            client,
        }
    }

    fn request_url(&self, target: &str) -> Result<Url, TransportError> {
        let parsed = match &self.route {
            Route::Direct => Url::parse(target),
            Route::PassThrough(base) => Url::parse_with_params(base, &[("url", target)]),
        };
        parsed.map_err(|e| TransportError::Url {
            transport: self.name.clone(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn attempt(&self, url: &str) -> Result<Value, TransportError> {
        let request_url = self.request_url(url)?;
        let resp = self.client.get(request_url).send().await.map_err(|e| TransportError::Network {
            transport: self.name.clone(),
            message: e.to_string(),
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                transport: self.name.clone(),
                status: status.as_u16(),
            });
        }

        resp.json::<Value>().await.map_err(|e| TransportError::Decode {
            transport: self.name.clone(),
            message: e.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// TransportChain
// ---------------------------------------------------------------------------

/// Ordered list of transports. Each call walks the list until one succeeds;
/// every attempt gets its own timeout.
#[derive(Clone)]
pub struct TransportChain {
    transports: Vec<Arc<dyn Transport>>,
    attempt_timeout: Duration,
}

impl TransportChain {
    pub fn new(transports: Vec<Arc<dyn Transport>>, attempt_timeout: Duration) -> Self {
        Self {
            transports,
            attempt_timeout,
        }
    }

    /// Dev proxy (if configured) → direct → relay (if configured).
    pub fn from_parts(
        client: reqwest::Client,
        dev_proxy_url: Option<&str>,
        relay_url: Option<&str>,
        attempt_timeout: Duration,
    ) -> Self {
        let mut transports: Vec<Arc<dyn Transport>> = Vec::new();
        if let Some(base) = dev_proxy_url {
            transports.push(Arc::new(HttpTransport::dev_proxy(client.clone(), base)));
        }
        transports.push(Arc::new(HttpTransport::direct(client.clone())));
        if let Some(base) = relay_url {
            transports.push(Arc::new(HttpTransport::relay(client, base)));
        }
        Self::new(transports, attempt_timeout)
    }

    pub fn transport_names(&self) -> Vec<&str> {
        self.transports.iter().map(|t| t.name()).collect()
    }

    pub async fn get_json(&self, url: &str) -> Result<Value, TransportError> {
        let mut attempts = Vec::with_capacity(self.transports.len());

        for transport in &self.transports {
            let outcome = tokio::time::timeout(self.attempt_timeout, transport.attempt(url)).await;
            let err = match outcome {
                Ok(Ok(value)) => {
                    if !attempts.is_empty() {
                        debug!(
                            transport = transport.name(),
                            url,
                            "Succeeded after {} failed attempt(s)",
                            attempts.len()
                        );
                    }
                    return Ok(value);
                }
                Ok(Err(e)) => e,
                Err(_) => TransportError::Timeout {
                    transport: transport.name().to_string(),
                    timeout_ms: self.attempt_timeout.as_millis() as u64,
                },
            };
            debug!(transport = transport.name(), url, "Transport attempt failed: {err}");
            attempts.push(err);
        }

        warn!(url, attempts = attempts.len(), "All transports exhausted");
        Err(TransportError::Exhausted {
            url: url.to_string(),
            attempts,
        })
    }
}
