use std::collections::{HashMap, HashSet};
use std::time::Duration;

use futures_util::future::join_all;
use serde_json::Value;
use tracing::{debug, warn};

use crate::fetcher::{with_query, Fetcher};
use crate::transport::envelope::{as_f64_lenient, pointer};

/// Transactions requested per tx-search page.
const TX_PAGE_LIMIT: usize = 100;

/// Stop following tx-search pages after this many; the count so far is kept.
const TX_MAX_PAGES: usize = 20;

/// Throttling for per-validator lookups.
#[derive(Debug, Clone, Copy)]
pub struct BatchPolicy {
    pub batch_size: usize,
    pub delay: Duration,
}

/// Count slash transactions for each operator address.
///
/// Lookups run `batch_size` at a time with `delay` between batches. A failed
/// lookup counts as zero.
pub async fn fetch_slash_counts(
    fetcher: &Fetcher,
    lcd_url: &str,
    operators: &[String],
    policy: BatchPolicy,
) -> HashMap<String, u32> {
    let mut counts = HashMap::with_capacity(operators.len());
    let batches: Vec<_> = operators.chunks(policy.batch_size.max(1)).collect();
    let total_batches = batches.len();

    for (i, batch) in batches.into_iter().enumerate() {
        let lookups = batch.iter().map(|op| async move {
            let count = match slash_count_for(fetcher, lcd_url, op).await {
                Ok(n) => n,
                Err(e) => {
                    warn!(validator = %op, "Slash lookup failed, counting 0: {e}");
                    0
                }
            };
            (op.clone(), count)
        });
        counts.extend(join_all(lookups).await);

        if i + 1 < total_batches && !policy.delay.is_zero() {
            tokio::time::sleep(policy.delay).await;
        }
        debug!("Slash lookup batch {}/{} ({} validators)", i + 1, total_batches, batch.len());
    }

    counts
}

async fn slash_count_for(
    fetcher: &Fetcher,
    lcd_url: &str,
    operator: &str,
) -> Result<u32, crate::error::TransportError> {
    let filter = format!("slash.address='{operator}'");
    let base = format!("{}/cosmos/tx/v1beta1/txs", lcd_url.trim_end_matches('/'));
    let limit = TX_PAGE_LIMIT.to_string();
    let mut tally = SlashTally::default();

    for page in 0..TX_MAX_PAGES {
        let offset = (page * TX_PAGE_LIMIT).to_string();
        let url = with_query(
            &base,
            &[
                ("events", filter.as_str()),
                ("pagination.limit", limit.as_str()),
                ("pagination.offset", offset.as_str()),
            ],
        )?;
        let payload = fetcher.get(&url).await?;
        let listed = tally.add_page(&payload, operator);

        let fetched = page * TX_PAGE_LIMIT + listed;
        let more = match search_total(&payload) {
            Some(total) => fetched < total,
            None => listed >= TX_PAGE_LIMIT,
        };
        if !more || listed == 0 {
            return Ok(tally.count());
        }
    }
    warn!(validator = %operator, pages = TX_MAX_PAGES, "Slash tx search truncated");
    Ok(tally.count())
}

/// `pagination.total` (older LCDs) or top-level `total`.
fn search_total(payload: &Value) -> Option<usize> {
    pointer(payload, &["pagination", "total"])
        .or_else(|| payload.get("total"))
        .and_then(as_f64_lenient)
        .filter(|t| *t >= 0.0)
        .map(|t| t as usize)
}

/// Distinct slash transactions seen across tx-search pages.
#[derive(Default)]
struct SlashTally {
    hashes: HashSet<String>,
    unhashed: u32,
}

impl SlashTally {
    /// Returns how many transactions the page listed, slashing or not.
    fn add_page(&mut self, payload: &Value, operator: &str) -> usize {
        let Some(txs) = payload.get("tx_responses").and_then(Value::as_array) else {
            return 0;
        };
        for (idx, tx) in txs.iter().enumerate() {
            if !tx_slashes(tx, operator) {
                continue;
            }
            match tx.get("txhash").and_then(Value::as_str) {
                Some(hash) => {
                    self.hashes.insert(hash.to_string());
                }
                // Transactions without a hash are still distinct entries.
                None => {
                    debug!("Slash tx #{idx} has no txhash");
                    self.unhashed += 1;
                }
            }
        }
        txs.len()
    }

    fn count(&self) -> u32 {
        self.hashes.len() as u32 + self.unhashed
    }
}

/// Number of distinct transactions carrying a `slash` event for `operator`.
/// Several slash sub-events in one transaction count once.
pub fn count_slash_txs(payload: &Value, operator: &str) -> u32 {
    let mut tally = SlashTally::default();
    tally.add_page(payload, operator);
    tally.count()
}

fn tx_slashes(tx: &Value, operator: &str) -> bool {
    let log_events = tx
        .get("logs")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|log| log.get("events").and_then(Value::as_array))
        .flatten();
    let top_events = pointer(tx, &["events"]).and_then(Value::as_array).into_iter().flatten();

    log_events.chain(top_events).any(|ev| is_slash_for(ev, operator))
}

fn is_slash_for(event: &Value, operator: &str) -> bool {
    if event.get("type").and_then(Value::as_str) != Some("slash") {
        return false;
    }
    event
        .get("attributes")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .any(|attr| {
            attr.get("key").and_then(Value::as_str) == Some("address")
                && attr.get("value").and_then(Value::as_str) == Some(operator)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::fetcher_with;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    fn slash_event(addr: &str) -> Value {
        json!({"type": "slash", "attributes": [
            {"key": "address", "value": addr},
            {"key": "reason", "value": "double_sign"}
        ]})
    }

    #[test]
    fn multiple_slash_events_in_one_tx_count_once() {
        let payload = json!({"tx_responses": [
            {"txhash": "AA", "logs": [{"events": [slash_event("val1"), slash_event("val1")]}]},
            {"txhash": "AA", "events": [slash_event("val1")]},
            {"txhash": "BB", "events": [slash_event("val1")]},
        ]});
        assert_eq!(count_slash_txs(&payload, "val1"), 2);
    }

    #[test]
    fn slash_events_for_other_validators_are_ignored() {
        let payload = json!({"tx_responses": [
            {"txhash": "AA", "events": [slash_event("val2")]},
            {"txhash": "BB", "events": [
                {"type": "transfer", "attributes": [{"key": "address", "value": "val1"}]}
            ]},
        ]});
        assert_eq!(count_slash_txs(&payload, "val1"), 0);
        assert_eq!(count_slash_txs(&json!({}), "val1"), 0);
    }

    #[tokio::test]
    async fn batches_are_bounded_and_paced() {
        let seen = Arc::new(Mutex::new(Vec::<(String, Instant)>::new()));
        let log = Arc::clone(&seen);
        let fetcher = fetcher_with(move |url| {
            log.lock().unwrap().push((url.to_string(), Instant::now()));
            Ok(json!({"tx_responses": []}))
        });

        let operators: Vec<String> = (0..5).map(|i| format!("val{i}")).collect();
        let policy = BatchPolicy {
            batch_size: 2,
            delay: Duration::from_millis(40),
        };
        let started = Instant::now();
        let counts = fetch_slash_counts(&fetcher, "https://lcd.example", &operators, policy).await;

        assert_eq!(counts.len(), 5);
        assert!(counts.values().all(|&c| c == 0));
        assert_eq!(seen.lock().unwrap().len(), 5);
        // 3 batches → 2 pauses.
        assert!(started.elapsed() >= Duration::from_millis(80));
    }

    #[tokio::test]
    async fn failed_lookup_counts_zero() {
        let fetcher = fetcher_with(|url| {
            if url.contains("bad") {
                Err(crate::testkit::not_found(url))
            } else {
                Ok(json!({"tx_responses": [{"txhash": "X", "events": [slash_event("good")]}]}))
            }
        });
        let operators = vec!["good".to_string(), "bad".to_string()];
        let policy = BatchPolicy {
            batch_size: 5,
            delay: Duration::ZERO,
        };
        let counts = fetch_slash_counts(&fetcher, "https://lcd.example", &operators, policy).await;
        assert_eq!(counts["good"], 1);
        assert_eq!(counts["bad"], 0);
    }

    fn slash_tx(hash: &str) -> Value {
        json!({"txhash": hash, "events": [slash_event("val1")]})
    }

    #[tokio::test]
    async fn tx_search_follows_pages_and_dedupes_across_them() {
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let log = Arc::clone(&seen);
        let fetcher = fetcher_with(move |url| {
            log.lock().unwrap().push(url.to_string());
            if url.contains("pagination.offset=0") {
                let txs: Vec<Value> = (0..100).map(|i| slash_tx(&format!("H{i}"))).collect();
                Ok(json!({"tx_responses": txs, "pagination": {"total": "130"}}))
            } else if url.contains("pagination.offset=100") {
                // H99 shows up again on the second page.
                let txs: Vec<Value> = (99..129).map(|i| slash_tx(&format!("H{i}"))).collect();
                Ok(json!({"tx_responses": txs, "pagination": {"total": "130"}}))
            } else {
                Ok(json!({"tx_responses": []}))
            }
        });

        let count = slash_count_for(&fetcher, "https://lcd.example/", "val1").await.unwrap();
        assert_eq!(count, 129);

        let urls = seen.lock().unwrap();
        assert_eq!(urls.len(), 2);
        assert!(urls.iter().all(|u| u.starts_with("https://lcd.example/cosmos/tx/v1beta1/txs?")));
    }

    #[tokio::test]
    async fn short_page_without_total_ends_the_search() {
        let calls = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&calls);
        let fetcher = fetcher_with(move |_| {
            *counter.lock().unwrap() += 1;
            Ok(json!({"tx_responses": [slash_tx("A"), slash_tx("B")]}))
        });
        assert_eq!(slash_count_for(&fetcher, "https://lcd.example", "val1").await.unwrap(), 2);
        assert_eq!(*calls.lock().unwrap(), 1);
    }
}
