use std::collections::HashMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bech32::{Bech32, Hrp};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use crate::types::{ConsensusPubKey, SigningRecord, SigningStats, Validator};

pub const ED25519_PUBKEY_TYPE: &str = "/cosmos.crypto.ed25519.PubKey";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("validator has no consensus key")]
    MissingKey,
    #[error("unsupported consensus key type {0}")]
    UnsupportedKeyType(String),
    #[error("consensus key is not valid base64")]
    BadEncoding,
    #[error("ed25519 key must be 32 bytes, got {0}")]
    BadLength(usize),
    #[error("bech32: {0}")]
    Bech32(String),
}

/// Derive the bech32 consensus address (`<prefix>valcons1…`) signing infos are keyed by:
/// the first 20 bytes of sha256 over the raw ed25519 public key.
pub fn consensus_address(
    key: &ConsensusPubKey,
    bech32_prefix: &str,
) -> Result<String, IdentityError> {
    if key.type_url != ED25519_PUBKEY_TYPE {
        return Err(IdentityError::UnsupportedKeyType(key.type_url.clone()));
    }
    let raw = STANDARD
        .decode(key.key_base64.trim())
        .map_err(|_| IdentityError::BadEncoding)?;
    if raw.len() != 32 {
        return Err(IdentityError::BadLength(raw.len()));
    }
    let digest = Sha256::digest(&raw);
    let hrp = Hrp::parse(&format!("{bech32_prefix}valcons"))
        .map_err(|e| IdentityError::Bech32(e.to_string()))?;
    bech32::encode::<Bech32>(hrp, &digest[..20]).map_err(|e| IdentityError::Bech32(e.to_string()))
}

/// `clamp(1 − missed/window, 0, 1)`; undefined for a non-positive window.
pub fn uptime(missed: u64, window_blocks: i64) -> Option<f64> {
    if window_blocks <= 0 {
        return None;
    }
    Some((1.0 - missed as f64 / window_blocks as f64).clamp(0.0, 1.0))
}

/// Join validators with their signing records and slash counts, keyed by operator address.
///
/// Returns an empty map when `window_blocks <= 0`. A validator whose consensus
/// address cannot be derived, or has no signing record, gets the default stats.
pub fn compute_signing_stats(
    validators: &[Validator],
    records: &HashMap<String, SigningRecord>,
    slash_counts: &HashMap<String, u32>,
    window_blocks: i64,
    bech32_prefix: &str,
) -> HashMap<String, SigningStats> {
    if window_blocks <= 0 {
        return HashMap::new();
    }

    validators
        .iter()
        .map(|v| {
            let stats = match signing_record_for(v, records, bech32_prefix) {
                Some(record) => SigningStats {
                    uptime: uptime(record.missed_blocks_count, window_blocks),
                    missed: record.missed_blocks_count,
                    tombstoned: record.tombstoned,
                    slash_count: slash_counts
                        .get(&v.operator_address)
                        .copied()
                        .unwrap_or(record.slash_event_count),
                },
                None => SigningStats::default(),
            };
            (v.operator_address.clone(), stats)
        })
        .collect()
}

fn signing_record_for<'a>(
    v: &Validator,
    records: &'a HashMap<String, SigningRecord>,
    bech32_prefix: &str,
) -> Option<&'a SigningRecord> {
    let key = match v.consensus_pub_key.as_ref() {
        Some(k) => k,
        None => {
            debug!(validator = %v.operator_address, "{}", IdentityError::MissingKey);
            return None;
        }
    };
    match consensus_address(key, bech32_prefix) {
        Ok(addr) => {
            let record = records.get(&addr);
            if record.is_none() {
                debug!(validator = %v.operator_address, consensus = %addr, "No signing record");
            }
            record
        }
        Err(e) => {
            debug!(validator = %v.operator_address, "Consensus identity derivation failed: {e}");
            None
        }
    }
}
