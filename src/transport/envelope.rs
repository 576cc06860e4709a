//! Loosely-shaped list payloads.
//!
//! Upstreams wrap record lists differently (`[...]`, `{"data": [...]}`,
//! `{"pools": [...]}`, …). Each caller names the keyed envelopes it accepts in
//! priority order; the first match wins and is reported back.

use serde_json::Value;

use crate::error::PayloadError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeShape {
    /// The payload itself is the array.
    BareArray,
    /// `{ "<key>": [...] }`
    Keyed(&'static str),
}

impl std::fmt::Display for EnvelopeShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnvelopeShape::BareArray => write!(f, "[..]"),
            EnvelopeShape::Keyed(key) => write!(f, "{{{key}: [..]}}"),
        }
    }
}

/// Envelopes accepted by pool-listing providers, in priority order.
pub const POOL_LIST_KEYS: &[&str] = &["pools", "data", "result"];

/// Extract the record list from `payload`, trying a bare array first and then
/// each of `keys` in order. Keys whose value is not an array are skipped.
pub fn decode_list(
    payload: Value,
    keys: &[&'static str],
) -> Result<(EnvelopeShape, Vec<Value>), PayloadError> {
    match payload {
        Value::Array(items) => Ok((EnvelopeShape::BareArray, items)),
        Value::Object(mut map) => {
            for &key in keys {
                if matches!(map.get(key), Some(Value::Array(_))) {
                    if let Some(Value::Array(items)) = map.remove(key) {
                        return Ok((EnvelopeShape::Keyed(key), items));
                    }
                }
            }
            Err(PayloadError::UnknownEnvelope { tried: tried(keys) })
        }
        _ => Err(PayloadError::UnknownEnvelope { tried: tried(keys) }),
    }
}

fn tried(keys: &[&'static str]) -> String {
    std::iter::once("[..]".to_string())
        .chain(keys.iter().map(|k| format!("{{{k}}}")))
        .collect::<Vec<_>>()
        .join(", ")
}

// ---------------------------------------------------------------------------
// Field helpers for schema-drift tolerant parsing
// ---------------------------------------------------------------------------

/// First present field among `keys`, read as f64 from either a number or a numeric string.
pub fn f64_field(v: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| v.get(*k).and_then(as_f64_lenient))
}

pub fn as_f64_lenient(v: &Value) -> Option<f64> {
    v.as_f64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse::<f64>().ok()))
        .filter(|x| x.is_finite())
}

/// First present field among `keys`, as a string (numbers are stringified).
pub fn str_field(v: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match v.get(*k)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Follow a path of object keys.
pub fn pointer<'a>(v: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(v, |cur, key| cur.get(*key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_array_wins() {
        let (shape, items) = decode_list(json!([{"a": 1}, {"a": 2}]), POOL_LIST_KEYS).unwrap();
        assert_eq!(shape, EnvelopeShape::BareArray);
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn keyed_envelopes_follow_priority_order() {
        let payload = json!({"data": [1], "pools": [1, 2, 3]});
        let (shape, items) = decode_list(payload, POOL_LIST_KEYS).unwrap();
        assert_eq!(shape, EnvelopeShape::Keyed("pools"));
        assert_eq!(items.len(), 3);
    }

    #[test]
    fn non_array_key_is_skipped() {
        let payload = json!({"pools": {"count": 2}, "data": [1, 2]});
        let (shape, _) = decode_list(payload, POOL_LIST_KEYS).unwrap();
        assert_eq!(shape, EnvelopeShape::Keyed("data"));
    }

    #[test]
    fn unknown_envelope_is_an_error() {
        let err = decode_list(json!({"items": []}), POOL_LIST_KEYS).unwrap_err();
        assert!(err.to_string().contains("{pools}"));
        assert!(decode_list(json!("nope"), &[]).is_err());
    }

    #[test]
    fn lenient_numbers() {
        let v = json!({"a": "12.5", "b": 3, "c": "NaN", "d": "x"});
        assert_eq!(f64_field(&v, &["a"]), Some(12.5));
        assert_eq!(f64_field(&v, &["missing", "b"]), Some(3.0));
        assert_eq!(f64_field(&v, &["c"]), None);
        assert_eq!(f64_field(&v, &["d"]), None);
        assert_eq!(str_field(&v, &["b"]).as_deref(), Some("3"));
        assert_eq!(pointer(&json!({"x": {"y": 1}}), &["x", "y"]), Some(&json!(1)));
    }
}
