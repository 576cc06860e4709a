use crate::config::UNKNOWN_SENTINEL;

/// How a provider expresses a rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YieldUnit {
    /// `0.1537` means 15.37%.
    Fraction,
    /// `15.37` means 15.37%.
    Percent,
    /// Source mixes both: values under 1 are taken as fractions.
    Detect,
}

/// Normalize a provider rate to a percentage. Negative or non-finite input is unknown.
///
/// Under `Detect`, a genuine sub-1% rate (e.g. `0.5` meaning 0.5%) is misread as
/// 50%; the ambiguity is accepted.
pub fn normalize_yield(raw: f64, unit: YieldUnit) -> Option<f64> {
    if !raw.is_finite() || raw < 0.0 {
        return None;
    }
    let pct = match unit {
        YieldUnit::Fraction => raw * 100.0,
        YieldUnit::Percent => raw,
        YieldUnit::Detect if raw < 1.0 => raw * 100.0,
        YieldUnit::Detect => raw,
    };
    Some(pct)
}

/// `Some(x)` only for finite, non-negative numbers.
pub fn sanitize_amount(x: f64) -> Option<f64> {
    (x.is_finite() && x >= 0.0).then_some(x)
}

pub fn format_yield(pct: Option<f64>) -> String {
    match pct.and_then(sanitize_amount) {
        Some(v) => format!("{v:.2}%"),
        None => UNKNOWN_SENTINEL.to_string(),
    }
}

/// `$1.5M`, `$12.3K`, `$750`; missing or non-positive values are unknown, never `$0`.
pub fn format_locked_value(usd: Option<f64>) -> String {
    let Some(v) = usd.filter(|v| v.is_finite() && *v > 0.0) else {
        return UNKNOWN_SENTINEL.to_string();
    };
    // Thresholds are on the rounded figure so 999_999 reads "$1.0M", not "$1000.0K".
    if (v / 100.0).round() >= 10_000.0 {
        format!("${:.1}M", v / 1_000_000.0)
    } else if v.round() >= 1_000.0 {
        format!("${:.1}K", v / 1_000.0)
    } else {
        format!("${:.0}", v.round())
    }
}

/// Nominal staking APR as a fraction:
/// `inflation × supply / bonded × (1 − community_tax)`.
pub fn staking_apr(
    inflation: f64,
    total_supply: f64,
    bonded: f64,
    community_tax: f64,
) -> Option<f64> {
    let inputs = [inflation, total_supply, bonded, community_tax];
    if !inputs.iter().all(|x| x.is_finite()) {
        return None;
    }
    if bonded <= 0.0
        || total_supply <= 0.0
        || inflation < 0.0
        || !(0.0..=1.0).contains(&community_tax)
    {
        return None;
    }
    Some(inflation * total_supply / bonded * (1.0 - community_tax))
}

/// Base units → display units (`uatom` → ATOM with exponent 6).
pub fn from_base_units(amount: f64, exponent: u32) -> f64 {
    amount / 10f64.powi(exponent as i32)
}
