pub mod signing;
pub mod slashing;
pub mod yield_calc;

pub use signing::{compute_signing_stats, consensus_address, uptime};
pub use yield_calc::{format_locked_value, format_yield, normalize_yield, YieldUnit};
