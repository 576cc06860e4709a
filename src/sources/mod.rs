//! Per-provider adapters. Each one fetches a provider's payload and normalizes it
//! into [`Opportunity`] records; none of them ever return `Err`.

pub mod astroport;
pub mod defillama;
pub mod osmosis;
pub mod pagination;
pub mod relevance;
pub mod staking;

use async_trait::async_trait;

use crate::error::SourceError;
use crate::types::Opportunity;

pub use astroport::AstroportAdapter;
pub use defillama::DefiLlamaAdapter;
pub use osmosis::OsmosisAdapter;
pub use relevance::TrackedAsset;
pub use staking::{StakingAdapter, ValidatorFeed};

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable source name; also the `platform` of every record it emits.
    fn name(&self) -> &str;

    async fn fetch_and_normalize(&self) -> SourceReport;
}

/// Outcome of one adapter run. `error` may be set alongside records when the
/// source delivered only part of its data.
#[derive(Debug, Clone)]
pub struct SourceReport {
    pub source: String,
    pub opportunities: Vec<Opportunity>,
    pub error: Option<SourceError>,
}

impl SourceReport {
    pub fn ok(source: &str, opportunities: Vec<Opportunity>) -> Self {
        Self {
            source: source.to_string(),
            opportunities,
            error: None,
        }
    }

    pub fn failed(source: &str, error: impl Into<SourceError>) -> Self {
        Self {
            source: source.to_string(),
            opportunities: Vec::new(),
            error: Some(error.into()),
        }
    }

    pub fn partial(
        source: &str,
        opportunities: Vec<Opportunity>,
        error: impl Into<SourceError>,
    ) -> Self {
        Self {
            source: source.to_string(),
            opportunities,
            error: Some(error.into()),
        }
    }
}
