use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::error::{SourceError, SourceErrorKind};
use crate::sources::{SourceAdapter, SourceReport};
use crate::types::{FailureManifest, Opportunity};

/// Run every source concurrently, each bounded by `per_source_timeout`, and settle all.
///
/// Records come back concatenated in source order. A source that times out or
/// fails contributes nothing but its manifest entry; one that returned records
/// *and* an error keeps its records and is still counted as degraded. Ids are
/// unique in the output; later duplicates are dropped.
pub async fn aggregate(
    sources: &[Arc<dyn SourceAdapter>],
    per_source_timeout: Duration,
) -> (Vec<Opportunity>, FailureManifest) {
    let runs = sources.iter().map(|source| async move {
        match tokio::time::timeout(per_source_timeout, source.fetch_and_normalize()).await {
            Ok(report) => report,
            Err(_) => SourceReport::failed(
                source.name(),
                SourceError::new(
                    SourceErrorKind::Timeout,
                    format!("no result within {}ms", per_source_timeout.as_millis()),
                ),
            ),
        }
    });
    let reports = join_all(runs).await;

    let mut manifest = FailureManifest::new(sources.len());
    let mut seen: HashSet<String> = HashSet::new();
    let mut opportunities = Vec::new();

    for report in reports {
        if let Some(err) = &report.error {
            warn!(
                source = %report.source,
                kind = %err.kind,
                records = report.opportunities.len(),
                "Source degraded: {}",
                err.message
            );
            manifest.record(&report.source, err);
        }
        for opp in report.opportunities {
            if seen.insert(opp.id.clone()) {
                opportunities.push(opp);
            } else {
                debug!(source = %report.source, id = %opp.id, "Dropping duplicate opportunity");
            }
        }
    }

    info!(
        opportunities = opportunities.len(),
        degraded = manifest.failures.len(),
        "Aggregation finished: {}",
        manifest.summary()
    );
    (opportunities, manifest)
}

/// [`aggregate`], abandoned when `shutdown` resolves first. In-flight fetches are
/// dropped; caches only ever hold completed responses.
pub async fn aggregate_until<S>(
    sources: &[Arc<dyn SourceAdapter>],
    per_source_timeout: Duration,
    shutdown: S,
) -> Option<(Vec<Opportunity>, FailureManifest)>
where
    S: Future<Output = ()>,
{
    tokio::select! {
        biased;
        _ = shutdown => {
            info!("Aggregation cancelled by shutdown");
            None
        }
        result = aggregate(sources, per_source_timeout) => Some(result),
    }
}
