use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::health::{HealthReport, HealthState};
use crate::api::latency::{LatencyStats, LatencySummary};
use crate::error::AppError;
use crate::feed::{
    sort_opportunities, sort_validators, sort_validators_by, FeedSnapshot, FeedStore,
    OpportunityFilter, PoolSortKey, SortDirection, ValidatorFilter, ValidatorSortKey,
};
use crate::types::{FailureManifest, Opportunity, ValidatorView};

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<FeedStore>,
    pub health: Arc<HealthState>,
    pub latency: Arc<LatencyStats>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/opportunities", get(get_opportunities))
        .route("/validators", get(get_validators))
        .route("/sources", get(get_sources))
        .route("/health", get(get_health))
        .route("/stats/latency", get(get_stats_latency))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct OpportunitiesQuery {
    pub sort: Option<PoolSortKey>,
    pub dir: Option<SortDirection>,
    pub chain: Option<String>,
    pub platform: Option<String>,
    pub min_yield: Option<f64>,
    pub q: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ValidatorsQuery {
    pub sort: Option<ValidatorSortKey>,
    pub dir: Option<SortDirection>,
    #[serde(default)]
    pub bonded_only: bool,
    #[serde(default)]
    pub hide_jailed: bool,
    pub q: Option<String>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpportunitiesResponse {
    pub refreshed_at_ms: u64,
    pub degraded: String,
    pub stale_sources: Vec<String>,
    pub count: usize,
    pub opportunities: Vec<Opportunity>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorsResponse {
    pub refreshed_at_ms: u64,
    pub count: usize,
    pub validators: Vec<ValidatorView>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourcesResponse {
    pub cycle: u64,
    pub refreshed_at_ms: u64,
    pub summary: String,
    pub manifest: FailureManifest,
    pub stale_sources: Vec<String>,
    pub stale_since_ms: BTreeMap<String, u64>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn snapshot(state: &ApiState) -> Result<Arc<FeedSnapshot>, AppError> {
    state
        .store
        .latest()
        .ok_or_else(|| AppError::NotReady("first refresh has not completed".to_string()))
}

async fn get_opportunities(
    State(state): State<ApiState>,
    Query(params): Query<OpportunitiesQuery>,
) -> Result<Json<OpportunitiesResponse>, AppError> {
    let snap = snapshot(&state)?;

    let filter = OpportunityFilter {
        chain: params.chain,
        platform: params.platform,
        min_yield: params.min_yield,
        search: params.q,
    };
    let mut opportunities = filter.apply(snap.opportunities.clone());
    sort_opportunities(
        &mut opportunities,
        params.sort.unwrap_or_default(),
        params.dir.unwrap_or_default(),
    );

    Ok(Json(OpportunitiesResponse {
        refreshed_at_ms: snap.refreshed_at_ms,
        degraded: snap.manifest.summary(),
        stale_sources: snap.stale_sources.clone(),
        count: opportunities.len(),
        opportunities,
    }))
}

async fn get_validators(
    State(state): State<ApiState>,
    Query(params): Query<ValidatorsQuery>,
) -> Result<Json<ValidatorsResponse>, AppError> {
    let snap = snapshot(&state)?;

    let filter = ValidatorFilter {
        bonded_only: params.bonded_only,
        hide_jailed: params.hide_jailed,
        search: params.q,
    };
    let mut validators = filter.apply(snap.validators.clone());
    match params.sort {
        Some(key) => sort_validators_by(&mut validators, key, params.dir.unwrap_or_default()),
        None => sort_validators(&mut validators),
    }

    Ok(Json(ValidatorsResponse {
        refreshed_at_ms: snap.refreshed_at_ms,
        count: validators.len(),
        validators,
    }))
}

async fn get_sources(State(state): State<ApiState>) -> Result<Json<SourcesResponse>, AppError> {
    let snap = snapshot(&state)?;
    Ok(Json(SourcesResponse {
        cycle: snap.cycle,
        refreshed_at_ms: snap.refreshed_at_ms,
        summary: snap.manifest.summary(),
        manifest: snap.manifest.clone(),
        stale_sources: snap.stale_sources.clone(),
        stale_since_ms: snap.stale_since_ms.clone(),
    }))
}

async fn get_health(State(state): State<ApiState>) -> Json<HealthReport> {
    Json(state.health.report())
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencySummary> {
    Json(state.latency.summary())
}
