use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use yieldscan::api::{router, ApiState, HealthState, LatencyStats};
use yieldscan::cache::TtlCache;
use yieldscan::config::{Config, REGISTRY_TTL_SECS, SLASH_BATCH_DELAY_MS, SLASH_BATCH_SIZE};
use yieldscan::error::Result;
use yieldscan::feed::FeedStore;
use yieldscan::fetcher::{build_http_client, Fetcher};
use yieldscan::metrics::slashing::BatchPolicy;
use yieldscan::refresh::{shutdown_signal, FeedRefresher};
use yieldscan::resolver::AssetResolver;
use yieldscan::sources::staking::StakingParams;
use yieldscan::sources::{
    AstroportAdapter, DefiLlamaAdapter, OsmosisAdapter, SourceAdapter, StakingAdapter, TrackedAsset,
};
use yieldscan::transport::TransportChain;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Transport + shared response cache ---
    let client = build_http_client(&cfg)?;
    let chain = TransportChain::from_parts(
        client,
        cfg.dev_proxy_url.as_deref(),
        cfg.relay_url.as_deref(),
        cfg.attempt_timeout,
    );
    info!("Transport chain: {}", chain.transport_names().join(" -> "));
    let fetcher = Fetcher::new(chain, Arc::new(TtlCache::new()));

    // --- Asset resolution ---
    let trace_lcds = HashMap::from([
        ("osmosis".to_string(), cfg.osmosis_lcd_url.clone()),
        ("neutron".to_string(), cfg.neutron_lcd_url.clone()),
        (cfg.staking_chain.clone(), cfg.staking_lcd_url.clone()),
    ]);
    let resolver = Arc::new(AssetResolver::new(
        fetcher.clone(),
        &cfg.registry_base_url,
        &cfg.primary_chain,
        trace_lcds,
        Duration::from_secs(REGISTRY_TTL_SECS),
    ));
    let tracked = Arc::new(TrackedAsset::new(&cfg.tracked_symbol, &cfg.tracked_denoms));
    if cfg.tracked_denoms.is_empty() {
        warn!("TRACKED_DENOMS is empty; pools are matched by symbol only");
    }

    // --- Sources ---
    let staking = Arc::new(StakingAdapter::new(
        fetcher.clone(),
        StakingParams {
            lcd_url: cfg.staking_lcd_url.clone(),
            chain: cfg.staking_chain.clone(),
            denom: cfg.staking_denom.clone(),
            exponent: cfg.staking_exponent,
            symbol: cfg.tracked_symbol.clone(),
            bech32_prefix: cfg.bech32_prefix.clone(),
            price_url: Some(cfg.price_url.clone()),
            slash_policy: BatchPolicy {
                batch_size: SLASH_BATCH_SIZE,
                delay: Duration::from_millis(SLASH_BATCH_DELAY_MS),
            },
            slash_deadline: cfg.slash_lookup_timeout.min(cfg.source_timeout / 2),
        },
    ));
    let sources: Vec<Arc<dyn SourceAdapter>> = vec![
        Arc::new(OsmosisAdapter::new(
            fetcher.clone(),
            Arc::clone(&resolver),
            Arc::clone(&tracked),
            &cfg.osmosis_pools_url,
            &cfg.osmosis_apr_url,
            cfg.pool_cache_ttl,
        )),
        Arc::new(AstroportAdapter::new(
            fetcher.clone(),
            Arc::clone(&resolver),
            Arc::clone(&tracked),
            &cfg.astroport_pools_url,
            cfg.pool_cache_ttl,
        )),
        Arc::new(DefiLlamaAdapter::new(
            fetcher.clone(),
            Arc::clone(&tracked),
            &cfg.defillama_pools_url,
            &cfg.defillama_chains,
            cfg.pool_cache_ttl,
        )),
        staking.clone() as Arc<dyn SourceAdapter>,
    ];
    info!(
        "Tracking {} across {} sources (refresh every {}s)",
        tracked.symbol(),
        sources.len(),
        cfg.refresh_interval.as_secs()
    );

    // --- Shared state ---
    let store = FeedStore::new(cfg.stale_max_age);
    let health = Arc::new(HealthState::new());
    let latency = Arc::new(LatencyStats::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Feed refresher (background, every refresh_interval)
    let refresher = FeedRefresher::new(
        sources,
        Arc::clone(&store),
        Arc::clone(&health),
        Arc::clone(&latency),
        cfg.refresh_interval,
        cfg.source_timeout,
        shutdown_rx.clone(),
    )
    .with_validators(staking)
    .with_response_cache(Arc::clone(fetcher.cache()));
    let refresher_task = tokio::spawn(async move { refresher.run().await });

    // Ctrl-C flips the shutdown flag for every task
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {e}");
            return;
        }
        info!("Shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    // HTTP API server
    let api_state = ApiState {
        store,
        health,
        latency,
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_rx))
        .await?;

    if let Err(e) = refresher_task.await {
        warn!("Feed refresher task ended abnormally: {e}");
    }
    Ok(())
}
