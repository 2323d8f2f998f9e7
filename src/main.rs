use anyhow::{Context, Result};
use perpgate::api::{self, AppState};
use perpgate::builder_filter::BuilderFilter;
use perpgate::cache::TtlCache;
use perpgate::config::Config;
use perpgate::middleware::request_logging_simple;
use perpgate::rate_limiter::RateLimiter;
use perpgate::registry::Registry;
use perpgate::services::leaderboard::LeaderboardService;
use perpgate::services::pnl::PnlService;
use perpgate::services::positions::PositionService;
use perpgate::services::trades::TradeService;
use perpgate::upstream::{DataSource, HyperliquidClient};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("failed to load configuration")?;
    init_tracing(&config.log_level);

    // Leaves first: rate limiter -> upstream client -> caches -> filter ->
    // registry -> services, per the dependency DAG (spec §9).
    let limiter = Arc::new(RateLimiter::new(config.rate_limit_max_weight, config.rate_limit_window_ms));
    let source: Arc<dyn DataSource> = Arc::new(
        HyperliquidClient::new(config.upstream_base_url.clone(), limiter)
            .context("failed to build upstream client")?,
    );

    let fills_cache = Arc::new(TtlCache::new(config.cache_fills_ttl_ms));
    let clearinghouse_cache = Arc::new(TtlCache::new(config.cache_clearinghouse_ttl_ms));
    let builder_filter = Arc::new(BuilderFilter::new(config.target_builder.clone()));
    let registry = Arc::new(Registry::new());

    let trades = Arc::new(TradeService::new(source.clone(), fills_cache, builder_filter.clone()));
    let positions = Arc::new(PositionService::new(trades.clone(), builder_filter.clone()));
    let pnl = Arc::new(PnlService::new(
        source.clone(),
        clearinghouse_cache,
        trades.clone(),
        builder_filter,
    ));
    let leaderboard = Arc::new(LeaderboardService::new(pnl.clone(), registry.clone()));

    let state = AppState {
        trades,
        positions,
        pnl,
        leaderboard,
        registry,
        source,
        datasource_name: "hyperliquid",
        default_max_start_capital: config.max_start_capital,
    };

    let app = api::router(state)
        .layer(CorsLayer::permissive())
        .layer(axum::middleware::from_fn(request_logging_simple));

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await.context("failed to bind listener")?;
    info!(%addr, "gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("gateway shut down cleanly");
    Ok(())
}

/// Waits for `SIGINT` or (on Unix) `SIGTERM`, whichever arrives first.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => tracing::error!(error = %err, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::warn!("received SIGINT, shutting down"),
        () = terminate => tracing::warn!("received SIGTERM, shutting down"),
    }
}

fn init_tracing(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
