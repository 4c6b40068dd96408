//! Market Surveillance Engine
//! Mission: surface volume bursts, price jumps, liquidity withdrawal,
//! coordinated cross-market movement and front-running ahead of news.

use std::env;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use market_surveillance_engine::adapters::{ClobOrderBookPoller, DiscordWebhook, GammaMarketCatalog, LoggingPersistentStore};
use market_surveillance_engine::cli::{run_config_action, Cli, Command};
use market_surveillance_engine::config::{ConfigManager, ConfigSnapshot};
use market_surveillance_engine::orchestrator::Orchestrator;
use market_surveillance_engine::ports::{LiveOrderBookPort, MarketCatalogPort, NullPerformanceTracker};
use market_surveillance_engine::telemetry::health::{router, HealthState};

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    let cli = Cli::parse();
    let manager = Arc::new(ConfigManager::from_env());

    match cli.command.unwrap_or(Command::Run) {
        Command::Config { action } => std::process::exit(run_config_action(&manager, &action)),
        Command::Notify { action: _ } => {
            let webhook_url = env::var("DISCORD_WEBHOOK_URL").context("DISCORD_WEBHOOK_URL not set")?;
            let webhook = DiscordWebhook::new(webhook_url)?;
            let performance = NullPerformanceTracker;
            let formatter = market_surveillance_engine::notify::NotificationFormatter::new(&webhook, &performance);
            formatter.test_alert().await.map_err(|e| anyhow::anyhow!("test alert delivery failed: {e}"))?;
            info!("✅ test alert delivered");
            Ok(())
        }
        Command::Run => run(manager).await,
    }
}

async fn run(manager: Arc<ConfigManager>) -> Result<()> {
    info!("🚀 starting market surveillance engine");

    let gamma_url = env::var("GAMMA_API_URL").unwrap_or_else(|_| "https://gamma-api.polymarket.com".to_string());
    let clob_url = env::var("CLOB_API_URL").unwrap_or_else(|_| "https://clob.polymarket.com".to_string());

    let catalog: Arc<dyn MarketCatalogPort> = Arc::new(GammaMarketCatalog::new(gamma_url).context("building market catalog client")?);
    let store = Arc::new(LoggingPersistentStore);
    let performance = Arc::new(NullPerformanceTracker);

    let webhook: Arc<DiscordWebhook> = match env::var("DISCORD_WEBHOOK_URL") {
        Ok(url) => Arc::new(DiscordWebhook::new(url).context("building webhook client")?),
        Err(_) => {
            warn!("⚠️ DISCORD_WEBHOOK_URL not set; alerts will fail to deliver");
            Arc::new(DiscordWebhook::new("http://127.0.0.1:0/unset").context("building placeholder webhook client")?)
        }
    };

    let orchestrator = Arc::new(
        Orchestrator::new(manager.clone(), catalog.clone(), store, webhook, performance)
            .context("constructing orchestrator")?,
    );

    let health_port: u16 = env::var("HEALTH_PORT").ok().and_then(|s| s.parse().ok()).unwrap_or(8090);
    let health_state = HealthState {
        metrics: orchestrator.metrics(),
        prometheus: metrics_exporter_prometheus::PrometheusBuilder::new()
            .install_recorder()
            .context("installing prometheus recorder")?,
    };
    let listener = TcpListener::bind(("0.0.0.0", health_port)).await.context("binding health listener")?;
    let health_router = router(health_state);

    let health_task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, health_router).await {
            error!("⚠️ health server exited: {e}");
        }
    });

    let order_book_task = spawn_order_book_consumer(orchestrator.clone(), catalog, clob_url);

    let scan_task = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            orchestrator.start().await;
        })
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("🛑 received ctrl-c, shutting down");
        }
    }

    orchestrator.stop();
    let _ = scan_task.await;
    health_task.abort();
    order_book_task.abort();

    info!("✅ shutdown complete");
    Ok(())
}

/// Subscribes to the order-book stream for the markets with the highest
/// current volume and routes every frame through `consume_order_book`.
/// Re-subscribing to the full catalog on every scan tick is unnecessary;
/// the poller tolerates a stale market list between restarts.
fn spawn_order_book_consumer(
    orchestrator: Arc<Orchestrator>,
    catalog: Arc<dyn MarketCatalogPort>,
    clob_url: String,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let markets = match catalog.markets_with_min_volume(1_000.0, 100).await {
            Ok(m) => m,
            Err(e) => {
                warn!("⚠️ could not fetch initial markets for order-book consumer: {e}");
                return;
            }
        };
        let market_ids: Vec<String> = markets.iter().map(|m| m.market_id.clone()).collect();
        let by_id: std::collections::HashMap<String, _> = markets.into_iter().map(|m| (m.market_id.clone(), m)).collect();

        let poller = match ClobOrderBookPoller::new(clob_url, Duration::from_secs(5)) {
            Ok(p) => p,
            Err(e) => {
                warn!("⚠️ could not build order-book poller: {e}");
                return;
            }
        };

        let mut rx = match poller.subscribe(&market_ids).await {
            Ok(rx) => rx,
            Err(e) => {
                warn!("⚠️ order-book subscription failed: {e}");
                return;
            }
        };

        while let Some(book) = rx.recv().await {
            if let Some(market) = by_id.get(&book.market_id) {
                orchestrator.consume_order_book(book, market).await;
            }
        }
    })
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "market_surveillance_engine=info,tower_http=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    let _ = dotenv();
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    for candidate in [manifest_dir.join(".env"), manifest_dir.join("../.env")] {
        if candidate.exists() {
            let _ = dotenv::from_path(&candidate);
        }
    }
}
