//! Sniper engine daemon.
//!
//! Startup wires the graph leaves-first: cache and store, chain client
//! and fabric, leaf services, engine and executor, monitors, then the
//! orchestrator consuming the ingest stream. Shutdown runs in reverse.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use poolsniper::application::exit_executor::ExitExecutor;
use poolsniper::application::fee_optimizer::FeeOptimizer;
use poolsniper::application::filter_validator::FilterValidator;
use poolsniper::application::honeypot_evaluator::{
    FallbackMode, HoneypotEvaluator, HoneypotEvaluatorConfig,
};
use poolsniper::application::order_engine::OrderEngine;
use poolsniper::application::orchestrator::Orchestrator;
use poolsniper::application::position_monitor::PositionMonitor;
use poolsniper::application::privacy_engine::PrivacyEngine;
use poolsniper::application::rug_monitor::RugMonitor;
use poolsniper::config::{Config, PoolSourceKind};
use poolsniper::domain::ports::{
    ChainClient, HoneypotProvider, KeyVault, MevSubmitter, PoolSource, PriceProvider,
    SwapAggregator, TtlCache,
};
use poolsniper::domain::privacy::PrivacySettings;
use poolsniper::domain::repositories::{OrderRepository, PositionRepository};
use poolsniper::infrastructure::aggregator::HttpAggregatorClient;
use poolsniper::infrastructure::cache::{InMemoryTtlCache, RedisTtlCache};
use poolsniper::infrastructure::honeypot::{HttpReputationProvider, OnChainProvider};
use poolsniper::infrastructure::ingest::log_subscription::LogSubscriptionSource;
use poolsniper::infrastructure::ingest::push_stream::PushStreamSource;
use poolsniper::infrastructure::ingest::IngestService;
use poolsniper::infrastructure::lock_registry::LockRegistry;
use poolsniper::infrastructure::mev::HttpBundleClient;
use poolsniper::infrastructure::persistence::{
    Database, SqliteOrderRepository, SqlitePositionRepository,
};
use poolsniper::infrastructure::pricing::AggregatorPriceProvider;
use poolsniper::infrastructure::rpc::solana::SolanaChainClient;
use poolsniper::infrastructure::rpc::RpcFabric;
use poolsniper::infrastructure::wallets::{SessionKeyVault, WalletRegistry};

#[derive(Parser, Debug)]
#[command(name = "poolsniper", about = "Automated on-chain pool sniper")]
struct Args {
    /// Path to an env file loaded before configuration.
    #[arg(long, default_value = ".env")]
    env_file: String,

    /// Override POOL_SOURCE (push or log).
    #[arg(long)]
    source: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _ = dotenvy::from_filename(&args.env_file);
    if let Some(source) = &args.source {
        std::env::set_var("POOL_SOURCE", source);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;
    info!("poolsniper starting (source: {:?})", config.ingest.pool_source);

    // Leaves first: cache, store, chain access.
    let cache: Arc<dyn TtlCache> = match &config.redis_url {
        Some(url) => {
            info!("using redis cache at {url}");
            Arc::new(RedisTtlCache::new(url)?)
        }
        None => {
            info!("using in-process cache");
            Arc::new(InMemoryTtlCache::new())
        }
    };
    let database = Database::new(&config.database_url).await?;
    let orders: Arc<dyn OrderRepository> =
        Arc::new(SqliteOrderRepository::new(database.clone()));
    let positions: Arc<dyn PositionRepository> =
        Arc::new(SqlitePositionRepository::new(database.clone()));

    let chain: Arc<dyn ChainClient> = Arc::new(SolanaChainClient::new(
        config.rpc_url.clone(),
        Duration::from_secs(10),
    ));
    let fabric = Arc::new(RpcFabric::new(chain, config.breakers.as_breaker_config()));

    // Leaf services.
    let aggregator: Arc<dyn SwapAggregator> =
        Arc::new(HttpAggregatorClient::new(config.aggregator_url.clone()));
    let mev: Arc<dyn MevSubmitter> = Arc::new(HttpBundleClient::new(config.mev_relay_url.clone()));
    let lock_registry = Arc::new(LockRegistry::new(Arc::clone(&fabric), Arc::clone(&cache)));
    let prices: Arc<dyn PriceProvider> = Arc::new(AggregatorPriceProvider::new(
        Arc::clone(&aggregator),
        Arc::clone(&cache),
    ));

    let mut providers: Vec<Arc<dyn HoneypotProvider>> = Vec::new();
    if !config.honeypot_api_url.is_empty() {
        providers.push(Arc::new(HttpReputationProvider::new(
            config.honeypot_api_url.clone(),
            config.honeypot_api_key.clone(),
        )));
    }
    providers.push(Arc::new(OnChainProvider::new(
        Arc::clone(&fabric),
        Arc::clone(&cache),
        Some(Arc::clone(&aggregator)),
    )));
    let evaluator = Arc::new(HoneypotEvaluator::new(
        providers,
        Arc::clone(&cache),
        HoneypotEvaluatorConfig {
            mode: FallbackMode::StopOnFirstSuccess,
            cache_ttl_secs: config.honeypot_cache_ttl_secs,
            ..Default::default()
        },
    ));
    let filter_validator = Arc::new(FilterValidator::new(Arc::clone(&lock_registry)));
    let fee_optimizer = Arc::new(FeeOptimizer::new(
        Arc::clone(&fabric),
        Arc::clone(&cache),
        config.fee_cache_ttl_secs,
    ));

    // Wallets and keys.
    let wallets = Arc::new(WalletRegistry::new(config.max_wallets_per_user));
    let session_vault = Arc::new(SessionKeyVault::new());
    let loaded = session_vault.load_base58(&config.wallet_keys).await?;
    for wallet in &loaded {
        wallets.register(&config.default_user, *wallet).await?;
    }
    info!("loaded {} wallet(s) for {}", loaded.len(), config.default_user);
    let vault: Arc<dyn KeyVault> = session_vault;

    // Engine, executor, monitors.
    let engine = Arc::new(OrderEngine::new(
        Arc::clone(&orders),
        Arc::clone(&positions),
        Arc::clone(&cache),
        Arc::clone(&evaluator),
        Arc::clone(&filter_validator),
        Arc::clone(&fee_optimizer),
        Arc::clone(&aggregator),
        Arc::clone(&fabric),
        Arc::clone(&mev),
        config.order_cache_ttl_secs,
    ));
    let exit_executor = Arc::new(ExitExecutor::new(
        Arc::clone(&positions),
        Arc::clone(&fee_optimizer),
        Arc::clone(&aggregator),
        Arc::clone(&fabric),
        Arc::clone(&mev),
        Arc::clone(&vault),
    ));
    let position_monitor = Arc::new(PositionMonitor::new(
        Arc::clone(&positions),
        Arc::clone(&prices),
        Arc::clone(&exit_executor),
        config.monitors.position.clone(),
    ));
    let rug_monitor = Arc::new(RugMonitor::new(
        Arc::clone(&positions),
        Arc::clone(&fabric),
        Arc::clone(&exit_executor),
        config.monitors.rug.clone(),
    ));
    Arc::clone(&position_monitor).start().await;
    Arc::clone(&rug_monitor).start().await;

    let privacy = Arc::new(PrivacyEngine::new(
        Arc::clone(&fee_optimizer),
        PrivacySettings::default(),
    ));

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&wallets),
        Arc::clone(&vault),
        privacy,
        Arc::clone(&orders),
        Arc::clone(&positions),
        engine,
        Arc::clone(&position_monitor),
        Arc::clone(&rug_monitor),
        config.auto_snipe.clone(),
    ));

    // Ingest last: events start flowing once everything downstream is
    // ready to take them.
    let source: Arc<dyn PoolSource> = match config.ingest.pool_source {
        PoolSourceKind::Push => Arc::new(PushStreamSource::new(
            config.ingest.push_endpoint.clone(),
            config.ingest.push_token.clone(),
            config.ingest.programs.clone(),
        )),
        PoolSourceKind::Log => Arc::new(LogSubscriptionSource::new(
            config.rpc_ws_url.clone(),
            config.ingest.programs.clone(),
            Arc::clone(&fabric),
        )),
    };
    let ingest = Arc::new(IngestService::new(source, Arc::clone(&fabric)));
    let (event_tx, mut event_rx) = mpsc::channel(1_024);
    ingest.start(event_tx).await?;

    let event_orchestrator = Arc::clone(&orchestrator);
    let event_loop = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            info!(
                "pool detected: {} {} (base {}, liquidity {})",
                event.dex, event.pool_address, event.base_mint, event.initial_liquidity
            );
            event_orchestrator.handle_pool_event(&event).await;
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("shutdown requested");

    // Reverse order: stop taking events, then the monitors.
    ingest.stop().await;
    event_loop.abort();
    position_monitor.stop().await;
    rug_monitor.stop().await;
    // In-flight per-position checks are idempotent and finish on
    // their own; give them a moment before the process exits.
    tokio::time::sleep(Duration::from_millis(200)).await;
    info!("poolsniper stopped");
    Ok(())
}
