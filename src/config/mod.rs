//! Configuration for the sniper engine.
//!
//! Everything is environment-driven, organized by concern: chain and
//! service endpoints, ingest driver, monitors, breakers, privacy and
//! the optional auto-snipe policy.

mod ingest_config;
mod monitor_config;

pub use ingest_config::{IngestEnvConfig, PoolSourceKind};
pub use monitor_config::{BreakerEnvConfig, MonitorEnvConfig};

use anyhow::{Context, Result};
use std::env;

use crate::application::orchestrator::AutoSnipeSettings;
use crate::domain::filters::FilterPreset;

#[derive(Debug, Clone)]
pub struct Config {
    // Endpoints
    pub rpc_url: String,
    pub rpc_ws_url: String,
    pub aggregator_url: String,
    pub mev_relay_url: String,
    pub honeypot_api_url: String,
    pub honeypot_api_key: String,
    pub redis_url: Option<String>,
    pub database_url: String,

    // Cache TTLs (seconds)
    pub order_cache_ttl_secs: u64,
    pub fee_cache_ttl_secs: u64,
    pub honeypot_cache_ttl_secs: u64,

    // Wallets
    pub max_wallets_per_user: usize,
    pub wallet_keys: Vec<String>,
    pub default_user: String,

    pub ingest: IngestEnvConfig,
    pub monitors: MonitorEnvConfig,
    pub breakers: BreakerEnvConfig,
    pub auto_snipe: Option<AutoSnipeSettings>,
}

fn parse_env<T: std::str::FromStr>(name: &str, default: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<T>()
        .map_err(|e| anyhow::anyhow!("Failed to parse {name}={raw}: {e}"))
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let rpc_url = env::var("RPC_URL")
            .unwrap_or_else(|_| "https://api.mainnet-beta.solana.com".to_string());
        let rpc_ws_url = env::var("RPC_WS_URL").unwrap_or_else(|_| {
            rpc_url
                .replacen("https://", "wss://", 1)
                .replacen("http://", "ws://", 1)
        });
        let aggregator_url = env::var("AGGREGATOR_URL")
            .unwrap_or_else(|_| "https://quote-api.jup.ag/v6".to_string());
        let mev_relay_url = env::var("MEV_RELAY_URL").unwrap_or_else(|_| {
            "https://mainnet.block-engine.jito.wtf/api/v1/bundles".to_string()
        });
        let honeypot_api_url = env::var("HONEYPOT_API_URL").unwrap_or_default();
        let honeypot_api_key = env::var("HONEYPOT_API_KEY").unwrap_or_default();
        let redis_url = env::var("REDIS_URL").ok();
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://data/sniper.db".to_string());

        let wallet_keys: Vec<String> = env::var("WALLET_KEYS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let auto_snipe = if parse_env::<bool>("AUTO_SNIPE", "false")? {
            let preset = match env::var("AUTO_SNIPE_PRESET")
                .unwrap_or_else(|_| "CONSERVATIVE".to_string())
                .to_uppercase()
                .as_str()
            {
                "CONSERVATIVE" => FilterPreset::Conservative,
                "BALANCED" => FilterPreset::Balanced,
                "AGGRESSIVE" => FilterPreset::Aggressive,
                other => anyhow::bail!("Invalid AUTO_SNIPE_PRESET: {other}"),
            };
            Some(AutoSnipeSettings {
                user_id: env::var("AUTO_SNIPE_USER").unwrap_or_else(|_| "default".to_string()),
                amount_in: parse_env("AUTO_SNIPE_AMOUNT", "100000000")?, // 0.1 SOL
                preset,
                take_profit_pct: env::var("AUTO_SNIPE_TP_PCT")
                    .ok()
                    .map(|v| v.parse().context("Failed to parse AUTO_SNIPE_TP_PCT"))
                    .transpose()?,
                stop_loss_pct: env::var("AUTO_SNIPE_SL_PCT")
                    .ok()
                    .map(|v| v.parse().context("Failed to parse AUTO_SNIPE_SL_PCT"))
                    .transpose()?,
                min_initial_liquidity: parse_env("AUTO_SNIPE_MIN_LIQUIDITY", "1000000000")?,
            })
        } else {
            None
        };

        Ok(Self {
            rpc_url,
            rpc_ws_url,
            aggregator_url,
            mev_relay_url,
            honeypot_api_url,
            honeypot_api_key,
            redis_url,
            database_url,
            order_cache_ttl_secs: parse_env("ORDER_CACHE_TTL_SECONDS", "30")?,
            fee_cache_ttl_secs: parse_env("FEE_CACHE_TTL_SECONDS", "10")?,
            honeypot_cache_ttl_secs: parse_env("HONEYPOT_CACHE_TTL_SECONDS", "3600")?,
            max_wallets_per_user: parse_env("MAX_WALLETS_PER_USER", "10")?,
            wallet_keys,
            default_user: env::var("DEFAULT_USER").unwrap_or_else(|_| "default".to_string()),
            ingest: IngestEnvConfig::from_env()?,
            monitors: MonitorEnvConfig::from_env()?,
            breakers: BreakerEnvConfig::from_env()?,
            auto_snipe,
        })
    }
}
