use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use std::fmt;

/// DEX programs whose pool-creation instructions we decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dex {
    AmmV4,
    Clmm,
    PumpFun,
    Meteora,
    OrcaWhirlpool,
}

impl Dex {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dex::AmmV4 => "amm_v4",
            Dex::Clmm => "clmm",
            Dex::PumpFun => "pumpfun",
            Dex::Meteora => "meteora",
            Dex::OrcaWhirlpool => "orca_whirlpool",
        }
    }
}

impl fmt::Display for Dex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Time-decaying launch fee attached to activation-bearing pools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeScheduler {
    pub cliff_fee_bps: u16,
    pub number_of_periods: u32,
    pub period_secs: u64,
    pub reduction_factor: u32,
    pub launch_time: DateTime<Utc>,
}

/// Size-based launch fee.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimiter {
    /// Additional fee per whole SOL of input.
    pub base_fee_bps: u16,
}

/// Whitelisted early-buy window ahead of public activation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlphaVault {
    pub vault: Pubkey,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

/// Pool-level anti-sniper mechanisms decoded at detection time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AntiSniperConfig {
    pub fee_scheduler: Option<FeeScheduler>,
    pub rate_limiter: Option<RateLimiter>,
    pub alpha_vault: Option<AlphaVault>,
}

impl AntiSniperConfig {
    /// Fallback used when activation decoding fails: assume the worst
    /// launch fee and an active rate limiter, no alpha vault.
    pub fn conservative(now: DateTime<Utc>) -> Self {
        Self {
            fee_scheduler: Some(FeeScheduler {
                cliff_fee_bps: 9_900,
                number_of_periods: 10,
                period_secs: 30,
                reduction_factor: 1_000,
                launch_time: now,
            }),
            rate_limiter: Some(RateLimiter { base_fee_bps: 100 }),
            alpha_vault: None,
        }
    }
}

/// A newly created liquidity pool, decoded from a raw transaction.
///
/// Immutable once emitted. Consumed at most once downstream; the ingest
/// layer deduplicates by `(dex, pool_address)` within a short window.
#[derive(Debug, Clone)]
pub struct PoolCreated {
    pub signature: Signature,
    pub slot: u64,
    pub timestamp: DateTime<Utc>,
    pub dex: Dex,
    pub pool_address: Pubkey,
    pub base_mint: Pubkey,
    pub quote_mint: Pubkey,
    /// Base-unit liquidity seeded at creation, when the instruction carries it.
    pub initial_liquidity: u64,
    pub creator: Pubkey,
    pub anti_sniper: Option<AntiSniperConfig>,
}

impl PoolCreated {
    /// Dedup key shared by both ingest drivers.
    pub fn dedup_key(&self) -> (Dex, Pubkey) {
        (self.dex, self.pool_address)
    }
}

/// Lifecycle signals emitted by an ingest driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSignal {
    Connected,
    Disconnected { reason: String },
    Error { message: String },
}
