use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::collections::{HashMap, HashSet};

/// Default score at or above which a token is considered a honeypot.
pub const DEFAULT_HIGH_RISK_THRESHOLD: f64 = 70.0;

/// Discrete findings contributed by providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoneypotFlag {
    MintAuthorityActive,
    FreezeAuthorityActive,
    OwnershipReclaimable,
    HighSellTax,
    ConcentratedTopHolders,
    SingleWhaleHolder,
    MetadataMissing,
    SellSimulationFailed,
    ExplicitHoneypot,
}

/// One provider's contribution to a result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderLayer {
    pub score: f64,
    pub confidence: f64,
    pub flags: HashSet<HoneypotFlag>,
    pub latency_ms: u64,
    pub raw_data: serde_json::Value,
}

/// Combined risk assessment for one token mint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoneypotResult {
    pub token_mint: Pubkey,
    pub risk_score: f64,
    pub confidence: f64,
    pub is_honeypot: bool,
    pub flags: HashSet<HoneypotFlag>,
    pub layers: HashMap<String, ProviderLayer>,
    pub checked_at: DateTime<Utc>,
}

impl HoneypotResult {
    /// Combine provider layers: maximum score, union of flags, mean
    /// confidence (zero when no layer contributed).
    pub fn from_layers(
        token_mint: Pubkey,
        layers: HashMap<String, ProviderLayer>,
        high_threshold: f64,
    ) -> Self {
        let risk_score = layers
            .values()
            .map(|l| l.score)
            .fold(0.0_f64, f64::max)
            .clamp(0.0, 100.0);
        let confidence = if layers.is_empty() {
            0.0
        } else {
            layers.values().map(|l| l.confidence).sum::<f64>() / layers.len() as f64
        };
        let flags: HashSet<HoneypotFlag> = layers
            .values()
            .flat_map(|l| l.flags.iter().copied())
            .collect();

        Self {
            token_mint,
            risk_score,
            confidence,
            is_honeypot: risk_score >= high_threshold,
            flags,
            layers,
            checked_at: Utc::now(),
        }
    }

    pub fn has_flag(&self, flag: HoneypotFlag) -> bool {
        self.flags.contains(&flag)
    }
}

/// Additive score contributions used by providers. Capped at 100 by the
/// provider before it reports a layer.
pub mod score {
    pub const MINT_AUTHORITY: f64 = 30.0;
    pub const FREEZE_AUTHORITY: f64 = 30.0;
    pub const OWNERSHIP_RECLAIMABLE: f64 = 40.0;
    pub const HIGH_SELL_TAX: f64 = 50.0;
    pub const TOP10_CONCENTRATION: f64 = 20.0;
    pub const SINGLE_WHALE: f64 = 25.0;
    pub const EXPLICIT_HONEYPOT: f64 = 100.0;

    pub const SELL_TAX_LIMIT_PCT: f64 = 50.0;
    pub const TOP10_LIMIT_PCT: f64 = 80.0;
    pub const SINGLE_HOLDER_LIMIT_PCT: f64 = 50.0;
}
