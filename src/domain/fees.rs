use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::errors::SniperError;
use crate::domain::orders::PriorityFeeMode;

/// Fixed compute budget requested for swap transactions.
pub const COMPUTE_UNIT_LIMIT: u32 = 200_000;

/// Minimum usable non-zero samples for a market snapshot.
pub const MIN_FEE_SAMPLES: usize = 10;

/// Snapshot of the recent prioritization-fee market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeMarketSample {
    /// Non-zero recent fees, ascending, in micro-base-units per CU.
    pub recent_fees: Vec<u64>,
    pub p50: u64,
    pub p75: u64,
    pub p90: u64,
    pub p95: u64,
    /// Congestion estimate in [0, 1].
    pub congestion: f64,
    pub fetched_at: DateTime<Utc>,
    pub sample_count: usize,
}

impl FeeMarketSample {
    /// Build a snapshot from raw recent fees. Zero entries are dropped;
    /// fewer than `MIN_FEE_SAMPLES` usable entries is an error.
    pub fn from_recent_fees(mut fees: Vec<u64>) -> Result<Self, SniperError> {
        fees.retain(|f| *f > 0);
        if fees.len() < MIN_FEE_SAMPLES {
            return Err(SniperError::InsufficientSamples {
                got: fees.len(),
                need: MIN_FEE_SAMPLES,
            });
        }
        fees.sort_unstable();

        let p50 = percentile(&fees, 50);
        let p75 = percentile(&fees, 75);
        let p90 = percentile(&fees, 90);
        let p95 = percentile(&fees, 95);
        let congestion = congestion_level(p75, p90);
        let sample_count = fees.len();

        Ok(Self {
            recent_fees: fees,
            p50,
            p75,
            p90,
            p95,
            congestion,
            fetched_at: Utc::now(),
            sample_count,
        })
    }

    pub fn is_fresh(&self, ttl_secs: i64) -> bool {
        (Utc::now() - self.fetched_at).num_seconds() < ttl_secs
    }
}

/// Nearest-rank percentile over an ascending slice.
fn percentile(sorted: &[u64], pct: u32) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = (pct as usize * sorted.len()).div_ceil(100);
    sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
}

/// Congestion heuristic from the p75/p90 micro-lamport levels.
fn congestion_level(p75: u64, p90: u64) -> f64 {
    if p90 >= 200_000 {
        1.0
    } else if p75 >= 100_000 {
        (0.5 + (p75 as f64 / 200_000.0).min(1.0) * 0.3).min(0.8)
    } else {
        (p75 as f64 / 100_000.0).min(1.0) * 0.5
    }
}

/// Floor compute-unit price per mode against the sampled market.
pub fn base_fee_for_mode(mode: PriorityFeeMode, sample: &FeeMarketSample) -> u64 {
    match mode {
        PriorityFeeMode::None => 0,
        PriorityFeeMode::Low => sample.p50.max(10_000),
        PriorityFeeMode::Medium => sample.p75.max(50_000),
        PriorityFeeMode::High => sample.p90.max(200_000),
        PriorityFeeMode::Turbo => sample.p95.max(500_000),
        PriorityFeeMode::Ultra => ((sample.p95 as f64 * 1.5) as u64).max(1_000_000),
    }
}

/// Congestion tier multiplier.
pub fn congestion_multiplier(congestion: f64) -> f64 {
    if congestion >= 0.8 {
        2.0
    } else if congestion >= 0.5 {
        1.5
    } else {
        1.0
    }
}

/// A chosen compute-unit price plus its derivation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizedFee {
    pub mode: PriorityFeeMode,
    /// Micro-base-units per compute unit.
    pub compute_unit_price: u64,
    pub compute_unit_limit: u32,
    /// Total priority fee in base units for the fixed CU limit.
    pub total_fee_lamports: u64,
    pub congestion: f64,
    pub was_capped: bool,
    pub was_boosted: bool,
}

/// Map a mode to a compute-unit price under the sampled market.
pub fn optimize(
    mode: PriorityFeeMode,
    sample: &FeeMarketSample,
    max_cap: Option<u64>,
    hype_boost: Option<f64>,
) -> OptimizedFee {
    let base = base_fee_for_mode(mode, sample);
    let mut fee = (base as f64 * congestion_multiplier(sample.congestion)) as u64;

    let mut was_boosted = false;
    if let Some(boost) = hype_boost {
        if boost > 1.0 && fee > 0 {
            fee = (fee as f64 * boost) as u64;
            was_boosted = true;
        }
    }

    let mut was_capped = false;
    if let Some(cap) = max_cap {
        if fee > cap {
            fee = cap;
            was_capped = true;
        }
    }

    OptimizedFee {
        mode,
        compute_unit_price: fee,
        compute_unit_limit: COMPUTE_UNIT_LIMIT,
        total_fee_lamports: fee * COMPUTE_UNIT_LIMIT as u64 / 1_000_000,
        congestion: sample.congestion,
        was_capped,
        was_boosted,
    }
}
