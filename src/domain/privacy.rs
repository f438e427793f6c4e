use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::domain::orders::PriorityFeeMode;

/// How the priority-fee mode is varied across trades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeePatternStrategy {
    Fixed,
    Random,
    GradualIncrease,
    SpikePattern,
    Adaptive,
}

/// How the signing wallet is chosen per trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WalletStrategy {
    RoundRobin,
    Random,
    FreshOnly,
    FreshThreshold(u32),
    PrimaryOnly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelaySettings {
    pub enabled: bool,
    pub base_ms: u64,
    /// Jitter as a fraction of `base_ms`, in [0, 1].
    pub jitter_pct: f64,
    pub min_ms: u64,
    pub max_ms: u64,
}

impl Default for DelaySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            base_ms: 2_000,
            jitter_pct: 0.5,
            min_ms: 250,
            max_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MevSettings {
    pub force_bundle: bool,
    pub randomize_tip: bool,
    pub min_tip_lamports: u64,
    pub max_tip_lamports: u64,
}

impl Default for MevSettings {
    fn default() -> Self {
        Self {
            force_bundle: false,
            randomize_tip: true,
            min_tip_lamports: 10_000,
            max_tip_lamports: 100_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObfuscationSettings {
    pub random_memo: bool,
    pub max_memo_len: usize,
    pub split_amounts: bool,
    pub dummy_instructions: bool,
}

impl Default for ObfuscationSettings {
    fn default() -> Self {
        Self {
            random_memo: false,
            max_memo_len: 16,
            split_amounts: false,
            dummy_instructions: false,
        }
    }
}

/// Per-user privacy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivacySettings {
    pub delay: DelaySettings,
    pub fee_strategy: FeePatternStrategy,
    /// Fee modes the fee strategy may choose from, ascending.
    pub allowed_fee_modes: Vec<PriorityFeeMode>,
    pub wallet_strategy: WalletStrategy,
    pub mev: MevSettings,
    pub obfuscation: ObfuscationSettings,
}

impl Default for PrivacySettings {
    fn default() -> Self {
        Self {
            delay: DelaySettings::default(),
            fee_strategy: FeePatternStrategy::Random,
            allowed_fee_modes: vec![
                PriorityFeeMode::Low,
                PriorityFeeMode::Medium,
                PriorityFeeMode::High,
            ],
            wallet_strategy: WalletStrategy::RoundRobin,
            mev: MevSettings::default(),
            obfuscation: ObfuscationSettings::default(),
        }
    }
}

/// Operational plan for one trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradePlan {
    pub delay_ms: u64,
    pub fee_mode: PriorityFeeMode,
    pub mev_tip_lamports: Option<u64>,
    pub memo: Option<String>,
    pub split_amounts: bool,
    pub dummy_instructions: bool,
    pub privacy_score: u8,
}

/// Jittered pre-trade delay, clamped to the configured window.
pub fn compute_delay<R: Rng + ?Sized>(settings: &DelaySettings, rng: &mut R) -> u64 {
    if !settings.enabled {
        return 0;
    }
    let max_jitter = settings.base_ms as f64 * settings.jitter_pct.clamp(0.0, 1.0);
    let jitter = if max_jitter > 0.0 {
        rng.random_range(-max_jitter..=max_jitter)
    } else {
        0.0
    };
    let raw = settings.base_ms as f64 + jitter;
    (raw.max(0.0) as u64).clamp(settings.min_ms, settings.max_ms)
}

/// Pick the fee mode for the `trade_count`-th trade under a strategy.
/// `Adaptive` is resolved by the caller against the live fee market and
/// falls back to the middle of the allowed set here.
pub fn pick_fee_mode<R: Rng + ?Sized>(
    strategy: FeePatternStrategy,
    allowed: &[PriorityFeeMode],
    trade_count: u64,
    rng: &mut R,
) -> PriorityFeeMode {
    if allowed.is_empty() {
        return PriorityFeeMode::Medium;
    }
    match strategy {
        FeePatternStrategy::Fixed => allowed[0],
        FeePatternStrategy::Random => allowed[rng.random_range(0..allowed.len())],
        FeePatternStrategy::GradualIncrease => allowed[(trade_count as usize) % allowed.len()],
        FeePatternStrategy::SpikePattern => {
            // Mostly quiet, occasionally loud.
            let pick = if rng.random_range(0..100) < 20 {
                allowed.iter().max()
            } else {
                allowed.iter().min()
            };
            pick.copied().unwrap_or(PriorityFeeMode::Medium)
        }
        FeePatternStrategy::Adaptive => allowed[allowed.len() / 2],
    }
}

/// Random hex memo of 1..=max_len bytes.
pub fn random_memo<R: Rng + ?Sized>(max_len: usize, rng: &mut R) -> String {
    let len = rng.random_range(1..=max_len.max(1));
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes[..]);
    hex::encode(bytes)
}

/// MEV tip per settings; `None` when bundles are not forced.
pub fn compute_mev_tip<R: Rng + ?Sized>(settings: &MevSettings, rng: &mut R) -> Option<u64> {
    if !settings.force_bundle {
        return None;
    }
    if settings.randomize_tip && settings.max_tip_lamports > settings.min_tip_lamports {
        Some(rng.random_range(settings.min_tip_lamports..=settings.max_tip_lamports))
    } else {
        Some(settings.min_tip_lamports)
    }
}

/// Informational 0-100 score for how much cover a plan provides.
pub fn privacy_score(settings: &PrivacySettings, plan_delay_ms: u64, mev_used: bool) -> u8 {
    let mut score = 0u32;

    if settings.delay.enabled {
        score += match plan_delay_ms {
            0..=499 => 5,
            500..=1_999 => 10,
            2_000..=4_999 => 15,
            _ => 20,
        };
        if settings.delay.jitter_pct > 0.0 {
            score += 10;
        }
    }

    score += match settings.fee_strategy {
        FeePatternStrategy::Fixed => 0,
        FeePatternStrategy::GradualIncrease => 5,
        FeePatternStrategy::SpikePattern => 10,
        FeePatternStrategy::Random => 15,
        FeePatternStrategy::Adaptive => 15,
    };

    score += match settings.wallet_strategy {
        WalletStrategy::PrimaryOnly => 0,
        WalletStrategy::RoundRobin => 10,
        WalletStrategy::Random => 15,
        WalletStrategy::FreshThreshold(_) => 20,
        WalletStrategy::FreshOnly => 25,
    };

    if mev_used {
        score += 15;
    }

    let patterns = [
        settings.obfuscation.random_memo,
        settings.obfuscation.split_amounts,
        settings.obfuscation.dummy_instructions,
    ]
    .iter()
    .filter(|p| **p)
    .count() as u32;
    score += patterns * 5;

    score.min(100) as u8
}
