//! Privacy engine: per-trade operational plans.
//!
//! Turns the user's privacy settings into one trade's delay, fee mode,
//! MEV tip and obfuscation payload. Failures here never abort a snipe;
//! the orchestrator treats planning as best-effort.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::application::fee_optimizer::FeeOptimizer;
use crate::domain::errors::SniperError;
use crate::domain::orders::PriorityFeeMode;
use crate::domain::privacy::{
    compute_delay, compute_mev_tip, pick_fee_mode, privacy_score, random_memo,
    FeePatternStrategy, PrivacySettings, TradePlan, WalletStrategy,
};

pub struct PrivacyEngine {
    fee_optimizer: Arc<FeeOptimizer>,
    defaults: PrivacySettings,
    per_user: RwLock<HashMap<String, PrivacySettings>>,
}

impl PrivacyEngine {
    pub fn new(fee_optimizer: Arc<FeeOptimizer>, defaults: PrivacySettings) -> Self {
        Self {
            fee_optimizer,
            defaults,
            per_user: RwLock::new(HashMap::new()),
        }
    }

    pub async fn set_user_settings(&self, user_id: &str, settings: PrivacySettings) {
        self.per_user
            .write()
            .await
            .insert(user_id.to_string(), settings);
    }

    pub async fn settings_for(&self, user_id: &str) -> PrivacySettings {
        self.per_user
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| self.defaults.clone())
    }

    pub async fn wallet_strategy_for(&self, user_id: &str) -> WalletStrategy {
        self.settings_for(user_id).await.wallet_strategy
    }

    /// Build the plan for the user's `trade_count`-th trade.
    pub async fn plan(&self, user_id: &str, trade_count: u64) -> Result<TradePlan, SniperError> {
        let settings = self.settings_for(user_id).await;

        let (delay_ms, mut fee_mode, mev_tip, memo) = {
            let mut rng = rand::rng();
            let delay_ms = compute_delay(&settings.delay, &mut rng);
            let fee_mode = pick_fee_mode(
                settings.fee_strategy,
                &settings.allowed_fee_modes,
                trade_count,
                &mut rng,
            );
            let mev_tip = compute_mev_tip(&settings.mev, &mut rng);
            let memo = if settings.obfuscation.random_memo {
                Some(random_memo(settings.obfuscation.max_memo_len, &mut rng))
            } else {
                None
            };
            (delay_ms, fee_mode, mev_tip, memo)
        };

        if settings.fee_strategy == FeePatternStrategy::Adaptive {
            fee_mode = self.adaptive_mode(&settings).await.unwrap_or(fee_mode);
        }

        let plan = TradePlan {
            delay_ms,
            fee_mode,
            mev_tip_lamports: mev_tip,
            memo,
            split_amounts: settings.obfuscation.split_amounts,
            dummy_instructions: settings.obfuscation.dummy_instructions,
            privacy_score: privacy_score(&settings, delay_ms, mev_tip.is_some()),
        };
        debug!(
            "privacy plan for {user_id}: delay={}ms fee={} score={}",
            plan.delay_ms, plan.fee_mode, plan.privacy_score
        );
        Ok(plan)
    }

    /// Bucket the live medium-mode CU price into a fee mode, then snap
    /// to the nearest allowed mode at or above it.
    async fn adaptive_mode(&self, settings: &PrivacySettings) -> Option<PriorityFeeMode> {
        let fee = self
            .fee_optimizer
            .optimize(PriorityFeeMode::Medium, None, None, None)
            .await
            .ok()?;
        let bucketed = match fee.compute_unit_price {
            0..=49_999 => PriorityFeeMode::Low,
            50_000..=199_999 => PriorityFeeMode::Medium,
            200_000..=499_999 => PriorityFeeMode::High,
            _ => PriorityFeeMode::Turbo,
        };
        let snapped = settings
            .allowed_fee_modes
            .iter()
            .copied()
            .filter(|m| *m >= bucketed)
            .min()
            .or_else(|| settings.allowed_fee_modes.iter().copied().max());
        snapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::fee_optimizer::FEE_CACHE_TTL_SECS;
    use crate::domain::privacy::DelaySettings;
    use crate::infrastructure::cache::InMemoryTtlCache;
    use crate::infrastructure::core::CircuitBreakerConfig;
    use crate::infrastructure::mock::MockChainClient;
    use crate::infrastructure::rpc::RpcFabric;

    async fn engine_with_market(fees: Vec<u64>) -> PrivacyEngine {
        let client = Arc::new(MockChainClient::new());
        client.put_fees(fees).await;
        let fabric = Arc::new(RpcFabric::new(client, CircuitBreakerConfig::default()));
        let optimizer = Arc::new(FeeOptimizer::new(
            fabric,
            Arc::new(InMemoryTtlCache::new()),
            FEE_CACHE_TTL_SECS,
        ));
        PrivacyEngine::new(optimizer, PrivacySettings::default())
    }

    #[tokio::test]
    async fn test_plan_respects_delay_bounds() {
        let engine = engine_with_market((1..=20).map(|i| i * 1_000).collect()).await;
        engine
            .set_user_settings(
                "u1",
                PrivacySettings {
                    delay: DelaySettings {
                        enabled: true,
                        base_ms: 1_000,
                        jitter_pct: 1.0,
                        min_ms: 400,
                        max_ms: 1_500,
                    },
                    ..PrivacySettings::default()
                },
            )
            .await;

        for n in 0..50 {
            let plan = engine.plan("u1", n).await.unwrap();
            assert!((400..=1_500).contains(&plan.delay_ms));
        }
    }

    #[tokio::test]
    async fn test_plan_fee_mode_is_allowed() {
        let engine = engine_with_market((1..=20).map(|i| i * 1_000).collect()).await;
        let settings = engine.settings_for("u1").await;
        for n in 0..50 {
            let plan = engine.plan("u1", n).await.unwrap();
            assert!(settings.allowed_fee_modes.contains(&plan.fee_mode));
        }
    }

    #[tokio::test]
    async fn test_adaptive_mode_tracks_quiet_market() {
        let engine = engine_with_market((1..=20).map(|i| i * 1_000).collect()).await;
        engine
            .set_user_settings(
                "u1",
                PrivacySettings {
                    fee_strategy: FeePatternStrategy::Adaptive,
                    ..PrivacySettings::default()
                },
            )
            .await;

        // A quiet market floors Medium at 50k, bucketing to Medium.
        let plan = engine.plan("u1", 0).await.unwrap();
        assert_eq!(plan.fee_mode, PriorityFeeMode::Medium);
    }

    #[tokio::test]
    async fn test_memo_present_only_when_enabled() {
        let engine = engine_with_market((1..=20).map(|i| i * 1_000).collect()).await;
        let plan = engine.plan("u1", 0).await.unwrap();
        assert!(plan.memo.is_none());

        let mut settings = PrivacySettings::default();
        settings.obfuscation.random_memo = true;
        engine.set_user_settings("u2", settings).await;
        let plan = engine.plan("u2", 0).await.unwrap();
        let memo = plan.memo.expect("memo");
        assert!(memo.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
