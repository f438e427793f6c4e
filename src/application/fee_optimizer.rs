//! Priority-fee optimizer over a cached market sample.
//!
//! Samples the recent prioritization-fee market through the fabric,
//! keeps the snapshot for ten seconds per scope and maps user modes to
//! compute-unit prices via the pure rules in `domain::fees`.

use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use tracing::debug;

use crate::domain::errors::SniperError;
use crate::domain::fees::{optimize, FeeMarketSample, OptimizedFee};
use crate::domain::orders::PriorityFeeMode;
use crate::infrastructure::cache::keys;
use crate::domain::ports::TtlCache;
use crate::infrastructure::rpc::RpcFabric;

pub const FEE_CACHE_TTL_SECS: u64 = 10;

pub struct FeeOptimizer {
    fabric: Arc<RpcFabric>,
    cache: Arc<dyn TtlCache>,
    cache_ttl_secs: u64,
}

impl FeeOptimizer {
    pub fn new(fabric: Arc<RpcFabric>, cache: Arc<dyn TtlCache>, cache_ttl_secs: u64) -> Self {
        Self {
            fabric,
            cache,
            cache_ttl_secs,
        }
    }

    /// Current market snapshot for an optional account scope, cached.
    pub async fn market(&self, scope: Option<&Pubkey>) -> Result<FeeMarketSample, SniperError> {
        let key = keys::fee_market(scope);
        if let Ok(Some(cached)) = self.cache.get(&key).await {
            if let Ok(sample) = serde_json::from_str::<FeeMarketSample>(&cached) {
                return Ok(sample);
            }
        }

        let accounts: Vec<Pubkey> = scope.into_iter().copied().collect();
        let fees = self
            .fabric
            .get_recent_prioritization_fees(&accounts)
            .await?;
        let sample = FeeMarketSample::from_recent_fees(fees)?;
        debug!(
            "fee market refreshed: p50={} p75={} p90={} p95={} congestion={:.2}",
            sample.p50, sample.p75, sample.p90, sample.p95, sample.congestion
        );

        if let Ok(serialized) = serde_json::to_string(&sample) {
            let _ = self.cache.set_ex(&key, &serialized, self.cache_ttl_secs).await;
        }
        Ok(sample)
    }

    /// Compute-unit price for a mode under the current market.
    pub async fn optimize(
        &self,
        mode: PriorityFeeMode,
        scope: Option<&Pubkey>,
        max_cap: Option<u64>,
        hype_boost: Option<f64>,
    ) -> Result<OptimizedFee, SniperError> {
        let sample = self.market(scope).await?;
        Ok(optimize(mode, &sample, max_cap, hype_boost))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::cache::InMemoryTtlCache;
    use crate::infrastructure::core::CircuitBreakerConfig;
    use crate::infrastructure::mock::MockChainClient;

    async fn optimizer_with_fees(fees: Vec<u64>) -> (FeeOptimizer, Arc<MockChainClient>) {
        let client = Arc::new(MockChainClient::new());
        client.put_fees(fees).await;
        let fabric = Arc::new(RpcFabric::new(
            Arc::clone(&client) as Arc<dyn crate::domain::ports::ChainClient>,
            CircuitBreakerConfig::default(),
        ));
        (
            FeeOptimizer::new(fabric, Arc::new(InMemoryTtlCache::new()), FEE_CACHE_TTL_SECS),
            client,
        )
    }

    #[tokio::test]
    async fn test_insufficient_samples_error() {
        let (optimizer, _) = optimizer_with_fees(vec![1_000; 5]).await;
        let err = optimizer.market(None).await.unwrap_err();
        assert!(matches!(err, SniperError::InsufficientSamples { .. }));
    }

    #[tokio::test]
    async fn test_market_is_cached_per_scope() {
        let (optimizer, client) = optimizer_with_fees((1..=20).map(|i| i * 1_000).collect()).await;

        optimizer.market(None).await.unwrap();
        optimizer.market(None).await.unwrap();
        // One RPC hit despite two reads.
        assert_eq!(client.fee_calls(), 1);

        let scoped = Pubkey::new_unique();
        optimizer.market(Some(&scoped)).await.unwrap();
        optimizer.market(Some(&scoped)).await.unwrap();
        // The scoped sample misses the global entry once, then caches.
        assert_eq!(client.fee_calls(), 2);
    }

    #[tokio::test]
    async fn test_optimize_is_monotone_under_live_market() {
        let (optimizer, _) = optimizer_with_fees((1..=30).map(|i| i * 5_000).collect()).await;
        let mut previous = 0;
        for mode in PriorityFeeMode::ALL {
            let fee = optimizer.optimize(mode, None, None, None).await.unwrap();
            assert!(fee.compute_unit_price >= previous);
            previous = fee.compute_unit_price;
        }
    }
}
