//! Spot pricing through the aggregator, cached per mint.
//!
//! The position monitor wants a cheap, recent price; a reverse quote
//! for a fixed probe amount is close enough and goes through the same
//! routing the eventual exit would use.

use async_trait::async_trait;
use chrono::Utc;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;

use crate::domain::errors::SniperError;
use crate::domain::ports::{PriceProvider, PricePoint, SwapAggregator, TtlCache};

const PRICE_TTL_SECS: u64 = 60;
/// Token base units quoted to derive a unit price.
const PROBE_AMOUNT: u64 = 1_000_000;

pub struct AggregatorPriceProvider {
    aggregator: Arc<dyn SwapAggregator>,
    cache: Arc<dyn TtlCache>,
}

impl AggregatorPriceProvider {
    pub fn new(aggregator: Arc<dyn SwapAggregator>, cache: Arc<dyn TtlCache>) -> Self {
        Self { aggregator, cache }
    }

    fn cache_key(mint: &Pubkey) -> String {
        format!("price:{mint}")
    }
}

#[async_trait]
impl PriceProvider for AggregatorPriceProvider {
    async fn get_price(&self, mint: &Pubkey) -> Result<PricePoint, SniperError> {
        let key = Self::cache_key(mint);
        if let Ok(Some(cached)) = self.cache.get(&key).await {
            if let Ok(point) = serde_json::from_str::<(f64, i64)>(&cached) {
                return Ok(PricePoint {
                    price: point.0,
                    fetched_at: chrono::DateTime::from_timestamp(point.1, 0)
                        .unwrap_or_else(Utc::now),
                });
            }
        }

        let quote = self
            .aggregator
            .quote(mint, &spl_token::native_mint::id(), PROBE_AMOUNT, 100)
            .await?;
        let price = quote.expected_out as f64 / PROBE_AMOUNT as f64;
        if !price.is_finite() || price <= 0.0 {
            return Err(SniperError::Unknown(format!(
                "degenerate price {price} for {mint}"
            )));
        }

        let point = PricePoint {
            price,
            fetched_at: Utc::now(),
        };
        let serialized = serde_json::to_string(&(price, point.fetched_at.timestamp()))
            .unwrap_or_default();
        let _ = self.cache.set_ex(&key, &serialized, PRICE_TTL_SECS).await;
        Ok(point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::cache::InMemoryTtlCache;
    use crate::infrastructure::mock::MockAggregator;

    #[tokio::test]
    async fn test_price_is_quote_out_per_probe_unit() {
        let aggregator = Arc::new(MockAggregator::new());
        let mint = Pubkey::new_unique();
        // Probe of 1_000_000 returns 250_000 native units.
        aggregator.set_price_out(mint, 250_000).await;

        let provider =
            AggregatorPriceProvider::new(aggregator, Arc::new(InMemoryTtlCache::new()));
        let point = provider.get_price(&mint).await.unwrap();
        assert!((point.price - 0.25).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_cached_price_skips_aggregator() {
        let aggregator = Arc::new(MockAggregator::new());
        let mint = Pubkey::new_unique();
        aggregator.set_price_out(mint, 500_000).await;

        let provider = AggregatorPriceProvider::new(
            Arc::clone(&aggregator) as Arc<dyn SwapAggregator>,
            Arc::new(InMemoryTtlCache::new()),
        );
        provider.get_price(&mint).await.unwrap();
        provider.get_price(&mint).await.unwrap();
        assert_eq!(aggregator.quote_calls(), 1);
    }
}
