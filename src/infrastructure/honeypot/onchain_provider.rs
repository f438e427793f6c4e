//! On-chain honeypot provider.
//!
//! Computes a risk layer from primary chain state: mint and freeze
//! authority, supply and decimals, metadata existence and the holder
//! distribution, plus an optional sell probe through the aggregator.
//! Contributions are additive and capped at 100.

use async_trait::async_trait;
use serde_json::json;
use solana_sdk::pubkey::Pubkey;
use spl_token::solana_program::program_pack::Pack;
use spl_token::state::Mint;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::domain::errors::SniperError;
use crate::domain::honeypot::{score, HoneypotFlag, ProviderLayer};
use crate::domain::ports::{HoneypotProvider, SwapAggregator, TtlCache};
use crate::infrastructure::cache::keys;
use crate::infrastructure::core::{CircuitBreaker, CircuitBreakerConfig};
use crate::infrastructure::rpc::RpcFabric;

const CHECK_DEADLINE: Duration = Duration::from_secs(5);
const METADATA_TTL_SECS: u64 = 86_400;
const TOP_HOLDERS: usize = 10;
/// Token base units used for the sell probe quote.
const SELL_PROBE_AMOUNT: u64 = 1_000;

/// Metaplex token metadata program.
const METADATA_PROGRAM: Pubkey =
    solana_sdk::pubkey!("metaqbxxUerdq28cj1RbAWkYQm3ybzjb6a8bt518x1s");

pub struct OnChainProvider {
    fabric: Arc<RpcFabric>,
    cache: Arc<dyn TtlCache>,
    /// When present, a reverse quote is probed to catch sell blocks.
    aggregator: Option<Arc<dyn SwapAggregator>>,
    breaker: CircuitBreaker,
}

impl OnChainProvider {
    pub fn new(
        fabric: Arc<RpcFabric>,
        cache: Arc<dyn TtlCache>,
        aggregator: Option<Arc<dyn SwapAggregator>>,
    ) -> Self {
        Self {
            fabric,
            cache,
            aggregator,
            breaker: CircuitBreaker::new("honeypot.onchain", CircuitBreakerConfig::default()),
        }
    }

    fn metadata_address(mint: &Pubkey) -> Pubkey {
        Pubkey::find_program_address(
            &[b"metadata", METADATA_PROGRAM.as_ref(), mint.as_ref()],
            &METADATA_PROGRAM,
        )
        .0
    }

    /// Metadata existence, cached for a day under `metadata:{mint}`.
    async fn has_metadata(&self, mint: &Pubkey) -> bool {
        let key = keys::metadata(mint);
        if let Ok(Some(cached)) = self.cache.get(&key).await {
            return cached == "1";
        }
        let exists = self
            .fabric
            .get_account(&Self::metadata_address(mint))
            .await
            .is_ok();
        let _ = self
            .cache
            .set_ex(&key, if exists { "1" } else { "0" }, METADATA_TTL_SECS)
            .await;
        exists
    }

    async fn compute(&self, token_mint: &Pubkey) -> Result<ProviderLayer, SniperError> {
        let started = Instant::now();
        let mut layer_score = 0.0;
        let mut flags: HashSet<HoneypotFlag> = HashSet::new();

        let mint_account = self.fabric.get_account(token_mint).await?;
        let mint = Mint::unpack(&mint_account.data)
            .map_err(|e| SniperError::Validation(format!("not a token mint: {e}")))?;

        if mint.mint_authority.is_some() {
            layer_score += score::MINT_AUTHORITY;
            flags.insert(HoneypotFlag::MintAuthorityActive);
        }
        if mint.freeze_authority.is_some() {
            layer_score += score::FREEZE_AUTHORITY;
            flags.insert(HoneypotFlag::FreezeAuthorityActive);
        }

        if !self.has_metadata(token_mint).await {
            flags.insert(HoneypotFlag::MetadataMissing);
        }

        let holders = self
            .fabric
            .get_largest_holders(token_mint, TOP_HOLDERS)
            .await?;
        let supply = mint.supply.max(1);
        let top10_pct = holders
            .iter()
            .map(|h| h.amount as u128)
            .sum::<u128>() as f64
            * 100.0
            / supply as f64;
        let single_pct = holders
            .iter()
            .map(|h| h.amount as f64 * 100.0 / supply as f64)
            .fold(0.0, f64::max);

        if top10_pct > score::TOP10_LIMIT_PCT {
            layer_score += score::TOP10_CONCENTRATION;
            flags.insert(HoneypotFlag::ConcentratedTopHolders);
        }
        if single_pct > score::SINGLE_HOLDER_LIMIT_PCT {
            layer_score += score::SINGLE_WHALE;
            flags.insert(HoneypotFlag::SingleWhaleHolder);
        }

        // Sell probe: a token that cannot even be quoted back into the
        // native mint is a strong honeypot signal.
        let mut sell_probe_ok = None;
        if let Some(aggregator) = &self.aggregator {
            match aggregator
                .quote(
                    token_mint,
                    &spl_token::native_mint::id(),
                    SELL_PROBE_AMOUNT,
                    500,
                )
                .await
            {
                Ok(_) => sell_probe_ok = Some(true),
                Err(SniperError::NoRoute { .. }) => {
                    sell_probe_ok = Some(false);
                    layer_score += score::HIGH_SELL_TAX;
                    flags.insert(HoneypotFlag::SellSimulationFailed);
                }
                // Transient aggregator trouble is not evidence.
                Err(_) => {}
            }
        }

        Ok(ProviderLayer {
            score: layer_score.min(100.0),
            confidence: 90.0,
            flags,
            latency_ms: started.elapsed().as_millis() as u64,
            raw_data: json!({
                "supply": mint.supply,
                "decimals": mint.decimals,
                "mint_authority": mint.mint_authority.is_some(),
                "freeze_authority": mint.freeze_authority.is_some(),
                "top10_pct": top10_pct,
                "single_holder_pct": single_pct,
                "sell_probe_ok": sell_probe_ok,
            }),
        })
    }
}

#[async_trait]
impl HoneypotProvider for OnChainProvider {
    fn name(&self) -> &str {
        "onchain"
    }

    async fn check(&self, token_mint: &Pubkey) -> Result<ProviderLayer, SniperError> {
        self.breaker
            .call(async {
                tokio::time::timeout(CHECK_DEADLINE, self.compute(token_mint))
                    .await
                    .map_err(|_| SniperError::Timeout(CHECK_DEADLINE.as_millis() as u64))?
            })
            .await
    }
}
