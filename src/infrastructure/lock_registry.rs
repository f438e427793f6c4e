//! Liquidity-lock registry.
//!
//! Resolves how much of an LP mint sits with known lock programs or
//! registered burn addresses. The enumeration of lock providers is
//! incomplete by nature, so an unrecognized custodian reads as
//! `Unknown`, never as unlocked.

use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use tracing::debug;

use crate::domain::errors::SniperError;
use crate::domain::filters::LockStatus;
use crate::domain::ports::TtlCache;
use crate::infrastructure::cache::keys;
use crate::infrastructure::rpc::RpcFabric;

const LOCK_CACHE_TTL_SECS: u64 = 300;

/// Share of LP supply that must be examined before a verdict other
/// than `Unknown` is offered.
const COVERAGE_FLOOR_PCT: f64 = 90.0;

pub struct LockRegistry {
    fabric: Arc<RpcFabric>,
    cache: Arc<dyn TtlCache>,
    lock_programs: Vec<Pubkey>,
    burn_addresses: Vec<Pubkey>,
}

impl LockRegistry {
    /// Register an additional lock program at startup.
    pub fn add_lock_program(&mut self, program: Pubkey) {
        if !self.lock_programs.contains(&program) {
            self.lock_programs.push(program);
        }
    }

    pub fn new(fabric: Arc<RpcFabric>, cache: Arc<dyn TtlCache>) -> Self {
        Self {
            fabric,
            cache,
            // TODO: add the GUACamole and Team Finance lockers once
            // their program ids are confirmed on mainnet.
            lock_programs: vec![solana_sdk::pubkey!(
                "strmRqUCoQUgGUan5YhzUZa6KqdzwX5L6FpUxfmKg5m"
            )],
            burn_addresses: vec![
                solana_sdk::pubkey!("1nc1nerator11111111111111111111111111111111"),
                Pubkey::default(),
            ],
        }
    }

    /// Percentage of the LP supply held by recognized lockers and burn
    /// addresses. Cached under `lock:{lp_mint}`.
    pub async fn lock_status(&self, lp_mint: &Pubkey) -> Result<LockStatus, SniperError> {
        let key = keys::lock(lp_mint);
        if let Ok(Some(cached)) = self.cache.get(&key).await {
            if let Ok(status) = serde_json::from_str::<LockStatus>(&cached) {
                return Ok(status);
            }
        }

        let status = self.compute(lp_mint).await?;
        if let Ok(serialized) = serde_json::to_string(&status) {
            let _ = self.cache.set_ex(&key, &serialized, LOCK_CACHE_TTL_SECS).await;
        }
        Ok(status)
    }

    async fn compute(&self, lp_mint: &Pubkey) -> Result<LockStatus, SniperError> {
        let supply = self.fabric.get_token_supply(lp_mint).await?;
        if supply.amount == 0 {
            return Ok(LockStatus::Unknown);
        }

        let holders = self.fabric.get_largest_holders(lp_mint, 20).await?;
        let mut locked: u128 = 0;
        let mut examined: u128 = 0;
        let mut unrecognized = false;

        for holder in &holders {
            examined += holder.amount as u128;
            // A token account's custodian is its owner program; the
            // holder addresses returned here are the token accounts,
            // whose owning program we resolve per account.
            match self.fabric.get_account(&holder.address).await {
                Ok(account) => {
                    let owner_is_lock = self.lock_programs.contains(&account.owner);
                    let address_is_burn = self.burn_addresses.contains(&holder.address);
                    if owner_is_lock || address_is_burn {
                        locked += holder.amount as u128;
                    }
                }
                Err(_) => {
                    debug!("lock registry: holder {} unreadable", holder.address);
                    unrecognized = true;
                }
            }
        }

        let coverage_pct = examined as f64 * 100.0 / supply.amount as f64;
        if coverage_pct < COVERAGE_FLOOR_PCT || (unrecognized && locked == 0) {
            return Ok(LockStatus::Unknown);
        }

        let pct = locked as f64 * 100.0 / supply.amount as f64;
        if pct == 0.0 {
            Ok(LockStatus::Unlocked)
        } else {
            Ok(LockStatus::Locked { pct })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::cache::InMemoryTtlCache;
    use crate::infrastructure::core::CircuitBreakerConfig;
    use crate::infrastructure::mock::MockChainClient;

    async fn registry_with(client: Arc<MockChainClient>) -> LockRegistry {
        let fabric = Arc::new(RpcFabric::new(client, CircuitBreakerConfig::default()));
        LockRegistry::new(fabric, Arc::new(InMemoryTtlCache::new()))
    }

    #[tokio::test]
    async fn test_burned_supply_reads_locked() {
        let client = Arc::new(MockChainClient::new());
        let lp_mint = Pubkey::new_unique();
        let burn = solana_sdk::pubkey!("1nc1nerator11111111111111111111111111111111");
        client.put_supply(lp_mint, 1_000, 9).await;
        client.put_holders_at(lp_mint, vec![(burn, 950)]).await;
        client.put_account(burn, vec![]).await;

        let registry = registry_with(client).await;
        let status = registry.lock_status(&lp_mint).await.unwrap();
        match status {
            LockStatus::Locked { pct } => assert!((pct - 95.0).abs() < 1e-9),
            other => panic!("expected locked, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_plain_wallet_holding_reads_unlocked() {
        let client = Arc::new(MockChainClient::new());
        let lp_mint = Pubkey::new_unique();
        let whale = Pubkey::new_unique();
        client.put_supply(lp_mint, 1_000, 9).await;
        client.put_holders_at(lp_mint, vec![(whale, 990)]).await;
        client.put_account(whale, vec![]).await;

        let registry = registry_with(client).await;
        assert_eq!(
            registry.lock_status(&lp_mint).await.unwrap(),
            LockStatus::Unlocked
        );
    }

    #[tokio::test]
    async fn test_thin_coverage_reads_unknown() {
        let client = Arc::new(MockChainClient::new());
        let lp_mint = Pubkey::new_unique();
        let holder = Pubkey::new_unique();
        client.put_supply(lp_mint, 10_000, 9).await;
        // Largest visible holders cover only 5% of supply.
        client.put_holders_at(lp_mint, vec![(holder, 500)]).await;
        client.put_account(holder, vec![]).await;

        let registry = registry_with(client).await;
        assert_eq!(
            registry.lock_status(&lp_mint).await.unwrap(),
            LockStatus::Unknown
        );
    }
}
