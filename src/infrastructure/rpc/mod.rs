//! RPC fabric: uniform chain access guarded per named operation.
//!
//! Every verb owns its circuit breaker so saturation in one (say,
//! submits against a congested leader) does not darken the others.
//! Retries wrap the breaker: a breaker rejection surfaces as
//! `CircuitOpen` and is never retried.

pub mod solana;

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use std::sync::Arc;

use crate::domain::errors::SniperError;
use crate::domain::ports::{
    AccountData, ChainClient, RawTransaction, TokenHolder, TokenSupply,
};
use crate::infrastructure::core::{
    retry_with_backoff, CircuitBreaker, CircuitBreakerConfig, RetryPolicy,
};

pub struct RpcFabric {
    client: Arc<dyn ChainClient>,
    account_breaker: CircuitBreaker,
    supply_breaker: CircuitBreaker,
    holders_breaker: CircuitBreaker,
    fees_breaker: CircuitBreaker,
    transaction_breaker: CircuitBreaker,
    submit_breaker: CircuitBreaker,
}

impl RpcFabric {
    pub fn new(client: Arc<dyn ChainClient>, breaker_config: CircuitBreakerConfig) -> Self {
        Self {
            client,
            account_breaker: CircuitBreaker::new("rpc.account", breaker_config),
            supply_breaker: CircuitBreaker::new("rpc.supply", breaker_config),
            holders_breaker: CircuitBreaker::new("rpc.largest_holders", breaker_config),
            fees_breaker: CircuitBreaker::new("rpc.prioritization_fees", breaker_config),
            transaction_breaker: CircuitBreaker::new("rpc.transaction", breaker_config),
            submit_breaker: CircuitBreaker::new("rpc.submit", breaker_config),
        }
    }

    pub async fn get_account(&self, address: &Pubkey) -> Result<AccountData, SniperError> {
        retry_with_backoff(RetryPolicy::reads(), "rpc.account", || {
            self.account_breaker.call(self.client.get_account(address))
        })
        .await
    }

    pub async fn get_token_supply(&self, mint: &Pubkey) -> Result<TokenSupply, SniperError> {
        retry_with_backoff(RetryPolicy::reads(), "rpc.supply", || {
            self.supply_breaker.call(self.client.get_token_supply(mint))
        })
        .await
    }

    pub async fn get_largest_holders(
        &self,
        mint: &Pubkey,
        limit: usize,
    ) -> Result<Vec<TokenHolder>, SniperError> {
        retry_with_backoff(RetryPolicy::reads(), "rpc.largest_holders", || {
            self.holders_breaker
                .call(self.client.get_largest_holders(mint, limit))
        })
        .await
    }

    pub async fn get_recent_prioritization_fees(
        &self,
        accounts: &[Pubkey],
    ) -> Result<Vec<u64>, SniperError> {
        retry_with_backoff(RetryPolicy::reads(), "rpc.prioritization_fees", || {
            self.fees_breaker
                .call(self.client.get_recent_prioritization_fees(accounts))
        })
        .await
    }

    pub async fn get_transaction(
        &self,
        signature: &Signature,
    ) -> Result<RawTransaction, SniperError> {
        retry_with_backoff(RetryPolicy::reads(), "rpc.transaction", || {
            self.transaction_breaker
                .call(self.client.get_transaction(signature))
        })
        .await
    }

    /// Submit a serialized signed transaction. Two attempts at most;
    /// a landed-but-unacknowledged swap must not be re-sent a third
    /// time.
    pub async fn submit(&self, tx_base64: &str) -> Result<Signature, SniperError> {
        retry_with_backoff(RetryPolicy::submits(), "rpc.submit", || {
            self.submit_breaker
                .call(self.client.send_transaction(tx_base64))
        })
        .await
    }
}
