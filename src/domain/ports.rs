use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature};
use tokio::sync::mpsc;

use crate::domain::errors::SniperError;
use crate::domain::events::{PoolCreated, SourceSignal};
use crate::domain::honeypot::ProviderLayer;

/// Raw account contents, as read through the fabric.
#[derive(Debug, Clone)]
pub struct AccountData {
    pub lamports: u64,
    pub owner: Pubkey,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
pub struct TokenSupply {
    pub amount: u64,
    pub decimals: u8,
}

#[derive(Debug, Clone)]
pub struct TokenHolder {
    pub address: Pubkey,
    pub amount: u64,
}

/// One decoded instruction of a fetched transaction.
#[derive(Debug, Clone)]
pub struct RawInstruction {
    pub program_id_index: u8,
    pub accounts: Vec<u8>,
    pub data: Vec<u8>,
}

/// A transaction reduced to what the pool decoder needs.
#[derive(Debug, Clone)]
pub struct RawTransaction {
    pub signature: Signature,
    pub slot: u64,
    pub account_keys: Vec<Pubkey>,
    pub instructions: Vec<RawInstruction>,
}

/// Chain read/write capability consumed by the RPC fabric.
///
/// Implementations are thin adapters over an RPC client; the fabric
/// adds breakers and retries on top.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn get_account(&self, address: &Pubkey) -> Result<AccountData, SniperError>;
    async fn get_token_supply(&self, mint: &Pubkey) -> Result<TokenSupply, SniperError>;
    async fn get_largest_holders(
        &self,
        mint: &Pubkey,
        limit: usize,
    ) -> Result<Vec<TokenHolder>, SniperError>;
    async fn get_recent_prioritization_fees(
        &self,
        accounts: &[Pubkey],
    ) -> Result<Vec<u64>, SniperError>;
    async fn get_transaction(&self, signature: &Signature) -> Result<RawTransaction, SniperError>;
    async fn send_transaction(&self, tx_base64: &str) -> Result<Signature, SniperError>;
}

/// Aggregator quote for a prospective swap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub quote_id: String,
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,
    pub amount_in: u64,
    pub expected_out: u64,
    pub price_impact_pct: f64,
    /// Opaque aggregator payload echoed back on swap.
    pub raw: serde_json::Value,
}

/// Signed swap transaction returned by the aggregator, ready to submit.
#[derive(Debug, Clone)]
pub struct SwapTransaction {
    pub tx_base64: String,
    pub last_valid_block_height: u64,
}

/// Parameters for building a swap from a quote.
#[derive(Debug, Clone)]
pub struct SwapParams {
    pub user: Pubkey,
    pub compute_unit_price: u64,
    pub mev_tip_lamports: Option<u64>,
    pub memo: Option<String>,
}

/// Swap aggregator: quotes and signed-transaction building.
#[async_trait]
pub trait SwapAggregator: Send + Sync {
    async fn quote(
        &self,
        input_mint: &Pubkey,
        output_mint: &Pubkey,
        amount_in: u64,
        slippage_bps: u16,
    ) -> Result<Quote, SniperError>;

    async fn swap(
        &self,
        quote: &Quote,
        params: &SwapParams,
    ) -> Result<SwapTransaction, SniperError>;
}

/// Private transaction channel that bypasses the public mempool.
#[async_trait]
pub trait MevSubmitter: Send + Sync {
    async fn submit_bundle(
        &self,
        tx_base64: &str,
        tip_lamports: u64,
    ) -> Result<Signature, SniperError>;
}

/// Process-wide key-value cache with per-key TTL, SETEX semantics.
#[async_trait]
pub trait TtlCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, SniperError>;
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), SniperError>;
    async fn delete(&self, key: &str) -> Result<(), SniperError>;
}

/// Session-scoped access to decrypted keypairs. Key material at rest is
/// someone else's problem; this hands out already-unlocked keys.
#[async_trait]
pub trait KeyVault: Send + Sync {
    async fn unlock(&self, wallet: &Pubkey) -> Result<Keypair, SniperError>;
}

/// One provider in the honeypot fallback chain.
#[async_trait]
pub trait HoneypotProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn check(&self, token_mint: &Pubkey) -> Result<ProviderLayer, SniperError>;
}

/// A pool-event driver. `start` spawns the driver's task; events and
/// lifecycle signals flow through the channels until `stop`.
#[async_trait]
pub trait PoolSource: Send + Sync {
    fn name(&self) -> &str;
    async fn start(
        &self,
        events: mpsc::Sender<PoolCreated>,
        signals: mpsc::Sender<SourceSignal>,
    ) -> Result<(), SniperError>;
    async fn stop(&self);
}

/// Spot price lookup for position monitoring, in quote base units per
/// token base unit.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    async fn get_price(&self, mint: &Pubkey) -> Result<PricePoint, SniperError>;
}

#[derive(Debug, Clone, Copy)]
pub struct PricePoint {
    pub price: f64,
    pub fetched_at: DateTime<Utc>,
}
