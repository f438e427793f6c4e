//! Deterministic fakes for tests and dry runs.
//!
//! Every mock is programmable per call-site and counts its calls, so
//! tests can assert on retry behavior and breaker interaction without
//! touching the network.

use async_trait::async_trait;
use chrono::Utc;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use tokio::sync::{mpsc, Mutex, RwLock};
use uuid::Uuid;

use crate::domain::errors::SniperError;
use crate::domain::events::{PoolCreated, SourceSignal};
use crate::domain::honeypot::ProviderLayer;
use crate::domain::orders::{Order, OrderState};
use crate::domain::ports::{
    AccountData, ChainClient, HoneypotProvider, KeyVault, MevSubmitter, PoolSource, PriceProvider,
    PricePoint, Quote, RawTransaction, SwapAggregator, SwapParams, SwapTransaction, TokenHolder,
    TokenSupply,
};
use crate::domain::positions::{Position, PositionStatus};
use crate::domain::repositories::{OrderRepository, PositionRepository};

// ---------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------

#[derive(Default)]
pub struct MockChainClient {
    accounts: RwLock<HashMap<Pubkey, AccountData>>,
    supplies: RwLock<HashMap<Pubkey, TokenSupply>>,
    holders: RwLock<HashMap<Pubkey, Vec<TokenHolder>>>,
    fees: RwLock<Vec<u64>>,
    transactions: RwLock<HashMap<Signature, RawTransaction>>,
    account_failures: AtomicU32,
    submit_failures: AtomicU32,
    account_call_count: AtomicU64,
    submit_call_count: AtomicU64,
    fee_call_count: AtomicU64,
}

impl MockChainClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_account(&self, address: Pubkey, data: Vec<u8>) {
        self.accounts.write().await.insert(
            address,
            AccountData {
                lamports: 1,
                owner: Pubkey::default(),
                data,
            },
        );
    }

    pub async fn put_account_owned(&self, address: Pubkey, owner: Pubkey, data: Vec<u8>) {
        self.accounts.write().await.insert(
            address,
            AccountData {
                lamports: 1,
                owner,
                data,
            },
        );
    }

    pub async fn put_supply(&self, mint: Pubkey, amount: u64, decimals: u8) {
        self.supplies
            .write()
            .await
            .insert(mint, TokenSupply { amount, decimals });
    }

    pub async fn put_holders(&self, mint: Pubkey, amounts: Vec<u64>) {
        let holders = amounts
            .into_iter()
            .map(|amount| TokenHolder {
                address: Pubkey::new_unique(),
                amount,
            })
            .collect();
        self.holders.write().await.insert(mint, holders);
    }

    pub async fn put_holders_at(&self, mint: Pubkey, entries: Vec<(Pubkey, u64)>) {
        let holders = entries
            .into_iter()
            .map(|(address, amount)| TokenHolder { address, amount })
            .collect();
        self.holders.write().await.insert(mint, holders);
    }

    pub async fn put_fees(&self, fees: Vec<u64>) {
        *self.fees.write().await = fees;
    }

    pub async fn put_transaction(&self, tx: RawTransaction) {
        self.transactions.write().await.insert(tx.signature, tx);
    }

    /// Make the next `n` account reads fail with a network error.
    pub async fn fail_accounts(&self, n: u32) {
        self.account_failures.store(n, Ordering::SeqCst);
    }

    pub async fn fail_submits(&self, n: u32) {
        self.submit_failures.store(n, Ordering::SeqCst);
    }

    pub fn account_calls(&self) -> u64 {
        self.account_call_count.load(Ordering::SeqCst)
    }

    pub fn submit_calls(&self) -> u64 {
        self.submit_call_count.load(Ordering::SeqCst)
    }

    pub fn fee_calls(&self) -> u64 {
        self.fee_call_count.load(Ordering::SeqCst)
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn get_account(&self, address: &Pubkey) -> Result<AccountData, SniperError> {
        self.account_call_count.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.account_failures) {
            return Err(SniperError::Network("mock account failure".into()));
        }
        self.accounts
            .read()
            .await
            .get(address)
            .cloned()
            .ok_or_else(|| SniperError::Network(format!("account {address} not found")))
    }

    async fn get_token_supply(&self, mint: &Pubkey) -> Result<TokenSupply, SniperError> {
        self.supplies
            .read()
            .await
            .get(mint)
            .copied()
            .ok_or_else(|| SniperError::Network(format!("supply {mint} not found")))
    }

    async fn get_largest_holders(
        &self,
        mint: &Pubkey,
        limit: usize,
    ) -> Result<Vec<TokenHolder>, SniperError> {
        Ok(self
            .holders
            .read()
            .await
            .get(mint)
            .map(|h| h.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn get_recent_prioritization_fees(
        &self,
        _accounts: &[Pubkey],
    ) -> Result<Vec<u64>, SniperError> {
        self.fee_call_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.fees.read().await.clone())
    }

    async fn get_transaction(&self, signature: &Signature) -> Result<RawTransaction, SniperError> {
        self.transactions
            .read()
            .await
            .get(signature)
            .cloned()
            .ok_or_else(|| SniperError::Network(format!("transaction {signature} not found")))
    }

    async fn send_transaction(&self, _tx_base64: &str) -> Result<Signature, SniperError> {
        self.submit_call_count.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.submit_failures) {
            return Err(SniperError::Network("mock submit failure".into()));
        }
        Ok(Signature::from([7u8; 64]))
    }
}

// ---------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------

enum QuoteScript {
    Succeed { out: u64 },
    FailTransient,
    NoRoute,
}

pub struct MockAggregator {
    scripts: Mutex<HashMap<Pubkey, Vec<QuoteScript>>>,
    price_out: RwLock<HashMap<Pubkey, u64>>,
    quote_call_count: AtomicU64,
    swap_call_count: AtomicU64,
}

impl MockAggregator {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            price_out: RwLock::new(HashMap::new()),
            quote_call_count: AtomicU64::new(0),
            swap_call_count: AtomicU64::new(0),
        }
    }

    /// Queue transient failures before a final success for a mint.
    pub async fn script_failures_then_success(&self, mint: Pubkey, failures: u32, out: u64) {
        let mut script: Vec<QuoteScript> = (0..failures).map(|_| QuoteScript::FailTransient).collect();
        script.push(QuoteScript::Succeed { out });
        self.scripts.lock().await.insert(mint, script);
    }

    pub async fn script_no_route(&self, mint: Pubkey) {
        self.scripts
            .lock()
            .await
            .insert(mint, vec![QuoteScript::NoRoute]);
    }

    pub async fn set_price_out(&self, mint: Pubkey, out: u64) {
        self.price_out.write().await.insert(mint, out);
    }

    pub fn quote_calls(&self) -> u64 {
        self.quote_call_count.load(Ordering::SeqCst)
    }

    pub fn swap_calls(&self) -> u64 {
        self.swap_call_count.load(Ordering::SeqCst)
    }
}

impl Default for MockAggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SwapAggregator for MockAggregator {
    async fn quote(
        &self,
        input_mint: &Pubkey,
        output_mint: &Pubkey,
        amount_in: u64,
        _slippage_bps: u16,
    ) -> Result<Quote, SniperError> {
        self.quote_call_count.fetch_add(1, Ordering::SeqCst);

        // Scripts are keyed by whichever side is scripted.
        let mut scripts = self.scripts.lock().await;
        let key = if scripts.contains_key(output_mint) {
            *output_mint
        } else {
            *input_mint
        };
        if let Some(script) = scripts.get_mut(&key) {
            if !script.is_empty() {
                match script.remove(0) {
                    QuoteScript::Succeed { out } => {
                        return Ok(Quote {
                            quote_id: Uuid::new_v4().to_string(),
                            input_mint: *input_mint,
                            output_mint: *output_mint,
                            amount_in,
                            expected_out: out,
                            price_impact_pct: 0.5,
                            raw: serde_json::json!({"mock": true}),
                        });
                    }
                    QuoteScript::FailTransient => {
                        return Err(SniperError::Network("mock quote failure".into()));
                    }
                    QuoteScript::NoRoute => {
                        return Err(SniperError::NoRoute {
                            mint: output_mint.to_string(),
                        });
                    }
                }
            }
        }
        drop(scripts);

        // Fall back to the price table (used by the price provider).
        if let Some(out) = self.price_out.read().await.get(input_mint) {
            return Ok(Quote {
                quote_id: Uuid::new_v4().to_string(),
                input_mint: *input_mint,
                output_mint: *output_mint,
                amount_in,
                expected_out: *out,
                price_impact_pct: 0.1,
                raw: serde_json::json!({"mock": true}),
            });
        }

        Err(SniperError::NoRoute {
            mint: output_mint.to_string(),
        })
    }

    async fn swap(
        &self,
        _quote: &Quote,
        _params: &SwapParams,
    ) -> Result<SwapTransaction, SniperError> {
        self.swap_call_count.fetch_add(1, Ordering::SeqCst);
        Ok(SwapTransaction {
            tx_base64: "bW9jaw==".into(),
            last_valid_block_height: 1,
        })
    }
}

// ---------------------------------------------------------------------
// Pool source
// ---------------------------------------------------------------------

pub struct MockPoolSource {
    events: Mutex<Option<mpsc::Sender<PoolCreated>>>,
    signals: Mutex<Option<mpsc::Sender<SourceSignal>>>,
}

impl MockPoolSource {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(None),
            signals: Mutex::new(None),
        }
    }

    pub async fn emit(&self, event: PoolCreated) {
        if let Some(tx) = self.events.lock().await.as_ref() {
            let _ = tx.send(event).await;
        }
    }

    pub async fn signal(&self, signal: SourceSignal) {
        if let Some(tx) = self.signals.lock().await.as_ref() {
            let _ = tx.send(signal).await;
        }
    }
}

impl Default for MockPoolSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PoolSource for MockPoolSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn start(
        &self,
        events: mpsc::Sender<PoolCreated>,
        signals: mpsc::Sender<SourceSignal>,
    ) -> Result<(), SniperError> {
        *self.events.lock().await = Some(events);
        *self.signals.lock().await = Some(signals);
        Ok(())
    }

    async fn stop(&self) {
        *self.events.lock().await = None;
        *self.signals.lock().await = None;
    }
}

// ---------------------------------------------------------------------
// Honeypot provider
// ---------------------------------------------------------------------

pub struct MockHoneypotProvider {
    name: String,
    result: RwLock<Result<ProviderLayer, String>>,
    call_count: AtomicU64,
}

impl MockHoneypotProvider {
    pub fn succeeding(name: &str, layer: ProviderLayer) -> Self {
        Self {
            name: name.to_string(),
            result: RwLock::new(Ok(layer)),
            call_count: AtomicU64::new(0),
        }
    }

    pub fn failing(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            result: RwLock::new(Err(message.to_string())),
            call_count: AtomicU64::new(0),
        }
    }

    pub fn calls(&self) -> u64 {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HoneypotProvider for MockHoneypotProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self, _token_mint: &Pubkey) -> Result<ProviderLayer, SniperError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        match &*self.result.read().await {
            Ok(layer) => Ok(layer.clone()),
            Err(message) => Err(SniperError::Network(message.clone())),
        }
    }
}

// ---------------------------------------------------------------------
// Price provider
// ---------------------------------------------------------------------

#[derive(Default)]
pub struct MockPriceProvider {
    prices: RwLock<HashMap<Pubkey, f64>>,
}

impl MockPriceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_price(&self, mint: Pubkey, price: f64) {
        self.prices.write().await.insert(mint, price);
    }
}

#[async_trait]
impl PriceProvider for MockPriceProvider {
    async fn get_price(&self, mint: &Pubkey) -> Result<PricePoint, SniperError> {
        self.prices
            .read()
            .await
            .get(mint)
            .map(|price| PricePoint {
                price: *price,
                fetched_at: Utc::now(),
            })
            .ok_or_else(|| SniperError::Network(format!("no price for {mint}")))
    }
}

// ---------------------------------------------------------------------
// MEV
// ---------------------------------------------------------------------

#[derive(Default)]
pub struct MockMevSubmitter {
    bundle_count: AtomicU64,
}

impl MockMevSubmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bundles(&self) -> u64 {
        self.bundle_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MevSubmitter for MockMevSubmitter {
    async fn submit_bundle(
        &self,
        _tx_base64: &str,
        _tip_lamports: u64,
    ) -> Result<Signature, SniperError> {
        self.bundle_count.fetch_add(1, Ordering::SeqCst);
        Ok(Signature::from([8u8; 64]))
    }
}

// ---------------------------------------------------------------------
// Key vault
// ---------------------------------------------------------------------

pub struct MockKeyVault;

#[async_trait]
impl KeyVault for MockKeyVault {
    async fn unlock(&self, _wallet: &Pubkey) -> Result<solana_sdk::signature::Keypair, SniperError> {
        Ok(solana_sdk::signature::Keypair::new())
    }
}

// ---------------------------------------------------------------------
// In-memory repositories
// ---------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<HashMap<Uuid, Order>>,
    claims: RwLock<HashMap<Uuid, String>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn create(&self, order: &Order) -> Result<(), SniperError> {
        self.orders.write().await.insert(order.id, order.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Order>, SniperError> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn update(&self, order: &Order) -> Result<(), SniperError> {
        let mut orders = self.orders.write().await;
        if !orders.contains_key(&order.id) {
            return Err(SniperError::OrderNotFound(order.id));
        }
        orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn claim(&self, id: Uuid, claimant: &str) -> Result<bool, SniperError> {
        let mut claims = self.claims.write().await;
        match claims.get(&id) {
            Some(held) if held != claimant => Ok(false),
            _ => {
                claims.insert(id, claimant.to_string());
                Ok(true)
            }
        }
    }

    async fn release(&self, id: Uuid, claimant: &str) -> Result<(), SniperError> {
        let mut claims = self.claims.write().await;
        if claims.get(&id).is_some_and(|held| held == claimant) {
            claims.remove(&id);
        }
        Ok(())
    }

    async fn find_by_state(&self, state: OrderState) -> Result<Vec<Order>, SniperError> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .filter(|o| o.state == state)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryPositionRepository {
    positions: RwLock<HashMap<Uuid, Position>>,
}

impl InMemoryPositionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PositionRepository for InMemoryPositionRepository {
    async fn create(&self, position: &Position) -> Result<(), SniperError> {
        let mut positions = self.positions.write().await;
        if positions
            .values()
            .any(|p| p.order_id == position.order_id)
        {
            return Err(SniperError::Store(format!(
                "order {} already has a position",
                position.order_id
            )));
        }
        positions.insert(position.id, position.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Position>, SniperError> {
        Ok(self.positions.read().await.get(&id).cloned())
    }

    async fn get_by_order(&self, order_id: Uuid) -> Result<Option<Position>, SniperError> {
        Ok(self
            .positions
            .read()
            .await
            .values()
            .find(|p| p.order_id == order_id)
            .cloned())
    }

    async fn update(&self, position: &Position) -> Result<(), SniperError> {
        let mut positions = self.positions.write().await;
        if !positions.contains_key(&position.id) {
            return Err(SniperError::PositionNotFound(position.id));
        }
        positions.insert(position.id, position.clone());
        Ok(())
    }

    async fn find_by_status(
        &self,
        status: PositionStatus,
    ) -> Result<Vec<Position>, SniperError> {
        Ok(self
            .positions
            .read()
            .await
            .values()
            .filter(|p| p.status == status)
            .cloned()
            .collect())
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: PositionStatus,
        to: PositionStatus,
    ) -> Result<bool, SniperError> {
        let mut positions = self.positions.write().await;
        match positions.get_mut(&id) {
            Some(position) if position.status == from => {
                position.status = to;
                position.updated_at = Utc::now();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(SniperError::PositionNotFound(id)),
        }
    }
}
