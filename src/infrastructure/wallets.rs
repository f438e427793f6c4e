//! Wallet registry, rotation state and the session key vault.
//!
//! Wallet selection implements the privacy layer's rotation
//! strategies. A fresh wallet is exclusive to the trade that selected
//! it; the per-user trade counter drives `FreshThreshold` rotation.

use async_trait::async_trait;
use rand::Rng;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::domain::errors::SniperError;
use crate::domain::ports::KeyVault;
use crate::domain::privacy::WalletStrategy;

pub const DEFAULT_MAX_WALLETS_PER_USER: usize = 10;

#[derive(Default)]
struct RotationState {
    cursor: usize,
    trades_since_last_rotation: u32,
    fresh_used: HashSet<Pubkey>,
    current: Option<Pubkey>,
}

pub struct WalletRegistry {
    max_wallets_per_user: usize,
    wallets: RwLock<HashMap<String, Vec<Pubkey>>>,
    rotation: RwLock<HashMap<String, RotationState>>,
}

impl WalletRegistry {
    pub fn new(max_wallets_per_user: usize) -> Self {
        Self {
            max_wallets_per_user,
            wallets: RwLock::new(HashMap::new()),
            rotation: RwLock::new(HashMap::new()),
        }
    }

    pub async fn register(&self, user_id: &str, wallet: Pubkey) -> Result<(), SniperError> {
        let mut wallets = self.wallets.write().await;
        let entry = wallets.entry(user_id.to_string()).or_default();
        if entry.len() >= self.max_wallets_per_user {
            return Err(SniperError::Validation(format!(
                "user {user_id} already has {} wallets",
                entry.len()
            )));
        }
        if !entry.contains(&wallet) {
            entry.push(wallet);
        }
        Ok(())
    }

    pub async fn wallets_of(&self, user_id: &str) -> Vec<Pubkey> {
        self.wallets
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Select a wallet for one trade under the given strategy.
    pub async fn select(
        &self,
        user_id: &str,
        strategy: WalletStrategy,
    ) -> Result<Pubkey, SniperError> {
        let wallets = self.wallets_of(user_id).await;
        if wallets.is_empty() {
            return Err(SniperError::Validation(format!(
                "user {user_id} has no registered wallets"
            )));
        }

        let mut rotation = self.rotation.write().await;
        let state = rotation.entry(user_id.to_string()).or_default();

        let selected = match strategy {
            WalletStrategy::PrimaryOnly => wallets[0],
            WalletStrategy::RoundRobin => {
                let wallet = wallets[state.cursor % wallets.len()];
                state.cursor = (state.cursor + 1) % wallets.len();
                wallet
            }
            WalletStrategy::Random => wallets[rand::rng().random_range(0..wallets.len())],
            WalletStrategy::FreshOnly => {
                let fresh = wallets
                    .iter()
                    .find(|w| !state.fresh_used.contains(w))
                    .copied()
                    .ok_or_else(|| {
                        SniperError::Validation(format!(
                            "user {user_id} has no fresh wallets left"
                        ))
                    })?;
                state.fresh_used.insert(fresh);
                state.trades_since_last_rotation = 0;
                info!("wallet rotation: fresh wallet {fresh} assigned to {user_id}");
                fresh
            }
            WalletStrategy::FreshThreshold(threshold) => match state.current {
                Some(current) if state.trades_since_last_rotation < threshold => current,
                _ => {
                    let next = wallets
                        .iter()
                        .find(|w| !state.fresh_used.contains(w))
                        .copied()
                        .unwrap_or(wallets[state.cursor % wallets.len()]);
                    state.fresh_used.insert(next);
                    state.cursor = (state.cursor + 1) % wallets.len();
                    state.trades_since_last_rotation = 0;
                    state.current = Some(next);
                    next
                }
            },
        };

        Ok(selected)
    }

    /// Bump the per-user trade counter. Called once per executed trade.
    pub async fn record_trade(&self, user_id: &str) {
        let mut rotation = self.rotation.write().await;
        let state = rotation.entry(user_id.to_string()).or_default();
        state.trades_since_last_rotation += 1;
    }

    pub async fn trades_since_last_rotation(&self, user_id: &str) -> u32 {
        self.rotation
            .read()
            .await
            .get(user_id)
            .map(|s| s.trades_since_last_rotation)
            .unwrap_or(0)
    }
}

/// Session-scoped vault over already-decrypted keypairs. At-rest
/// encryption and unlocking UX live outside the core; both monitors
/// and the order engine sign through this handle.
pub struct SessionKeyVault {
    keys: RwLock<HashMap<Pubkey, Vec<u8>>>,
}

impl SessionKeyVault {
    pub fn new() -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
        }
    }

    pub async fn insert(&self, keypair: &Keypair) {
        self.keys
            .write()
            .await
            .insert(keypair.pubkey(), keypair.to_bytes().to_vec());
    }

    /// Load base58-encoded secret keys, e.g. from the env-provided
    /// wallet list. Returns the public keys in input order.
    pub async fn load_base58(&self, encoded: &[String]) -> Result<Vec<Pubkey>, SniperError> {
        let mut loaded = Vec::with_capacity(encoded.len());
        for entry in encoded {
            let bytes = bs58::decode(entry.trim())
                .into_vec()
                .map_err(|e| SniperError::Validation(format!("bad wallet key: {e}")))?;
            let keypair = Keypair::from_bytes(&bytes)
                .map_err(|e| SniperError::Validation(format!("bad wallet key: {e}")))?;
            loaded.push(keypair.pubkey());
            self.insert(&keypair).await;
        }
        Ok(loaded)
    }
}

impl Default for SessionKeyVault {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyVault for SessionKeyVault {
    async fn unlock(&self, wallet: &Pubkey) -> Result<Keypair, SniperError> {
        let keys = self.keys.read().await;
        let bytes = keys.get(wallet).ok_or_else(|| {
            SniperError::Validation(format!("no key material for wallet {wallet}"))
        })?;
        Keypair::from_bytes(bytes)
            .map_err(|e| SniperError::Unknown(format!("corrupt key material: {e}")))
    }
}
