//! Rug monitor: the degradation-detection loop.
//!
//! Independent of the price monitor. Each tick re-observes every
//! watched token — supply once per position, authority state and top
//! holders in parallel — and compares against the baseline captured at
//! registration. Emergency recommendations trigger the shared exit
//! path with the aggressive policy. A global breaker pauses all rug
//! checks after consecutive failing ticks.

use chrono::Utc;
use futures::future::join_all;
use solana_sdk::pubkey::Pubkey;
use spl_token::solana_program::program_pack::Pack;
use spl_token::state::Mint;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::exit_executor::{emergency_exit_request, ExitExecutor};
use crate::domain::errors::SniperError;
use crate::domain::positions::{ExitTrigger, Position, PositionStatus};
use crate::domain::repositories::PositionRepository;
use crate::domain::rug::{
    detect, AuthorityState, ExitRecommendation, LiquiditySnapshot, RugDetection, RugObservation,
    RugThresholds, SupplySnapshot, TopHolder,
};
use crate::infrastructure::core::{CircuitBreaker, CircuitBreakerConfig};
use crate::infrastructure::rpc::RpcFabric;

#[derive(Debug, Clone)]
pub struct RugMonitorConfig {
    pub interval: Duration,
    pub thresholds: RugThresholds,
    pub top_holders_n: usize,
    pub auto_exit_enabled: bool,
    pub emergency_slippage_pct: f64,
    pub emergency_retries: u32,
}

impl Default for RugMonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(5_000),
            thresholds: RugThresholds::default(),
            top_holders_n: 10,
            auto_exit_enabled: true,
            emergency_slippage_pct: 25.0,
            emergency_retries: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchStatus {
    Active,
    Exited,
    Lost,
}

/// Per-position monitoring state.
pub struct WatchEntry {
    pub position_id: Uuid,
    pub token_mint: Pubkey,
    pub baseline: RugObservation,
    pub latest: Option<RugObservation>,
    pub checks_performed: u64,
    pub detections: Vec<RugDetection>,
    pub status: WatchStatus,
}

pub struct RugMonitor {
    positions: Arc<dyn PositionRepository>,
    fabric: Arc<RpcFabric>,
    exit_executor: Arc<ExitExecutor>,
    config: RugMonitorConfig,
    watches: Arc<RwLock<HashMap<Uuid, WatchEntry>>>,
    breaker: Arc<CircuitBreaker>,
    stopped: Arc<AtomicBool>,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl RugMonitor {
    pub fn new(
        positions: Arc<dyn PositionRepository>,
        fabric: Arc<RpcFabric>,
        exit_executor: Arc<ExitExecutor>,
        config: RugMonitorConfig,
    ) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(
            "rug_monitor",
            CircuitBreakerConfig {
                failure_threshold: 5,
                success_threshold: 2,
                timeout: Duration::from_secs(60),
                monitoring_period: Duration::from_secs(120),
            },
        ));
        Self {
            positions,
            fabric,
            exit_executor,
            config,
            watches: Arc::new(RwLock::new(HashMap::new())),
            breaker,
            stopped: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        }
    }

    /// Capture the baseline and start watching a position.
    pub async fn register(&self, position: &Position) -> Result<(), SniperError> {
        let baseline = self.observe(&position.token_mint).await?;
        let entry = WatchEntry {
            position_id: position.id,
            token_mint: position.token_mint,
            baseline,
            latest: None,
            checks_performed: 0,
            detections: Vec::new(),
            status: WatchStatus::Active,
        };
        self.watches.write().await.insert(position.id, entry);
        debug!("rug monitor: baseline captured for {}", position.id);
        Ok(())
    }

    pub async fn unregister(&self, position_id: Uuid) {
        self.watches.write().await.remove(&position_id);
    }

    pub async fn watched(&self) -> usize {
        self.watches.read().await.len()
    }

    pub async fn detections_for(&self, position_id: Uuid) -> Vec<RugDetection> {
        self.watches
            .read()
            .await
            .get(&position_id)
            .map(|e| e.detections.clone())
            .unwrap_or_default()
    }

    pub async fn start(self: Arc<Self>) {
        let monitor = Arc::clone(&self);
        let stopped = Arc::clone(&self.stopped);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(monitor.config.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if stopped.load(Ordering::SeqCst) {
                    break;
                }
                match monitor.breaker.call(monitor.run_tick()).await {
                    Ok(()) => {}
                    Err(SniperError::CircuitOpen { .. }) => {
                        debug!("rug monitor paused by breaker");
                    }
                    Err(e) => warn!("rug monitor tick failed: {e}"),
                }
            }
            info!("rug monitor stopped");
        });
        *self.task.lock().await = Some(handle);
    }

    pub async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
        }
    }

    /// One pass over every watched position.
    pub async fn run_tick(&self) -> Result<(), SniperError> {
        let ids: Vec<Uuid> = self.watches.read().await.keys().copied().collect();
        if ids.is_empty() {
            return Ok(());
        }

        let checks = ids.iter().map(|id| self.check_position(*id));
        let outcomes = join_all(checks).await;

        let failures = outcomes.iter().filter(|o| o.is_err()).count();
        for (id, outcome) in ids.iter().zip(&outcomes) {
            if let Err(e) = outcome {
                warn!("rug check {id} failed: {e}");
            }
        }
        if failures == ids.len() {
            return Err(SniperError::Unknown(format!(
                "all {failures} rug checks failed this tick"
            )));
        }
        Ok(())
    }

    async fn check_position(&self, position_id: Uuid) -> Result<(), SniperError> {
        let Some(position) = self.positions.get(position_id).await? else {
            self.drop_watch(position_id, WatchStatus::Lost).await;
            return Ok(());
        };
        if position.status != PositionStatus::Open {
            self.drop_watch(position_id, WatchStatus::Exited).await;
            return Ok(());
        }

        let token_mint = {
            let watches = self.watches.read().await;
            match watches.get(&position_id) {
                Some(entry) => entry.token_mint,
                None => return Ok(()),
            }
        };

        let latest = self.observe(&token_mint).await?;

        let detections = {
            let mut watches = self.watches.write().await;
            let Some(entry) = watches.get_mut(&position_id) else {
                return Ok(());
            };
            let detections = detect(&entry.baseline, &latest, &self.config.thresholds);
            entry.latest = Some(latest);
            entry.checks_performed += 1;
            entry.detections.extend(detections.iter().cloned());
            detections
        };

        for detection in &detections {
            warn!(
                "rug indicator on {position_id}: {} [{:?}/{:.0}] -> {:?} ({})",
                detection.rug_type,
                detection.severity,
                detection.confidence,
                detection.recommendation,
                detection.evidence
            );
        }

        let emergency = detections
            .iter()
            .find(|d| d.recommendation == ExitRecommendation::ExitEmergency);
        if let (Some(detection), true) = (emergency, self.config.auto_exit_enabled) {
            self.emergency_exit(&position, detection.clone()).await;
        }
        Ok(())
    }

    async fn emergency_exit(&self, position: &Position, detection: RugDetection) {
        info!(
            "rug monitor: emergency exit for position {} ({})",
            position.id, detection.rug_type
        );
        let request = emergency_exit_request(
            position.id,
            ExitTrigger::RugEmergency { detection },
            self.config.emergency_slippage_pct,
            self.config.emergency_retries,
        );
        match self.exit_executor.execute(request).await {
            Ok(result) => {
                info!(
                    "emergency exit saved {:.1}% of position {}",
                    result.position_saved_pct, position.id
                );
                self.drop_watch(position.id, WatchStatus::Exited).await;
            }
            Err(SniperError::ExitInFlight(_)) => {
                // The price monitor beat us to it; fine.
            }
            Err(e) => error!("emergency exit for {} failed: {e}", position.id),
        }
    }

    async fn drop_watch(&self, position_id: Uuid, status: WatchStatus) {
        let mut watches = self.watches.write().await;
        if let Some(entry) = watches.get_mut(&position_id) {
            entry.status = status;
        }
        watches.remove(&position_id);
    }

    /// Observe the token's degradable state: supply once, then
    /// authority and holders in parallel; liquidity derived from the
    /// largest vault's share of supply.
    pub async fn observe(&self, mint: &Pubkey) -> Result<RugObservation, SniperError> {
        let now = Utc::now();
        let supply = self.fabric.get_token_supply(mint).await?;

        let (account, holders) = tokio::join!(
            self.fabric.get_account(mint),
            self.fabric.get_largest_holders(mint, self.config.top_holders_n),
        );
        let account = account?;
        let holders = holders?;

        let mint_state = Mint::unpack(&account.data)
            .map_err(|e| SniperError::Validation(format!("not a token mint: {e}")))?;
        let authorities = AuthorityState {
            mint_authority: mint_state.mint_authority.into(),
            freeze_authority: mint_state.freeze_authority.into(),
        };

        let top_holders: Vec<TopHolder> = holders
            .iter()
            .map(|h| TopHolder {
                address: h.address,
                balance: h.amount,
                pct_of_supply: if supply.amount > 0 {
                    h.amount as f64 * 100.0 / supply.amount as f64
                } else {
                    0.0
                },
            })
            .collect();

        // The pool vault is the dominant holder for freshly-seeded
        // tokens, so its balance tracks pool reserves closely enough
        // to serve as the liquidity proxy.
        let base_reserve = top_holders.first().map(|h| h.balance).unwrap_or(0);

        Ok(RugObservation {
            authorities,
            liquidity: LiquiditySnapshot {
                base_reserve,
                taken_at: now,
            },
            supply: SupplySnapshot {
                supply: supply.amount,
                decimals: supply.decimals,
                taken_at: now,
            },
            top_holders,
            captured_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::fee_optimizer::{FeeOptimizer, FEE_CACHE_TTL_SECS};
    use crate::infrastructure::cache::InMemoryTtlCache;
    use crate::infrastructure::mock::{
        InMemoryPositionRepository, MockAggregator, MockChainClient, MockKeyVault,
        MockMevSubmitter,
    };
    use solana_sdk::signature::Signature;
    use spl_token::solana_program::program_option::COption;

    struct Harness {
        monitor: Arc<RugMonitor>,
        positions: Arc<InMemoryPositionRepository>,
        chain: Arc<MockChainClient>,
        aggregator: Arc<MockAggregator>,
    }

    fn mint_data(mint_authority: Option<Pubkey>) -> Vec<u8> {
        let mint = Mint {
            mint_authority: mint_authority.map(COption::Some).unwrap_or(COption::None),
            supply: 1_000_000,
            decimals: 6,
            is_initialized: true,
            freeze_authority: COption::None,
        };
        let mut data = vec![0u8; Mint::LEN];
        mint.pack_into_slice(&mut data);
        data
    }

    async fn harness(auto_exit: bool) -> Harness {
        let chain = Arc::new(MockChainClient::new());
        chain.put_fees((1..=20).map(|i| i * 1_000).collect()).await;
        chain
            .put_transaction(crate::domain::ports::RawTransaction {
                signature: Signature::from([8u8; 64]),
                slot: 2,
                account_keys: vec![],
                instructions: vec![],
            })
            .await;
        let fabric = Arc::new(RpcFabric::new(
            Arc::clone(&chain) as Arc<dyn crate::domain::ports::ChainClient>,
            CircuitBreakerConfig::default(),
        ));
        let positions = Arc::new(InMemoryPositionRepository::new());
        let aggregator = Arc::new(MockAggregator::new());
        let exit_executor = Arc::new(ExitExecutor::new(
            Arc::clone(&positions) as Arc<dyn PositionRepository>,
            Arc::new(FeeOptimizer::new(
                Arc::clone(&fabric),
                Arc::new(InMemoryTtlCache::new()),
                FEE_CACHE_TTL_SECS,
            )),
            Arc::clone(&aggregator) as Arc<dyn crate::domain::ports::SwapAggregator>,
            Arc::clone(&fabric),
            Arc::new(MockMevSubmitter::new()),
            Arc::new(MockKeyVault),
        ));
        let monitor = Arc::new(RugMonitor::new(
            Arc::clone(&positions) as Arc<dyn PositionRepository>,
            fabric,
            exit_executor,
            RugMonitorConfig {
                interval: Duration::from_millis(50),
                auto_exit_enabled: auto_exit,
                ..Default::default()
            },
        ));
        Harness {
            monitor,
            positions,
            chain,
            aggregator,
        }
    }

    async fn seed_token(h: &Harness, mint: Pubkey, pool_balance: u64) {
        h.chain.put_account(mint, mint_data(None)).await;
        h.chain.put_supply(mint, 1_000_000, 6).await;
        h.chain
            .put_holders_at(mint, vec![(Pubkey::new_unique(), pool_balance)])
            .await;
    }

    async fn open_position(h: &Harness, mint: Pubkey) -> Position {
        let now = Utc::now();
        let position = Position {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            user_id: "user-1".into(),
            token_mint: mint,
            wallet: Pubkey::new_unique(),
            entry_signature: Signature::default(),
            amount_in: 1_000_000,
            amount_out: 5_000_000,
            entry_price_impact_pct: 0.5,
            current_balance: 5_000_000,
            take_profit_pct: None,
            stop_loss_pct: None,
            trailing_stop_pct: None,
            highest_price_seen: None,
            status: PositionStatus::Open,
            exit_signature: None,
            realized_pnl: None,
            opened_at: now,
            updated_at: now,
        };
        h.positions.create(&position).await.unwrap();
        position
    }

    #[tokio::test]
    async fn test_liquidity_drain_triggers_emergency_exit() {
        let h = harness(true).await;
        let mint = Pubkey::new_unique();
        // Pool vault holds 100k at baseline. Keep the vault address
        // stable so the holder-dump detector sees the same account.
        let vault = Pubkey::new_unique();
        h.chain.put_account(mint, mint_data(None)).await;
        h.chain.put_supply(mint, 1_000_000, 6).await;
        h.chain.put_holders_at(mint, vec![(vault, 100_000)]).await;

        let position = open_position(&h, mint).await;
        h.monitor.register(&position).await.unwrap();

        // 95% of the pool walks out the door.
        h.chain.put_holders_at(mint, vec![(vault, 5_000)]).await;
        h.aggregator
            .script_failures_then_success(mint, 0, 400_000)
            .await;

        h.monitor.run_tick().await.unwrap();

        let exited = h.positions.get(position.id).await.unwrap().unwrap();
        assert_eq!(exited.status, PositionStatus::Closed);
        assert_eq!(h.monitor.watched().await, 0);
    }

    #[tokio::test]
    async fn test_moderate_drop_detects_without_exiting() {
        let h = harness(true).await;
        let mint = Pubkey::new_unique();
        let vault = Pubkey::new_unique();
        h.chain.put_account(mint, mint_data(None)).await;
        h.chain.put_supply(mint, 1_000_000, 6).await;
        h.chain.put_holders_at(mint, vec![(vault, 100_000)]).await;

        let position = open_position(&h, mint).await;
        h.monitor.register(&position).await.unwrap();

        // 60% drop: MEDIUM severity, no emergency recommendation.
        h.chain.put_holders_at(mint, vec![(vault, 40_000)]).await;
        h.monitor.run_tick().await.unwrap();

        let detections = h.monitor.detections_for(position.id).await;
        assert!(detections
            .iter()
            .any(|d| d.rug_type == crate::domain::rug::RugType::LiquidityRemoval));
        let still_open = h.positions.get(position.id).await.unwrap().unwrap();
        assert_eq!(still_open.status, PositionStatus::Open);
    }

    #[tokio::test]
    async fn test_authority_reenable_is_emergency() {
        let h = harness(true).await;
        let mint = Pubkey::new_unique();
        let vault = Pubkey::new_unique();
        h.chain.put_account(mint, mint_data(None)).await;
        h.chain.put_supply(mint, 1_000_000, 6).await;
        h.chain.put_holders_at(mint, vec![(vault, 100_000)]).await;

        let position = open_position(&h, mint).await;
        h.monitor.register(&position).await.unwrap();

        // Mint authority comes back from the dead.
        h.chain
            .put_account(mint, mint_data(Some(Pubkey::new_unique())))
            .await;
        h.aggregator
            .script_failures_then_success(mint, 0, 900_000)
            .await;

        h.monitor.run_tick().await.unwrap();

        let exited = h.positions.get(position.id).await.unwrap().unwrap();
        assert_eq!(exited.status, PositionStatus::Closed);
    }

    #[tokio::test]
    async fn test_auto_exit_disabled_only_records() {
        let h = harness(false).await;
        let mint = Pubkey::new_unique();
        let vault = Pubkey::new_unique();
        h.chain.put_account(mint, mint_data(None)).await;
        h.chain.put_supply(mint, 1_000_000, 6).await;
        h.chain.put_holders_at(mint, vec![(vault, 100_000)]).await;

        let position = open_position(&h, mint).await;
        h.monitor.register(&position).await.unwrap();

        h.chain.put_holders_at(mint, vec![(vault, 1_000)]).await;
        h.monitor.run_tick().await.unwrap();

        assert!(!h.monitor.detections_for(position.id).await.is_empty());
        let still_open = h.positions.get(position.id).await.unwrap().unwrap();
        assert_eq!(still_open.status, PositionStatus::Open);
    }
}
