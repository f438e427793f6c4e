//! Orchestrator: owns the end-to-end lifetime of a snipe.
//!
//! Wires ingest to the order engine and the monitors: wallet selection
//! and unlock, the best-effort privacy plan, the pre-trade delay, the
//! order run, then monitor registration. Returns a per-phase latency
//! breakdown either way.

use chrono::Utc;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::order_engine::{ExecutionContext, OrderEngine};
use crate::application::position_monitor::PositionMonitor;
use crate::application::privacy_engine::PrivacyEngine;
use crate::application::rug_monitor::RugMonitor;
use crate::domain::errors::SniperError;
use crate::domain::events::PoolCreated;
use crate::domain::filters::{FilterPreset, SniperFilters};
use crate::domain::orders::{Order, OrderConfig, OrderState, PriorityFeeMode};
use crate::domain::ports::KeyVault;
use crate::domain::positions::{Position, PositionStatus};
use crate::domain::repositories::{OrderRepository, PositionRepository};
use crate::infrastructure::wallets::WalletRegistry;

/// A user-initiated (or auto-snipe) buy request.
#[derive(Debug, Clone)]
pub struct SnipeRequest {
    pub user_id: String,
    pub token_mint: Pubkey,
    /// Quote base units to spend.
    pub amount_in: u64,
    pub preset: FilterPreset,
    pub custom_filters: Option<SniperFilters>,
    pub slippage_bps: u16,
    pub priority_fee_mode: Option<PriorityFeeMode>,
    pub use_mev_bundle: bool,
    pub take_profit_pct: Option<f64>,
    pub stop_loss_pct: Option<f64>,
    pub lp_mint: Option<Pubkey>,
    pub liquidity_hint: Option<u64>,
}

impl SnipeRequest {
    pub fn new(user_id: impl Into<String>, token_mint: Pubkey, amount_in: u64) -> Self {
        Self {
            user_id: user_id.into(),
            token_mint,
            amount_in,
            preset: FilterPreset::Balanced,
            custom_filters: None,
            slippage_bps: 100,
            priority_fee_mode: None,
            use_mev_bundle: false,
            take_profit_pct: None,
            stop_loss_pct: None,
            lp_mint: None,
            liquidity_hint: None,
        }
    }
}

/// Per-phase wall-clock latencies of one snipe.
#[derive(Debug, Clone, Default)]
pub struct ExecutionBreakdown {
    pub wallet_ms: u64,
    pub privacy_ms: u64,
    pub delay_ms: u64,
    pub order_ms: u64,
    pub registration_ms: u64,
    pub total_ms: u64,
    /// Best-effort failures that did not abort the snipe.
    pub warnings: Vec<String>,
}

#[derive(Debug)]
pub struct SnipeOutcome {
    pub order: Order,
    pub position: Option<Position>,
    pub privacy_score: Option<u8>,
    pub breakdown: ExecutionBreakdown,
}

/// Auto-snipe settings for pool events flowing in from ingest.
#[derive(Debug, Clone)]
pub struct AutoSnipeSettings {
    pub user_id: String,
    pub amount_in: u64,
    pub preset: FilterPreset,
    pub take_profit_pct: Option<f64>,
    pub stop_loss_pct: Option<f64>,
    /// Minimum seeded liquidity before an event is worth an order.
    pub min_initial_liquidity: u64,
}

pub struct Orchestrator {
    wallets: Arc<WalletRegistry>,
    vault: Arc<dyn KeyVault>,
    privacy: Arc<PrivacyEngine>,
    orders: Arc<dyn OrderRepository>,
    positions: Arc<dyn PositionRepository>,
    engine: Arc<OrderEngine>,
    position_monitor: Arc<PositionMonitor>,
    rug_monitor: Arc<RugMonitor>,
    auto_snipe: Option<AutoSnipeSettings>,
    trade_counts: RwLock<HashMap<String, u64>>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        wallets: Arc<WalletRegistry>,
        vault: Arc<dyn KeyVault>,
        privacy: Arc<PrivacyEngine>,
        orders: Arc<dyn OrderRepository>,
        positions: Arc<dyn PositionRepository>,
        engine: Arc<OrderEngine>,
        position_monitor: Arc<PositionMonitor>,
        rug_monitor: Arc<RugMonitor>,
        auto_snipe: Option<AutoSnipeSettings>,
    ) -> Self {
        Self {
            wallets,
            vault,
            privacy,
            orders,
            positions,
            engine,
            position_monitor,
            rug_monitor,
            auto_snipe,
            trade_counts: RwLock::new(HashMap::new()),
        }
    }

    /// React to a freshly-detected pool under the auto-snipe policy.
    pub async fn handle_pool_event(&self, event: &PoolCreated) {
        let Some(settings) = &self.auto_snipe else {
            return;
        };
        if event.quote_mint != spl_token::native_mint::id() {
            return;
        }
        if event.initial_liquidity < settings.min_initial_liquidity {
            info!(
                "skipping {} pool {}: liquidity {} below floor",
                event.dex, event.pool_address, event.initial_liquidity
            );
            return;
        }
        if let Some(anti) = &event.anti_sniper {
            if anti.alpha_vault.is_some() {
                info!(
                    "skipping {} pool {}: alpha-vault window is live",
                    event.dex, event.pool_address
                );
                return;
            }
        }

        let mut request = SnipeRequest::new(
            settings.user_id.clone(),
            event.base_mint,
            settings.amount_in,
        );
        request.preset = settings.preset;
        request.take_profit_pct = settings.take_profit_pct;
        request.stop_loss_pct = settings.stop_loss_pct;
        request.liquidity_hint = Some(event.initial_liquidity);

        match self.snipe(request).await {
            Ok(outcome) => info!(
                "auto-snipe on {} finished: order {} {} in {}ms",
                event.pool_address,
                outcome.order.id,
                outcome.order.state,
                outcome.breakdown.total_ms
            ),
            Err(e) => info!("auto-snipe on {} declined: {e}", event.pool_address),
        }
    }

    /// Run one snipe end to end.
    pub async fn snipe(&self, request: SnipeRequest) -> Result<SnipeOutcome, SniperError> {
        let started = Instant::now();
        let mut breakdown = ExecutionBreakdown::default();

        // Wallet selection and unlock.
        let phase = Instant::now();
        let strategy = self.privacy.wallet_strategy_for(&request.user_id).await;
        let wallet = self.wallets.select(&request.user_id, strategy).await?;
        let keypair = self.vault.unlock(&wallet).await?;
        breakdown.wallet_ms = phase.elapsed().as_millis() as u64;

        // Privacy plan, best-effort.
        let phase = Instant::now();
        let trade_count = {
            let counts = self.trade_counts.read().await;
            counts.get(&request.user_id).copied().unwrap_or(0)
        };
        let plan = match self.privacy.plan(&request.user_id, trade_count).await {
            Ok(plan) => Some(plan),
            Err(e) => {
                warn!("privacy plan for {} failed: {e}", request.user_id);
                breakdown
                    .warnings
                    .push(format!("privacy plan unavailable: {e}"));
                None
            }
        };
        breakdown.privacy_ms = phase.elapsed().as_millis() as u64;

        // The computed delay is a plain sleep; no claims are held yet.
        let delay_ms = plan.as_ref().map(|p| p.delay_ms).unwrap_or(0);
        if delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
        }
        breakdown.delay_ms = delay_ms;

        // Create and run the order.
        let phase = Instant::now();
        let mut config = OrderConfig::new(request.token_mint, request.amount_in);
        config.slippage_bps = request.slippage_bps;
        config.priority_fee_mode = request
            .priority_fee_mode
            .or(plan.as_ref().map(|p| p.fee_mode))
            .unwrap_or(PriorityFeeMode::Medium);
        config.use_mev_bundle =
            request.use_mev_bundle || plan.as_ref().is_some_and(|p| p.mev_tip_lamports.is_some());
        config.take_profit_pct = request.take_profit_pct;
        config.stop_loss_pct = request.stop_loss_pct;

        let order = Order::new(request.user_id.clone(), config);
        self.orders.create(&order).await?;

        let ctx = ExecutionContext {
            wallet,
            input_mint: spl_token::native_mint::id(),
            preset: request.preset,
            custom_filters: request.custom_filters.clone(),
            lp_mint: request.lp_mint,
            liquidity_hint: request.liquidity_hint,
            mev_tip_lamports: plan.as_ref().and_then(|p| p.mev_tip_lamports),
            memo: plan.as_ref().and_then(|p| p.memo.clone()),
        };

        let order_result = self.engine.execute(order.id, &ctx).await;
        breakdown.order_ms = phase.elapsed().as_millis() as u64;

        self.wallets.record_trade(&request.user_id).await;
        {
            let mut counts = self.trade_counts.write().await;
            *counts.entry(request.user_id.clone()).or_insert(0) += 1;
        }

        let order = match order_result {
            Ok(order) => order,
            Err(e) => {
                // The keypair must not outlive the attempt.
                drop(keypair);
                breakdown.total_ms = started.elapsed().as_millis() as u64;
                return Err(e);
            }
        };

        // Locate the position and register the monitors.
        let phase = Instant::now();
        let position = self.ensure_position(&order, wallet, &mut breakdown).await;
        if let Some(position) = &position {
            if position.wants_price_monitoring() {
                self.position_monitor.register(position.id).await;
            }
            if let Err(e) = self.rug_monitor.register(position).await {
                warn!("rug monitor registration for {} failed: {e}", position.id);
                breakdown
                    .warnings
                    .push(format!("rug monitor registration failed: {e}"));
            }
        }
        breakdown.registration_ms = phase.elapsed().as_millis() as u64;

        // Wipe the in-memory keypair before reporting back.
        drop(keypair);

        breakdown.total_ms = started.elapsed().as_millis() as u64;
        info!(
            "snipe for {} done: wallet {}ms, privacy {}ms, delay {}ms, order {}ms, \
             registration {}ms, total {}ms",
            request.user_id,
            breakdown.wallet_ms,
            breakdown.privacy_ms,
            breakdown.delay_ms,
            breakdown.order_ms,
            breakdown.registration_ms,
            breakdown.total_ms
        );

        Ok(SnipeOutcome {
            order,
            position,
            privacy_score: plan.map(|p| p.privacy_score),
            breakdown,
        })
    }

    /// The engine creates positions best-effort; if the record is
    /// missing after a confirmed order, recreate it here.
    async fn ensure_position(
        &self,
        order: &Order,
        wallet: Pubkey,
        breakdown: &mut ExecutionBreakdown,
    ) -> Option<Position> {
        if order.state != OrderState::Confirmed {
            return None;
        }
        match self.positions.get_by_order(order.id).await {
            Ok(Some(position)) => Some(position),
            Ok(None) => {
                let fill = order.fill.as_ref()?;
                let now = Utc::now();
                let position = Position {
                    id: Uuid::new_v4(),
                    order_id: order.id,
                    user_id: order.user_id.clone(),
                    token_mint: order.config.token_mint,
                    wallet,
                    entry_signature: fill.signature,
                    amount_in: fill.amount_in,
                    amount_out: fill.amount_out,
                    entry_price_impact_pct: fill.price_impact_pct,
                    current_balance: fill.amount_out,
                    take_profit_pct: order.config.take_profit_pct,
                    stop_loss_pct: order.config.stop_loss_pct,
                    trailing_stop_pct: None,
                    highest_price_seen: None,
                    status: PositionStatus::Open,
                    exit_signature: None,
                    realized_pnl: None,
                    opened_at: now,
                    updated_at: now,
                };
                match self.positions.create(&position).await {
                    Ok(()) => {
                        info!("orchestrator recreated position for order {}", order.id);
                        Some(position)
                    }
                    Err(e) => {
                        warn!("position recovery for order {} failed: {e}", order.id);
                        breakdown
                            .warnings
                            .push(format!("position record missing: {e}"));
                        None
                    }
                }
            }
            Err(e) => {
                breakdown
                    .warnings
                    .push(format!("position lookup failed: {e}"));
                None
            }
        }
    }
}
