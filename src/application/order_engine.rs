//! Order engine: drives a buy from `PENDING` to `CONFIRMED`.
//!
//! One pipeline task per order, enforced by a claim record in the
//! store. Steps advance the state machine one edge at a time and
//! persist after every transition; the short-TTL order cache is
//! invalidated alongside. Retryable failures re-run the remaining
//! steps with exponential backoff, non-retryable ones terminate the
//! order in `FAILED`.

use chrono::Utc;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::application::fee_optimizer::FeeOptimizer;
use crate::application::filter_validator::FilterValidator;
use crate::application::honeypot_evaluator::HoneypotEvaluator;
use crate::domain::errors::SniperError;
use crate::domain::filters::{FilterPreset, SniperFilters};
use crate::domain::orders::{Order, OrderFill, OrderState};
use crate::domain::ports::{MevSubmitter, SwapAggregator, SwapParams, TtlCache};
use crate::domain::positions::{Position, PositionStatus};
use crate::domain::repositories::{OrderRepository, PositionRepository};
use crate::infrastructure::cache::{claimant_id, keys};
use crate::infrastructure::core::{retry_with_backoff, RetryPolicy};
use crate::infrastructure::rpc::RpcFabric;

const MAX_ATTEMPT_BACKOFF_MS: u64 = 10_000;
const CONFIRM_POLLS: u32 = 10;
const CONFIRM_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// A pipeline attempt retries transient failures, including a step
/// whose own bounded retry loop just ran dry.
fn attempt_retryable(e: &SniperError) -> bool {
    e.is_retryable() || matches!(e, SniperError::MaxRetriesExceeded { .. })
}

/// Per-trade context assembled by the orchestrator.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub wallet: Pubkey,
    /// Quote-side mint being spent; the native mint for SOL snipes.
    pub input_mint: Pubkey,
    pub preset: FilterPreset,
    pub custom_filters: Option<SniperFilters>,
    pub lp_mint: Option<Pubkey>,
    pub liquidity_hint: Option<u64>,
    pub mev_tip_lamports: Option<u64>,
    pub memo: Option<String>,
}

impl ExecutionContext {
    pub fn new(wallet: Pubkey, preset: FilterPreset) -> Self {
        Self {
            wallet,
            input_mint: spl_token::native_mint::id(),
            preset,
            custom_filters: None,
            lp_mint: None,
            liquidity_hint: None,
            mev_tip_lamports: None,
            memo: None,
        }
    }
}

pub struct OrderEngine {
    orders: Arc<dyn OrderRepository>,
    positions: Arc<dyn PositionRepository>,
    cache: Arc<dyn TtlCache>,
    evaluator: Arc<HoneypotEvaluator>,
    filter_validator: Arc<FilterValidator>,
    fee_optimizer: Arc<FeeOptimizer>,
    aggregator: Arc<dyn SwapAggregator>,
    fabric: Arc<RpcFabric>,
    mev: Arc<dyn MevSubmitter>,
    order_cache_ttl_secs: u64,
}

impl OrderEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        positions: Arc<dyn PositionRepository>,
        cache: Arc<dyn TtlCache>,
        evaluator: Arc<HoneypotEvaluator>,
        filter_validator: Arc<FilterValidator>,
        fee_optimizer: Arc<FeeOptimizer>,
        aggregator: Arc<dyn SwapAggregator>,
        fabric: Arc<RpcFabric>,
        mev: Arc<dyn MevSubmitter>,
        order_cache_ttl_secs: u64,
    ) -> Self {
        Self {
            orders,
            positions,
            cache,
            evaluator,
            filter_validator,
            fee_optimizer,
            aggregator,
            fabric,
            mev,
            order_cache_ttl_secs,
        }
    }

    /// Execute an order to a terminal state. Returns the final order;
    /// terminal failures also carry the error.
    pub async fn execute(
        &self,
        order_id: Uuid,
        ctx: &ExecutionContext,
    ) -> Result<Order, SniperError> {
        let claimant = claimant_id();
        if !self.orders.claim(order_id, &claimant).await? {
            return Err(SniperError::OrderClaimed(order_id));
        }

        let result = self.execute_claimed(order_id, ctx).await;

        self.orders.release(order_id, &claimant).await?;
        result
    }

    async fn execute_claimed(
        &self,
        order_id: Uuid,
        ctx: &ExecutionContext,
    ) -> Result<Order, SniperError> {
        let mut order = self
            .load_order(order_id)
            .await?
            .ok_or(SniperError::OrderNotFound(order_id))?;

        let budget = Duration::from_millis(order.config.timeout_ms);
        let started = Instant::now();
        let max_attempts = order.config.max_retries.max(1);

        loop {
            let remaining = budget
                .checked_sub(started.elapsed())
                .ok_or(SniperError::Timeout(order.config.timeout_ms));
            let remaining = match remaining {
                Ok(r) => r,
                Err(e) => {
                    self.fail_order(&mut order, &e).await?;
                    return Err(e);
                }
            };

            let attempt_result = tokio::time::timeout(
                remaining,
                self.run_attempt(&mut order, ctx, started),
            )
            .await
            .unwrap_or(Err(SniperError::Timeout(order.config.timeout_ms)));

            match attempt_result {
                Ok(()) => {
                    info!(
                        "order {} confirmed in {}ms after {} retr{}",
                        order.id,
                        started.elapsed().as_millis(),
                        order.retry_count,
                        if order.retry_count == 1 { "y" } else { "ies" }
                    );
                    return Ok(order);
                }
                Err(e) if attempt_retryable(&e) && order.retry_count + 1 < max_attempts => {
                    order.retry_count += 1;
                    self.persist(&order).await?;
                    let backoff = Duration::from_millis(
                        (1_000u64 << (order.retry_count - 1).min(16))
                            .min(MAX_ATTEMPT_BACKOFF_MS),
                    );
                    warn!(
                        "order {}: attempt {} failed ({e}), retrying in {backoff:?}",
                        order.id, order.retry_count
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    let terminal = match e {
                        SniperError::MaxRetriesExceeded { .. } => e,
                        e if e.is_retryable() => SniperError::MaxRetriesExceeded {
                            attempts: order.retry_count + 1,
                            last_error: e.to_string(),
                        },
                        e => e,
                    };
                    self.fail_order(&mut order, &terminal).await?;
                    return Err(terminal);
                }
            }
        }
    }

    async fn run_attempt(
        &self,
        order: &mut Order,
        ctx: &ExecutionContext,
        started: Instant,
    ) -> Result<(), SniperError> {
        let mint = order.config.token_mint;

        // Validate: honeypot evaluation and structural filter
        // validation are independent and run concurrently; the policy
        // check follows on their results.
        if order.state == OrderState::Pending {
            let filters =
                SniperFilters::for_preset(ctx.preset, ctx.custom_filters.clone());
            let (honeypot, structural) = tokio::join!(
                self.evaluator.evaluate(&mint),
                async { self.filter_validator.validate(&filters) }
            );
            let honeypot = honeypot?;
            if !structural.valid {
                return Err(SniperError::Validation(structural.errors.join("; ")));
            }

            let check = self
                .filter_validator
                .check(
                    &honeypot,
                    ctx.preset,
                    ctx.custom_filters.clone(),
                    ctx.lp_mint.as_ref(),
                    ctx.liquidity_hint,
                )
                .await?;
            if !check.passed {
                return Err(SniperError::FilterRejected(check.violations));
            }
            self.advance(order, OrderState::Validated).await?;
        }

        // Quote.
        self.ensure(order, OrderState::Simulating).await?;
        let quote = retry_with_backoff(RetryPolicy::quotes(), "aggregator.quote", || {
            self.aggregator.quote(
                &ctx.input_mint,
                &mint,
                order.config.amount_in,
                order.config.slippage_bps,
            )
        })
        .await?;

        // Fee + swap build.
        self.ensure(order, OrderState::Signing).await?;
        let fee = self
            .fee_optimizer
            .optimize(order.config.priority_fee_mode, None, None, None)
            .await?;
        let swap = self
            .aggregator
            .swap(
                &quote,
                &SwapParams {
                    user: ctx.wallet,
                    compute_unit_price: fee.compute_unit_price,
                    mev_tip_lamports: ctx.mev_tip_lamports,
                    memo: ctx.memo.clone(),
                },
            )
            .await?;

        // Broadcast. Bundle routing is exclusive with the public path.
        self.ensure(order, OrderState::Broadcasting).await?;
        let signature = match (order.config.use_mev_bundle, ctx.mev_tip_lamports) {
            (true, Some(tip)) => self.mev.submit_bundle(&swap.tx_base64, tip).await?,
            _ => self.fabric.submit(&swap.tx_base64).await?,
        };

        // Confirm.
        self.ensure(order, OrderState::Confirming).await?;
        let slot = self.await_confirmation(&signature).await?;

        let fill = OrderFill {
            signature,
            slot,
            amount_in: order.config.amount_in,
            amount_out: quote.expected_out,
            price_impact_pct: quote.price_impact_pct,
            execution_time_ms: started.elapsed().as_millis() as u64,
        };

        // Position creation is best-effort: a store hiccup here must
        // not fail a filled order.
        if let Err(e) = self.create_position(order, &fill, ctx.wallet).await {
            error!("order {}: position creation failed: {e}", order.id);
        }

        order.fill = Some(fill);
        self.advance(order, OrderState::Confirmed).await?;
        Ok(())
    }

    async fn await_confirmation(
        &self,
        signature: &solana_sdk::signature::Signature,
    ) -> Result<u64, SniperError> {
        for _ in 0..CONFIRM_POLLS {
            match self.fabric.get_transaction(signature).await {
                Ok(tx) => return Ok(tx.slot),
                Err(SniperError::CircuitOpen { .. }) => {
                    // Keep waiting; the transaction may still land.
                }
                Err(_) => {}
            }
            tokio::time::sleep(CONFIRM_POLL_INTERVAL).await;
        }
        Err(SniperError::Timeout(
            (CONFIRM_POLLS as u64) * CONFIRM_POLL_INTERVAL.as_millis() as u64,
        ))
    }

    async fn create_position(
        &self,
        order: &Order,
        fill: &OrderFill,
        wallet: Pubkey,
    ) -> Result<(), SniperError> {
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
        self.positions.create(&position).await
    }

    /// Advance exactly one edge and persist.
    async fn advance(&self, order: &mut Order, to: OrderState) -> Result<(), SniperError> {
        order.transition(to)?;
        self.persist(order).await
    }

    /// Advance to `to` unless a previous attempt already got there.
    async fn ensure(&self, order: &mut Order, to: OrderState) -> Result<(), SniperError> {
        if order.state.can_transition(to) {
            self.advance(order, to).await?;
        }
        Ok(())
    }

    async fn fail_order(&self, order: &mut Order, error: &SniperError) -> Result<(), SniperError> {
        warn!(
            "order {} failed [{}]: {error}",
            order.id,
            error.user_code()
        );
        order.fail(format!("{}: {error}", error.user_code()))?;
        self.persist(order).await
    }

    async fn persist(&self, order: &Order) -> Result<(), SniperError> {
        self.orders.update(order).await?;
        // The cached copy is stale the moment a transition lands.
        self.cache.delete(&keys::order(order.id)).await?;
        Ok(())
    }

    async fn load_order(&self, id: Uuid) -> Result<Option<Order>, SniperError> {
        let key = keys::order(id);
        if let Ok(Some(cached)) = self.cache.get(&key).await {
            if let Ok(order) = serde_json::from_str::<Order>(&cached) {
                return Ok(Some(order));
            }
        }
        let order = self.orders.get(id).await?;
        if let Some(order) = &order {
            if let Ok(serialized) = serde_json::to_string(order) {
                let _ = self
                    .cache
                    .set_ex(&key, &serialized, self.order_cache_ttl_secs)
                    .await;
            }
        }
        Ok(order)
    }
}
