//! Exit executor: the shared sell path.
//!
//! Both monitors funnel through here. The position is moved through
//! `EXITING` with a compare-and-set so two triggers can never race two
//! sells; retries use exit-specific backoff and the emergency path's
//! aggressive slippage and fee policy come in on the request.

use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::application::fee_optimizer::FeeOptimizer;
use crate::domain::errors::SniperError;
use crate::domain::ports::{KeyVault, MevSubmitter, SwapAggregator, SwapParams};
use crate::domain::positions::{ExitRequest, ExitResult, Position, PositionStatus};
use crate::domain::repositories::PositionRepository;
use crate::infrastructure::core::{retry_with_backoff, RetryPolicy};
use crate::infrastructure::rpc::RpcFabric;

const EXIT_BACKOFF_START: Duration = Duration::from_millis(500);
const EXIT_BACKOFF_CAP: Duration = Duration::from_secs(8);
const CONFIRM_POLLS: u32 = 10;
const CONFIRM_POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct ExitExecutor {
    positions: Arc<dyn PositionRepository>,
    fee_optimizer: Arc<FeeOptimizer>,
    aggregator: Arc<dyn SwapAggregator>,
    fabric: Arc<RpcFabric>,
    mev: Arc<dyn MevSubmitter>,
    vault: Arc<dyn KeyVault>,
}

impl ExitExecutor {
    pub fn new(
        positions: Arc<dyn PositionRepository>,
        fee_optimizer: Arc<FeeOptimizer>,
        aggregator: Arc<dyn SwapAggregator>,
        fabric: Arc<RpcFabric>,
        mev: Arc<dyn MevSubmitter>,
        vault: Arc<dyn KeyVault>,
    ) -> Self {
        Self {
            positions,
            fee_optimizer,
            aggregator,
            fabric,
            mev,
            vault,
        }
    }

    /// Run one exit to completion. The CAS into `EXITING` makes this
    /// safe to call from both monitors concurrently; losers back off
    /// with `ExitInFlight`.
    pub async fn execute(&self, request: ExitRequest) -> Result<ExitResult, SniperError> {
        let position = self
            .positions
            .get(request.position_id)
            .await?
            .ok_or(SniperError::PositionNotFound(request.position_id))?;

        if !self
            .positions
            .transition_status(position.id, PositionStatus::Open, PositionStatus::Exiting)
            .await?
        {
            return Err(SniperError::ExitInFlight(position.id));
        }

        info!(
            "exit [{}] started for position {} ({} base units)",
            request.trigger.label(),
            position.id,
            position.current_balance
        );

        let started = Instant::now();
        match self.sell(&position, &request).await {
            Ok((signature, amount_out, attempts)) => {
                let realized_pnl = amount_out as i64 - position.amount_in as i64;
                let position_saved_pct = if position.amount_in > 0 {
                    amount_out as f64 * 100.0 / position.amount_in as f64
                } else {
                    0.0
                };

                let mut closed = position.clone();
                closed.status = PositionStatus::Closed;
                closed.exit_signature = Some(signature);
                closed.realized_pnl = Some(realized_pnl);
                closed.current_balance = 0;
                closed.updated_at = Utc::now();
                self.positions.update(&closed).await?;

                let result = ExitResult {
                    position_id: position.id,
                    trigger_label: request.trigger.label().to_string(),
                    signature: Some(signature),
                    amount_out,
                    realized_pnl,
                    position_saved_pct,
                    attempts,
                    execution_time_ms: started.elapsed().as_millis() as u64,
                };
                info!(
                    "exit [{}] closed position {}: pnl {} ({}% saved) in {}ms",
                    result.trigger_label,
                    position.id,
                    realized_pnl,
                    position_saved_pct as i64,
                    result.execution_time_ms
                );
                Ok(result)
            }
            Err(e) => {
                warn!("exit for position {} exhausted: {e}", position.id);
                let moved = self
                    .positions
                    .transition_status(position.id, PositionStatus::Exiting, PositionStatus::Failed)
                    .await?;
                if !moved {
                    warn!("position {} left EXITING behind our back", position.id);
                }
                Err(e)
            }
        }
    }

    async fn sell(
        &self,
        position: &Position,
        request: &ExitRequest,
    ) -> Result<(solana_sdk::signature::Signature, u64, u32), SniperError> {
        // The session vault must be able to sign for this wallet; an
        // exit that cannot sign should fail before it burns attempts.
        let _keypair = self.vault.unlock(&position.wallet).await?;

        let max_attempts = request.max_attempts.max(1);
        let mut backoff = EXIT_BACKOFF_START;
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            match self.sell_once(position, request).await {
                Ok((signature, amount_out)) => return Ok((signature, amount_out, attempt)),
                Err(e)
                    if (e.is_retryable()
                        || matches!(e, SniperError::MaxRetriesExceeded { .. }))
                        && attempt < max_attempts =>
                {
                    warn!(
                        "exit attempt {attempt}/{max_attempts} for {} failed: {e}",
                        position.id
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(EXIT_BACKOFF_CAP);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or_else(|| SniperError::Unknown("exit produced no error".into())))
    }

    async fn sell_once(
        &self,
        position: &Position,
        request: &ExitRequest,
    ) -> Result<(solana_sdk::signature::Signature, u64), SniperError> {
        let quote = retry_with_backoff(RetryPolicy::quotes(), "aggregator.exit_quote", || {
            self.aggregator.quote(
                &position.token_mint,
                &spl_token::native_mint::id(),
                position.current_balance,
                request.slippage_bps,
            )
        })
        .await?;

        let fee = self
            .fee_optimizer
            .optimize(request.priority_fee_mode, None, None, None)
            .await?;
        let swap = self
            .aggregator
            .swap(
                &quote,
                &SwapParams {
                    user: position.wallet,
                    compute_unit_price: fee.compute_unit_price,
                    mev_tip_lamports: if request.use_mev_bundle {
                        Some(fee.total_fee_lamports.max(10_000))
                    } else {
                        None
                    },
                    memo: None,
                },
            )
            .await?;

        let signature = if request.use_mev_bundle {
            self.mev
                .submit_bundle(&swap.tx_base64, fee.total_fee_lamports.max(10_000))
                .await?
        } else {
            self.fabric.submit(&swap.tx_base64).await?
        };

        self.await_confirmation(&signature).await?;
        Ok((signature, quote.expected_out))
    }

    async fn await_confirmation(
        &self,
        signature: &solana_sdk::signature::Signature,
    ) -> Result<(), SniperError> {
        for _ in 0..CONFIRM_POLLS {
            if self.fabric.get_transaction(signature).await.is_ok() {
                return Ok(());
            }
            tokio::time::sleep(CONFIRM_POLL_INTERVAL).await;
        }
        Err(SniperError::Timeout(
            (CONFIRM_POLLS as u64) * CONFIRM_POLL_INTERVAL.as_millis() as u64,
        ))
    }
}

/// Convenience constructor for the emergency path: maximal slippage,
/// highest fee mode, MEV routing and five backed-off attempts.
pub fn emergency_exit_request(
    position_id: uuid::Uuid,
    trigger: crate::domain::positions::ExitTrigger,
    slippage_pct: f64,
    retries: u32,
) -> ExitRequest {
    ExitRequest {
        position_id,
        trigger,
        slippage_bps: (slippage_pct * 100.0) as u16,
        priority_fee_mode: crate::domain::orders::PriorityFeeMode::Ultra,
        use_mev_bundle: true,
        max_attempts: retries,
    }
}
