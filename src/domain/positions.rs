use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use std::fmt;
use uuid::Uuid;

use crate::domain::orders::PriorityFeeMode;
use crate::domain::rug::RugDetection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionStatus {
    Open,
    Exiting,
    Closed,
    Failed,
}

impl PositionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PositionStatus::Closed | PositionStatus::Failed)
    }
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PositionStatus::Open => "OPEN",
            PositionStatus::Exiting => "EXITING",
            PositionStatus::Closed => "CLOSED",
            PositionStatus::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

/// What fired the exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitTrigger {
    TakeProfit { entry: f64, current: f64 },
    StopLoss { entry: f64, current: f64 },
    TrailingStop { highest: f64, current: f64 },
    RugEmergency { detection: RugDetection },
}

impl ExitTrigger {
    pub fn label(&self) -> &'static str {
        match self {
            ExitTrigger::TakeProfit { .. } => "TAKE_PROFIT",
            ExitTrigger::StopLoss { .. } => "STOP_LOSS",
            ExitTrigger::TrailingStop { .. } => "TRAILING_STOP",
            ExitTrigger::RugEmergency { .. } => "RUG_EMERGENCY",
        }
    }
}

/// A confirmed buy being watched for exits. At most one per order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub order_id: Uuid,
    pub user_id: String,
    pub token_mint: Pubkey,
    /// Wallet that holds the tokens; exits sign with its keypair.
    pub wallet: Pubkey,
    pub entry_signature: Signature,
    /// Quote-mint base units spent.
    pub amount_in: u64,
    /// Token base units received.
    pub amount_out: u64,
    pub entry_price_impact_pct: f64,
    pub current_balance: u64,
    pub take_profit_pct: Option<f64>,
    pub stop_loss_pct: Option<f64>,
    pub trailing_stop_pct: Option<f64>,
    pub highest_price_seen: Option<f64>,
    pub status: PositionStatus,
    pub exit_signature: Option<Signature>,
    /// Realized profit in quote base units, negative for a loss.
    pub realized_pnl: Option<i64>,
    pub opened_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    /// Entry price in quote base units per token base unit.
    pub fn entry_price(&self) -> f64 {
        if self.amount_out == 0 {
            return 0.0;
        }
        self.amount_in as f64 / self.amount_out as f64
    }

    pub fn wants_price_monitoring(&self) -> bool {
        self.take_profit_pct.is_some()
            || self.stop_loss_pct.is_some()
            || self.trailing_stop_pct.is_some()
    }
}

/// Exit request handed to the executor by a monitor.
#[derive(Debug, Clone)]
pub struct ExitRequest {
    pub position_id: Uuid,
    pub trigger: ExitTrigger,
    pub slippage_bps: u16,
    pub priority_fee_mode: PriorityFeeMode,
    pub use_mev_bundle: bool,
    pub max_attempts: u32,
}

/// Outcome of a completed (or exhausted) exit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitResult {
    pub position_id: Uuid,
    pub trigger_label: String,
    pub signature: Option<Signature>,
    /// Quote base units recovered by the sell.
    pub amount_out: u64,
    pub realized_pnl: i64,
    /// `amount_out * 100 / amount_in`; above 100 means a profit.
    pub position_saved_pct: f64,
    pub attempts: u32,
    pub execution_time_ms: u64,
}

/// Evaluate the price triggers in their fixed order: take-profit,
/// stop-loss, then trailing stop. First hit wins. Pure.
pub fn evaluate_price_triggers(
    entry: f64,
    current: f64,
    highest: f64,
    take_profit_pct: Option<f64>,
    stop_loss_pct: Option<f64>,
    trailing_stop_pct: Option<f64>,
) -> Option<ExitTrigger> {
    if !entry.is_finite() || !current.is_finite() || entry <= 0.0 || current <= 0.0 {
        return None;
    }

    if let Some(tp) = take_profit_pct {
        if current >= entry * (1.0 + tp / 100.0) {
            return Some(ExitTrigger::TakeProfit { entry, current });
        }
    }
    if let Some(sl) = stop_loss_pct {
        if current <= entry * (1.0 - sl / 100.0) {
            return Some(ExitTrigger::StopLoss { entry, current });
        }
    }
    if let Some(trail) = trailing_stop_pct {
        if highest > 0.0 && current <= highest * (1.0 - trail / 100.0) {
            return Some(ExitTrigger::TrailingStop { highest, current });
        }
    }
    None
}
