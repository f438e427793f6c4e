use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use std::fmt;
use uuid::Uuid;

use crate::domain::errors::SniperError;

/// Requested aggressiveness of the priority fee. Ordered: a later mode
/// never pays less than an earlier one for the same market.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum PriorityFeeMode {
    None,
    Low,
    Medium,
    High,
    Turbo,
    Ultra,
}

impl PriorityFeeMode {
    pub const ALL: [PriorityFeeMode; 6] = [
        PriorityFeeMode::None,
        PriorityFeeMode::Low,
        PriorityFeeMode::Medium,
        PriorityFeeMode::High,
        PriorityFeeMode::Turbo,
        PriorityFeeMode::Ultra,
    ];
}

impl fmt::Display for PriorityFeeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PriorityFeeMode::None => "NONE",
            PriorityFeeMode::Low => "LOW",
            PriorityFeeMode::Medium => "MEDIUM",
            PriorityFeeMode::High => "HIGH",
            PriorityFeeMode::Turbo => "TURBO",
            PriorityFeeMode::Ultra => "ULTRA",
        };
        write!(f, "{s}")
    }
}

/// Order lifecycle. Transitions form a DAG: each state may advance to
/// the next pipeline stage or drop to `Failed`; terminal states have no
/// outgoing edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderState {
    Pending,
    Validated,
    Simulating,
    Signing,
    Broadcasting,
    Confirming,
    Confirmed,
    Failed,
}

impl OrderState {
    /// The single forward edge out of this state, if any.
    fn next(&self) -> Option<OrderState> {
        match self {
            OrderState::Pending => Some(OrderState::Validated),
            OrderState::Validated => Some(OrderState::Simulating),
            OrderState::Simulating => Some(OrderState::Signing),
            OrderState::Signing => Some(OrderState::Broadcasting),
            OrderState::Broadcasting => Some(OrderState::Confirming),
            OrderState::Confirming => Some(OrderState::Confirmed),
            OrderState::Confirmed | OrderState::Failed => None,
        }
    }

    pub fn can_transition(&self, to: OrderState) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == OrderState::Failed || self.next() == Some(to)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderState::Confirmed | OrderState::Failed)
    }

    /// Cancellation is only supported before the transaction is on the
    /// wire; from `Broadcasting` on, the chain owns the outcome.
    pub fn is_cancellable(&self) -> bool {
        matches!(
            self,
            OrderState::Pending
                | OrderState::Validated
                | OrderState::Simulating
                | OrderState::Signing
        )
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderState::Pending => "PENDING",
            OrderState::Validated => "VALIDATED",
            OrderState::Simulating => "SIMULATING",
            OrderState::Signing => "SIGNING",
            OrderState::Broadcasting => "BROADCASTING",
            OrderState::Confirming => "CONFIRMING",
            OrderState::Confirmed => "CONFIRMED",
            OrderState::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

/// Immutable parameters of a buy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderConfig {
    pub token_mint: Pubkey,
    /// Input amount in base units of the quote mint.
    pub amount_in: u64,
    pub slippage_bps: u16,
    pub priority_fee_mode: PriorityFeeMode,
    pub use_mev_bundle: bool,
    pub max_retries: u32,
    pub timeout_ms: u64,
    pub take_profit_pct: Option<f64>,
    pub stop_loss_pct: Option<f64>,
}

impl OrderConfig {
    pub fn new(token_mint: Pubkey, amount_in: u64) -> Self {
        Self {
            token_mint,
            amount_in,
            slippage_bps: 100,
            priority_fee_mode: PriorityFeeMode::Medium,
            use_mev_bundle: false,
            max_retries: 3,
            timeout_ms: 30_000,
            take_profit_pct: None,
            stop_loss_pct: None,
        }
    }
}

/// Fill details persisted when an order confirms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderFill {
    pub signature: Signature,
    pub slot: u64,
    pub amount_in: u64,
    pub amount_out: u64,
    pub price_impact_pct: f64,
    pub execution_time_ms: u64,
}

/// A single buy, driven from creation to confirmation by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: String,
    pub config: OrderConfig,
    pub state: OrderState,
    pub retry_count: u32,
    pub fill: Option<OrderFill>,
    pub failure: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(user_id: impl Into<String>, config: OrderConfig) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            config,
            state: OrderState::Pending,
            retry_count: 0,
            fill: None,
            failure: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Advance the state machine. An illegal edge is a programmer
    /// error surfaced as a structural fault, never applied.
    pub fn transition(&mut self, to: OrderState) -> Result<(), SniperError> {
        if !self.state.can_transition(to) {
            return Err(SniperError::InvalidTransition {
                id: self.id,
                from: self.state,
                to,
            });
        }
        self.state = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), SniperError> {
        self.failure = Some(reason.into());
        self.transition(OrderState::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> Order {
        Order::new("user-1", OrderConfig::new(Pubkey::new_unique(), 1_000_000))
    }

    #[test]
    fn test_happy_path_walks_the_dag() {
        let mut o = order();
        for state in [
            OrderState::Validated,
            OrderState::Simulating,
            OrderState::Signing,
            OrderState::Broadcasting,
            OrderState::Confirming,
            OrderState::Confirmed,
        ] {
            o.transition(state).expect("legal edge");
        }
        assert_eq!(o.state, OrderState::Confirmed);
        assert!(o.state.is_terminal());
    }

    #[test]
    fn test_every_live_state_may_fail() {
        for from in [
            OrderState::Pending,
            OrderState::Validated,
            OrderState::Simulating,
            OrderState::Signing,
            OrderState::Broadcasting,
            OrderState::Confirming,
        ] {
            assert!(from.can_transition(OrderState::Failed), "{from} -> FAILED");
        }
    }

    #[test]
    fn test_no_skipping_stages() {
        assert!(!OrderState::Pending.can_transition(OrderState::Simulating));
        assert!(!OrderState::Pending.can_transition(OrderState::Confirmed));
        assert!(!OrderState::Validated.can_transition(OrderState::Broadcasting));
    }

    #[test]
    fn test_no_backward_edges() {
        assert!(!OrderState::Signing.can_transition(OrderState::Validated));
        assert!(!OrderState::Confirming.can_transition(OrderState::Pending));
    }

    #[test]
    fn test_terminal_states_are_sinks() {
        for to in [
            OrderState::Pending,
            OrderState::Validated,
            OrderState::Failed,
        ] {
            assert!(!OrderState::Confirmed.can_transition(to));
            assert!(!OrderState::Failed.can_transition(to));
        }
    }

    #[test]
    fn test_illegal_transition_is_rejected_and_not_applied() {
        let mut o = order();
        let err = o.transition(OrderState::Confirming).unwrap_err();
        assert!(matches!(err, SniperError::InvalidTransition { .. }));
        assert_eq!(o.state, OrderState::Pending);
    }

    #[test]
    fn test_cancellable_only_before_broadcast() {
        assert!(OrderState::Pending.is_cancellable());
        assert!(OrderState::Signing.is_cancellable());
        assert!(!OrderState::Broadcasting.is_cancellable());
        assert!(!OrderState::Confirming.is_cancellable());
        assert!(!OrderState::Confirmed.is_cancellable());
    }

    #[test]
    fn test_priority_fee_modes_are_ordered() {
        let modes = PriorityFeeMode::ALL;
        for pair in modes.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }
}
