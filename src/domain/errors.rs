use thiserror::Error;
use uuid::Uuid;

use crate::domain::filters::Violation;
use crate::domain::orders::OrderState;

/// Coarse error classes driving retry and surfacing decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input from the caller. Never retried.
    Validation,
    /// A policy said no (filters, route, balance). Terminates the order.
    Policy,
    /// Network-ish failure that may succeed on retry.
    Transient,
    /// A circuit breaker short-circuited the call. Never retried.
    Circuit,
    /// Internal inconsistency. Logged, surfaced as unknown.
    Structural,
}

/// Errors produced by the sniping pipeline and its collaborators.
#[derive(Debug, Error)]
pub enum SniperError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("rejected by filters: {} violation(s)", .0.len())]
    FilterRejected(Vec<Violation>),

    #[error("no swap route for mint {mint}")]
    NoRoute { mint: String },

    #[error("insufficient balance: need {need} lamports, have {available}")]
    InsufficientBalance { need: u64, available: u64 },

    #[error("network error: {0}")]
    Network(String),

    #[error("timed out after {0}ms")]
    Timeout(u64),

    #[error("quote failed: {0}")]
    QuoteFailed(String),

    #[error("circuit breaker [{operation}] is open")]
    CircuitOpen { operation: String },

    #[error("retries exhausted after {attempts} attempt(s): {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },

    #[error("not enough fee samples: got {got}, need {need}")]
    InsufficientSamples { got: usize, need: usize },

    #[error("order {0} not found")]
    OrderNotFound(Uuid),

    #[error("position {0} not found")]
    PositionNotFound(Uuid),

    #[error("order {id}: illegal transition {from} -> {to}")]
    InvalidTransition {
        id: Uuid,
        from: OrderState,
        to: OrderState,
    },

    #[error("order {0} is claimed by another pipeline")]
    OrderClaimed(Uuid),

    #[error("exit already in flight for position {0}")]
    ExitInFlight(Uuid),

    #[error("store error: {0}")]
    Store(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl SniperError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SniperError::Validation(_) | SniperError::InsufficientSamples { .. } => {
                ErrorKind::Validation
            }
            SniperError::FilterRejected(_)
            | SniperError::NoRoute { .. }
            | SniperError::InsufficientBalance { .. } => ErrorKind::Policy,
            SniperError::Network(_)
            | SniperError::Timeout(_)
            | SniperError::QuoteFailed(_)
            | SniperError::MaxRetriesExceeded { .. } => ErrorKind::Transient,
            SniperError::CircuitOpen { .. } => ErrorKind::Circuit,
            SniperError::OrderNotFound(_)
            | SniperError::PositionNotFound(_)
            | SniperError::InvalidTransition { .. }
            | SniperError::OrderClaimed(_)
            | SniperError::ExitInFlight(_)
            | SniperError::Store(_)
            | SniperError::Unknown(_) => ErrorKind::Structural,
        }
    }

    /// Whether the retry loop is allowed to attempt this call again.
    /// `MaxRetriesExceeded` is transient by class but already exhausted.
    pub fn is_retryable(&self) -> bool {
        match self {
            SniperError::MaxRetriesExceeded { .. } => false,
            other => other.kind() == ErrorKind::Transient,
        }
    }

    /// Stable marker for structural failures surfaced to the user.
    pub fn user_code(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::Policy => match self {
                SniperError::FilterRejected(_) => "FILTER_REJECTED",
                SniperError::NoRoute { .. } => "NO_ROUTE",
                _ => "INSUFFICIENT_BALANCE",
            },
            ErrorKind::Transient => "MAX_RETRIES_EXCEEDED",
            ErrorKind::Circuit => "CIRCUIT_OPEN",
            ErrorKind::Structural => "UNKNOWN",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_errors_are_not_retryable() {
        assert!(!SniperError::FilterRejected(vec![]).is_retryable());
        assert!(!SniperError::NoRoute {
            mint: "abc".into()
        }
        .is_retryable());
        assert!(!SniperError::InsufficientBalance {
            need: 10,
            available: 1
        }
        .is_retryable());
    }

    #[test]
    fn test_transient_errors_are_retryable() {
        assert!(SniperError::Network("reset".into()).is_retryable());
        assert!(SniperError::Timeout(30_000).is_retryable());
        assert!(SniperError::QuoteFailed("502".into()).is_retryable());
    }

    #[test]
    fn test_circuit_open_is_never_retryable() {
        let err = SniperError::CircuitOpen {
            operation: "submit".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Circuit);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_exhausted_retries_stop_retrying() {
        let err = SniperError::MaxRetriesExceeded {
            attempts: 3,
            last_error: "timeout".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Transient);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_user_codes_are_stable() {
        assert_eq!(
            SniperError::FilterRejected(vec![]).user_code(),
            "FILTER_REJECTED"
        );
        assert_eq!(
            SniperError::CircuitOpen {
                operation: "read".into()
            }
            .user_code(),
            "CIRCUIT_OPEN"
        );
        assert_eq!(SniperError::Store("locked".into()).user_code(), "UNKNOWN");
    }
}
