use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::domain::errors::SniperError;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,   // Normal operation - requests pass through
    Open,     // Failure threshold breached - reject all requests
    HalfOpen, // Testing if service recovered - allow limited requests
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    /// Failures within `monitoring_period` before opening.
    pub failure_threshold: usize,
    /// Consecutive successes in HalfOpen before closing.
    pub success_threshold: usize,
    /// How long an open circuit rejects before probing.
    pub timeout: Duration,
    /// Window over which failures are counted while closed.
    pub monitoring_period: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_secs(60),
            monitoring_period: Duration::from_secs(120),
        }
    }
}

/// Circuit breaker for protecting against cascading failures
pub struct CircuitBreaker {
    state: Arc<RwLock<BreakerState>>,
    config: CircuitBreakerConfig,
    name: String,
}

struct BreakerState {
    state: CircuitState,
    failure_count: usize,
    success_count: usize,
    window_start: Option<Instant>,
    last_failure_time: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            state: Arc::new(RwLock::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                window_start: None,
                last_failure_time: None,
            })),
            config,
            name: name.into(),
        }
    }

    /// Execute a future with breaker protection. An open circuit
    /// rejects with `SniperError::CircuitOpen` without polling `f`.
    pub async fn call<F, T>(&self, f: F) -> Result<T, SniperError>
    where
        F: std::future::Future<Output = Result<T, SniperError>>,
    {
        {
            let mut state = self.state.write().await;

            if state.state == CircuitState::Open {
                let elapsed = state
                    .last_failure_time
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed > self.config.timeout {
                    info!(
                        "CircuitBreaker [{}]: Transitioning Open -> HalfOpen (timeout elapsed)",
                        self.name
                    );
                    state.state = CircuitState::HalfOpen;
                    state.success_count = 0;
                } else {
                    return Err(SniperError::CircuitOpen {
                        operation: self.name.clone(),
                    });
                }
            }
        }

        match f.await {
            Ok(result) => {
                self.on_success().await;
                Ok(result)
            }
            Err(e) => {
                self.on_failure().await;
                Err(e)
            }
        }
    }

    async fn on_success(&self) {
        let mut state = self.state.write().await;

        match state.state {
            CircuitState::HalfOpen => {
                state.success_count += 1;
                if state.success_count >= self.config.success_threshold {
                    info!(
                        "CircuitBreaker [{}]: Transitioning HalfOpen -> Closed ({} successes)",
                        self.name, state.success_count
                    );
                    state.state = CircuitState::Closed;
                    state.failure_count = 0;
                    state.success_count = 0;
                    state.window_start = None;
                }
            }
            CircuitState::Closed => {
                state.failure_count = 0;
                state.window_start = None;
            }
            CircuitState::Open => {
                warn!(
                    "CircuitBreaker [{}]: Success recorded in Open state (unexpected)",
                    self.name
                );
            }
        }
    }

    async fn on_failure(&self) {
        let mut state = self.state.write().await;

        state.last_failure_time = Some(Instant::now());

        match state.state {
            CircuitState::Closed => {
                // Failures only count within the monitoring window.
                let expired = state
                    .window_start
                    .is_some_and(|w| w.elapsed() > self.config.monitoring_period);
                if expired || state.window_start.is_none() {
                    state.window_start = Some(Instant::now());
                    state.failure_count = 0;
                }
                state.failure_count += 1;

                if state.failure_count >= self.config.failure_threshold {
                    error!(
                        "CircuitBreaker [{}]: Transitioning Closed -> Open ({} failures)",
                        self.name, state.failure_count
                    );
                    state.state = CircuitState::Open;
                }
            }
            CircuitState::HalfOpen => {
                warn!(
                    "CircuitBreaker [{}]: Transitioning HalfOpen -> Open (failure during recovery)",
                    self.name
                );
                state.state = CircuitState::Open;
                state.success_count = 0;
            }
            CircuitState::Open => {}
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.state.read().await.state
    }
}
