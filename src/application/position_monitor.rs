//! Position monitor: the TP/SL/trailing price-trigger loop.
//!
//! One global ticker scans registered positions in bounded batches.
//! Prices come from the cached provider; the first satisfied trigger
//! hands the position to the exit executor. A per-monitor breaker
//! pauses the loop after consecutive failing ticks.

use futures::future::join_all;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::exit_executor::ExitExecutor;
use crate::domain::errors::SniperError;
use crate::domain::orders::PriorityFeeMode;
use crate::domain::ports::PriceProvider;
use crate::domain::positions::{evaluate_price_triggers, ExitRequest, PositionStatus};
use crate::domain::repositories::PositionRepository;
use crate::infrastructure::core::{CircuitBreaker, CircuitBreakerConfig};

#[derive(Debug, Clone)]
pub struct PositionMonitorConfig {
    pub interval: Duration,
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub exit_slippage_bps: u16,
    pub exit_priority_fee_mode: PriorityFeeMode,
    pub use_mev_for_exits: bool,
    pub max_exit_attempts: u32,
}

impl Default for PositionMonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(5_000),
            batch_size: 10,
            batch_delay: Duration::from_millis(1_000),
            exit_slippage_bps: 100,
            exit_priority_fee_mode: PriorityFeeMode::Medium,
            use_mev_for_exits: false,
            max_exit_attempts: 3,
        }
    }
}

pub struct PositionMonitor {
    positions: Arc<dyn PositionRepository>,
    prices: Arc<dyn PriceProvider>,
    exit_executor: Arc<ExitExecutor>,
    config: PositionMonitorConfig,
    registered: Arc<RwLock<HashSet<Uuid>>>,
    breaker: Arc<CircuitBreaker>,
    stopped: Arc<AtomicBool>,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl PositionMonitor {
    pub fn new(
        positions: Arc<dyn PositionRepository>,
        prices: Arc<dyn PriceProvider>,
        exit_executor: Arc<ExitExecutor>,
        config: PositionMonitorConfig,
    ) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(
            "position_monitor",
            CircuitBreakerConfig {
                failure_threshold: 5,
                success_threshold: 2,
                timeout: Duration::from_secs(60),
                monitoring_period: Duration::from_secs(120),
            },
        ));
        Self {
            positions,
            prices,
            exit_executor,
            config,
            registered: Arc::new(RwLock::new(HashSet::new())),
            breaker,
            stopped: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        }
    }

    pub async fn register(&self, position_id: Uuid) {
        self.registered.write().await.insert(position_id);
        debug!("position monitor: watching {position_id}");
    }

    pub async fn unregister(&self, position_id: Uuid) {
        self.registered.write().await.remove(&position_id);
    }

    pub async fn watched(&self) -> usize {
        self.registered.read().await.len()
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
                        debug!("position monitor paused by breaker");
                    }
                    Err(e) => warn!("position monitor tick failed: {e}"),
                }
            }
            info!("position monitor stopped");
        });
        *self.task.lock().await = Some(handle);
    }

    pub async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
        }
    }

    /// One scan over the registered set, in batches. In-flight checks
    /// are idempotent; cancellation lets them finish.
    pub async fn run_tick(&self) -> Result<(), SniperError> {
        let ids: Vec<Uuid> = self.registered.read().await.iter().copied().collect();
        if ids.is_empty() {
            return Ok(());
        }

        let mut failures = 0usize;
        for batch in ids.chunks(self.config.batch_size.max(1)) {
            let checks = batch.iter().map(|id| self.check_position(*id));
            for (id, outcome) in batch.iter().zip(join_all(checks).await) {
                if let Err(e) = outcome {
                    match e {
                        // Someone else is already exiting: not a fault.
                        SniperError::ExitInFlight(_) => {}
                        other => {
                            warn!("position check {id} failed: {other}");
                            failures += 1;
                        }
                    }
                }
            }
            if batch.len() == self.config.batch_size {
                tokio::time::sleep(self.config.batch_delay).await;
            }
        }

        if failures > 0 && failures == ids.len() {
            return Err(SniperError::Unknown(format!(
                "all {failures} position checks failed this tick"
            )));
        }
        Ok(())
    }

    async fn check_position(&self, id: Uuid) -> Result<(), SniperError> {
        let Some(mut position) = self.positions.get(id).await? else {
            self.unregister(id).await;
            return Ok(());
        };
        if position.status != PositionStatus::Open {
            self.unregister(id).await;
            return Ok(());
        }

        let point = self.prices.get_price(&position.token_mint).await?;
        let entry = position.entry_price();

        let highest = position
            .highest_price_seen
            .unwrap_or(entry)
            .max(point.price);
        if position.highest_price_seen != Some(highest) {
            position.highest_price_seen = Some(highest);
            position.updated_at = chrono::Utc::now();
            self.positions.update(&position).await?;
        }

        let Some(trigger) = evaluate_price_triggers(
            entry,
            point.price,
            highest,
            position.take_profit_pct,
            position.stop_loss_pct,
            position.trailing_stop_pct,
        ) else {
            return Ok(());
        };

        info!(
            "position {}: trigger {} at price {:.9} (entry {:.9})",
            id,
            trigger.label(),
            point.price,
            entry
        );

        let request = ExitRequest {
            position_id: id,
            trigger,
            slippage_bps: self.config.exit_slippage_bps,
            priority_fee_mode: self.config.exit_priority_fee_mode,
            use_mev_bundle: self.config.use_mev_for_exits,
            max_attempts: self.config.max_exit_attempts,
        };
        self.exit_executor.execute(request).await?;
        self.unregister(id).await;
        Ok(())
    }
}
