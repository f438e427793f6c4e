use anyhow::Result;
use std::env;
use std::time::Duration;

use crate::application::position_monitor::PositionMonitorConfig;
use crate::application::rug_monitor::RugMonitorConfig;
use crate::domain::orders::PriorityFeeMode;
use crate::domain::rug::RugThresholds;

fn parse_env<T: std::str::FromStr>(name: &str, default: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<T>()
        .map_err(|e| anyhow::anyhow!("Failed to parse {name}={raw}: {e}"))
}

fn parse_fee_mode(name: &str, default: &str) -> Result<PriorityFeeMode> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    match raw.to_uppercase().as_str() {
        "NONE" => Ok(PriorityFeeMode::None),
        "LOW" => Ok(PriorityFeeMode::Low),
        "MEDIUM" => Ok(PriorityFeeMode::Medium),
        "HIGH" => Ok(PriorityFeeMode::High),
        "TURBO" => Ok(PriorityFeeMode::Turbo),
        "ULTRA" => Ok(PriorityFeeMode::Ultra),
        other => anyhow::bail!("Invalid {name}: {other}"),
    }
}

/// Settings for both surveillance loops.
#[derive(Debug, Clone)]
pub struct MonitorEnvConfig {
    pub position: PositionMonitorConfig,
    pub rug: RugMonitorConfig,
}

impl MonitorEnvConfig {
    pub fn from_env() -> Result<Self> {
        let position = PositionMonitorConfig {
            interval: Duration::from_millis(parse_env("POSITION_MONITOR_INTERVAL_MS", "5000")?),
            batch_size: parse_env("POSITION_MONITOR_BATCH_SIZE", "10")?,
            batch_delay: Duration::from_millis(parse_env(
                "POSITION_MONITOR_BATCH_DELAY_MS",
                "1000",
            )?),
            exit_slippage_bps: parse_env("EXIT_SLIPPAGE_BPS", "100")?,
            exit_priority_fee_mode: parse_fee_mode("EXIT_PRIORITY_FEE_MODE", "MEDIUM")?,
            use_mev_for_exits: parse_env("EXIT_USE_MEV", "false")?,
            max_exit_attempts: parse_env("MAX_EXIT_ATTEMPTS", "3")?,
        };

        // Drop/dump thresholds arrive signed in the environment; the
        // detector works with magnitudes.
        let liq_drop: f64 = parse_env("RUG_LIQ_DROP_PCT", "-50")?;
        let supply_up: f64 = parse_env("RUG_SUPPLY_UP_PCT", "10")?;
        let holder_dump: f64 = parse_env("RUG_HOLDER_DUMP_PCT", "-30")?;

        let rug = RugMonitorConfig {
            interval: Duration::from_millis(parse_env("RUG_MONITOR_INTERVAL_MS", "5000")?),
            thresholds: RugThresholds {
                liquidity_drop_pct: liq_drop.abs(),
                supply_increase_pct: supply_up.abs(),
                holder_dump_pct: holder_dump.abs(),
            },
            top_holders_n: parse_env("TOP_HOLDERS_N", "10")?,
            auto_exit_enabled: parse_env("RUG_AUTO_EXIT", "true")?,
            emergency_slippage_pct: parse_env("EMERGENCY_EXIT_SLIPPAGE_PCT", "25")?,
            emergency_retries: parse_env("EMERGENCY_EXIT_RETRIES", "5")?,
        };

        Ok(Self { position, rug })
    }
}

/// Circuit breaker settings shared by the fabric and monitors.
#[derive(Debug, Clone, Copy)]
pub struct BreakerEnvConfig {
    pub failure_threshold: usize,
    pub success_threshold: usize,
    pub timeout_ms: u64,
    pub monitoring_period_ms: u64,
}

impl BreakerEnvConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            failure_threshold: parse_env("FAILURE_THRESHOLD", "5")?,
            success_threshold: parse_env("SUCCESS_THRESHOLD", "2")?,
            timeout_ms: parse_env("TIMEOUT_MS", "60000")?,
            monitoring_period_ms: parse_env("MONITORING_PERIOD_MS", "120000")?,
        })
    }

    pub fn as_breaker_config(&self) -> crate::infrastructure::core::CircuitBreakerConfig {
        crate::infrastructure::core::CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            success_threshold: self.success_threshold,
            timeout: Duration::from_millis(self.timeout_ms),
            monitoring_period: Duration::from_millis(self.monitoring_period_ms),
        }
    }
}
