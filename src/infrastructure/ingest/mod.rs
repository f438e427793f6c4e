//! Pool ingest: interchangeable event drivers behind one service.
//!
//! Exactly one driver is active at a time, selected by configuration.
//! The service owns cross-source deduplication, Meteora anti-sniper
//! enrichment and per-source statistics.

pub mod decoder;
pub mod dedup;
pub mod log_subscription;
pub mod meteora;
pub mod push_stream;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

use crate::domain::errors::SniperError;
use crate::domain::events::{Dex, PoolCreated, SourceSignal};
use crate::domain::ports::PoolSource;
use crate::infrastructure::ingest::dedup::DedupWindow;
use crate::infrastructure::rpc::RpcFabric;

pub const DEDUP_WINDOW: Duration = Duration::from_secs(5);

/// Running counters for the active source.
#[derive(Default)]
pub struct IngestStats {
    pub events_emitted: AtomicU64,
    pub dedup_hits: AtomicU64,
    pub reconnects: AtomicU64,
    pub stream_errors: AtomicU64,
}

impl IngestStats {
    pub fn snapshot(&self) -> (u64, u64, u64, u64) {
        (
            self.events_emitted.load(Ordering::Relaxed),
            self.dedup_hits.load(Ordering::Relaxed),
            self.reconnects.load(Ordering::Relaxed),
            self.stream_errors.load(Ordering::Relaxed),
        )
    }
}

pub struct IngestService {
    source: Arc<dyn PoolSource>,
    fabric: Arc<RpcFabric>,
    dedup: Arc<DedupWindow>,
    stats: Arc<IngestStats>,
    tasks: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl IngestService {
    pub fn new(source: Arc<dyn PoolSource>, fabric: Arc<RpcFabric>) -> Self {
        Self {
            source,
            fabric,
            dedup: Arc::new(DedupWindow::new(DEDUP_WINDOW)),
            stats: Arc::new(IngestStats::default()),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn stats(&self) -> Arc<IngestStats> {
        Arc::clone(&self.stats)
    }

    /// Start the driver and forward deduplicated, enriched events into
    /// `output`.
    pub async fn start(&self, output: mpsc::Sender<PoolCreated>) -> Result<(), SniperError> {
        let (event_tx, mut event_rx) = mpsc::channel::<PoolCreated>(1_024);
        let (signal_tx, mut signal_rx) = mpsc::channel::<SourceSignal>(64);

        self.source.start(event_tx, signal_tx).await?;
        info!("ingest source [{}] started", self.source.name());

        let dedup = Arc::clone(&self.dedup);
        let stats = Arc::clone(&self.stats);
        let fabric = Arc::clone(&self.fabric);
        let forward = tokio::spawn(async move {
            while let Some(mut event) = event_rx.recv().await {
                if !dedup.first_sighting(event.dex, event.pool_address).await {
                    stats.dedup_hits.fetch_add(1, Ordering::Relaxed);
                    continue;
                }

                if event.dex == Dex::Meteora && event.anti_sniper.is_none() {
                    event.anti_sniper = Some(
                        meteora::fetch_anti_sniper_config(&fabric, &event.pool_address).await,
                    );
                }

                stats.events_emitted.fetch_add(1, Ordering::Relaxed);
                if output.send(event).await.is_err() {
                    break;
                }
            }
        });

        let stats = Arc::clone(&self.stats);
        let source_name = self.source.name().to_string();
        let signal_task = tokio::spawn(async move {
            while let Some(signal) = signal_rx.recv().await {
                match signal {
                    SourceSignal::Connected => {
                        info!("ingest [{source_name}] connected");
                    }
                    SourceSignal::Disconnected { reason } => {
                        stats.reconnects.fetch_add(1, Ordering::Relaxed);
                        warn!("ingest [{source_name}] disconnected: {reason}");
                    }
                    SourceSignal::Error { message } => {
                        stats.stream_errors.fetch_add(1, Ordering::Relaxed);
                        warn!("ingest [{source_name}] error: {message}");
                    }
                }
            }
        });

        let mut tasks = self.tasks.lock().await;
        tasks.push(forward);
        tasks.push(signal_task);
        Ok(())
    }

    pub async fn stop(&self) {
        self.source.stop().await;
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
        let (emitted, dupes, reconnects, errors) = self.stats.snapshot();
        info!(
            "ingest stopped: {emitted} emitted, {dupes} duplicates, \
             {reconnects} reconnects, {errors} errors"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::core::CircuitBreakerConfig;
    use crate::infrastructure::mock::{MockChainClient, MockPoolSource};
    use chrono::Utc;
    use solana_sdk::pubkey::Pubkey;
    use solana_sdk::signature::Signature;

    fn event(dex: Dex, pool: Pubkey) -> PoolCreated {
        PoolCreated {
            signature: Signature::default(),
            slot: 1,
            timestamp: Utc::now(),
            dex,
            pool_address: pool,
            base_mint: Pubkey::new_unique(),
            quote_mint: Pubkey::new_unique(),
            initial_liquidity: 0,
            creator: Pubkey::new_unique(),
            anti_sniper: None,
        }
    }

    #[tokio::test]
    async fn test_duplicates_within_window_collapse() {
        let source = Arc::new(MockPoolSource::new());
        let fabric = Arc::new(RpcFabric::new(
            Arc::new(MockChainClient::new()),
            CircuitBreakerConfig::default(),
        ));
        let service = IngestService::new(source.clone(), fabric);

        let (tx, mut rx) = mpsc::channel(16);
        service.start(tx).await.unwrap();

        let pool = Pubkey::new_unique();
        source.emit(event(Dex::AmmV4, pool)).await;
        source.emit(event(Dex::AmmV4, pool)).await;
        source.emit(event(Dex::Clmm, pool)).await;

        let first = rx.recv().await.unwrap();
        assert_eq!(first.dex, Dex::AmmV4);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.dex, Dex::Clmm);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let (emitted, dupes, _, _) = service.stats().snapshot();
        assert_eq!(emitted, 2);
        assert_eq!(dupes, 1);
        service.stop().await;
    }

    #[tokio::test]
    async fn test_meteora_events_gain_anti_sniper_defaults() {
        let source = Arc::new(MockPoolSource::new());
        // The mock chain has no lb_pair account, so enrichment falls
        // back to the conservative defaults.
        let fabric = Arc::new(RpcFabric::new(
            Arc::new(MockChainClient::new()),
            CircuitBreakerConfig::default(),
        ));
        let service = IngestService::new(source.clone(), fabric);

        let (tx, mut rx) = mpsc::channel(16);
        service.start(tx).await.unwrap();

        source.emit(event(Dex::Meteora, Pubkey::new_unique())).await;
        let enriched = rx.recv().await.unwrap();
        let anti_sniper = enriched.anti_sniper.expect("anti-sniper config");
        assert_eq!(
            anti_sniper.fee_scheduler.expect("scheduler").cliff_fee_bps,
            9_900
        );
        service.stop().await;
    }
}
