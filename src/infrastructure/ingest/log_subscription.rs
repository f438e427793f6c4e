//! Log-subscription ingest driver.
//!
//! Subscribes to program logs over the RPC websocket, one subscription
//! per DEX program. A batch whose logs carry the DEX's pool-init marker
//! triggers a full transaction fetch through the fabric, which is then
//! decoded by the shared account-index decoder.

use async_trait::async_trait;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use solana_sdk::signature::Signature;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::domain::errors::SniperError;
use crate::domain::events::{Dex, PoolCreated, SourceSignal};
use crate::domain::ports::PoolSource;
use crate::infrastructure::ingest::decoder::{
    decode_pool_transaction, init_log_marker, DexPrograms,
};
use crate::infrastructure::rpc::RpcFabric;

const PING_INTERVAL: Duration = Duration::from_secs(30);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

pub struct LogSubscriptionSource {
    ws_url: String,
    programs: DexPrograms,
    fabric: Arc<RpcFabric>,
    stopped: Arc<AtomicBool>,
    tasks: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl LogSubscriptionSource {
    pub fn new(ws_url: impl Into<String>, programs: DexPrograms, fabric: Arc<RpcFabric>) -> Self {
        Self {
            ws_url: ws_url.into(),
            programs,
            fabric,
            stopped: Arc::new(AtomicBool::new(false)),
            tasks: Mutex::new(Vec::new()),
        }
    }

    async fn run_program(
        ws_url: String,
        dex: Dex,
        program: solana_sdk::pubkey::Pubkey,
        programs: DexPrograms,
        fabric: Arc<RpcFabric>,
        stopped: Arc<AtomicBool>,
        events: mpsc::Sender<PoolCreated>,
        signals: mpsc::Sender<SourceSignal>,
    ) {
        let mut backoff = Duration::from_secs(1);

        while !stopped.load(Ordering::SeqCst) {
            match Self::subscribe_and_stream(
                &ws_url, dex, &program, &programs, &fabric, &stopped, &events, &signals,
            )
            .await
            {
                Ok(()) => {
                    backoff = Duration::from_secs(1);
                }
                Err(e) => {
                    warn!("log subscription [{dex}]: {e}, reconnecting in {backoff:?}");
                    let _ = signals
                        .send(SourceSignal::Disconnected {
                            reason: e.to_string(),
                        })
                        .await;
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn subscribe_and_stream(
        ws_url: &str,
        dex: Dex,
        program: &solana_sdk::pubkey::Pubkey,
        programs: &DexPrograms,
        fabric: &Arc<RpcFabric>,
        stopped: &Arc<AtomicBool>,
        events: &mpsc::Sender<PoolCreated>,
        signals: &mpsc::Sender<SourceSignal>,
    ) -> Result<(), SniperError> {
        let (ws, _) = connect_async(ws_url)
            .await
            .map_err(|e| SniperError::Network(format!("logs connect: {e}")))?;
        let (mut write, mut read) = ws.split();

        let subscribe = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "logsSubscribe",
            "params": [
                { "mentions": [program.to_string()] },
                { "commitment": "confirmed" }
            ]
        });
        write
            .send(Message::Text(subscribe.to_string()))
            .await
            .map_err(|e| SniperError::Network(format!("logs subscribe: {e}")))?;

        info!("log subscription [{dex}] established");
        let _ = signals.send(SourceSignal::Connected).await;

        let mut ping = tokio::time::interval(PING_INTERVAL);
        ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            if stopped.load(Ordering::SeqCst) {
                return Ok(());
            }
            tokio::select! {
                _ = ping.tick() => {
                    write
                        .send(Message::Ping(Vec::new()))
                        .await
                        .map_err(|e| SniperError::Network(format!("logs ping: {e}")))?;
                }
                frame = read.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(signature) = Self::match_notification(&text, dex) {
                                Self::fetch_and_emit(
                                    dex, signature, programs, fabric, events,
                                )
                                .await;
                            }
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            let _ = write.send(Message::Pong(payload)).await;
                        }
                        Some(Ok(Message::Close(_))) | None => return Ok(()),
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            return Err(SniperError::Network(format!("logs read: {e}")));
                        }
                    }
                }
            }
        }
    }

    /// Extract the signature of a notification whose logs carry the
    /// DEX's pool-init marker.
    fn match_notification(text: &str, dex: Dex) -> Option<Signature> {
        let value: Value = serde_json::from_str(text).ok()?;
        if value.get("method")?.as_str()? != "logsNotification" {
            return None;
        }
        let result = value.get("params")?.get("result")?.get("value")?;

        // Failed transactions cannot have created a pool.
        if !result.get("err")?.is_null() {
            return None;
        }

        let marker = init_log_marker(dex);
        let logs = result.get("logs")?.as_array()?;
        let hit = logs
            .iter()
            .filter_map(|l| l.as_str())
            .any(|l| l.contains(marker));
        if !hit {
            return None;
        }
        Signature::from_str(result.get("signature")?.as_str()?).ok()
    }

    async fn fetch_and_emit(
        dex: Dex,
        signature: Signature,
        programs: &DexPrograms,
        fabric: &Arc<RpcFabric>,
        events: &mpsc::Sender<PoolCreated>,
    ) {
        let tx = match fabric.get_transaction(&signature).await {
            Ok(tx) => tx,
            Err(SniperError::CircuitOpen { operation }) => {
                // Degraded mode: skip this transaction, keep streaming.
                warn!("log subscription [{dex}]: {operation} circuit open, skipping {signature}");
                return;
            }
            Err(e) => {
                debug!("log subscription [{dex}]: fetch {signature} failed: {e}");
                return;
            }
        };

        let Some(decoded) = decode_pool_transaction(&tx, programs) else {
            debug!("log subscription [{dex}]: {signature} carries no pool-init instruction");
            return;
        };

        let _ = events
            .send(PoolCreated {
                signature,
                slot: tx.slot,
                timestamp: Utc::now(),
                dex: decoded.dex,
                pool_address: decoded.pool_address,
                base_mint: decoded.base_mint,
                quote_mint: decoded.quote_mint,
                initial_liquidity: decoded.initial_liquidity,
                creator: decoded.creator,
                anti_sniper: None,
            })
            .await;
    }
}

#[async_trait]
impl PoolSource for LogSubscriptionSource {
    fn name(&self) -> &str {
        "log_subscription"
    }

    async fn start(
        &self,
        events: mpsc::Sender<PoolCreated>,
        signals: mpsc::Sender<SourceSignal>,
    ) -> Result<(), SniperError> {
        self.stopped.store(false, Ordering::SeqCst);
        let mut tasks = self.tasks.lock().await;
        for (dex, program) in self.programs.all() {
            tasks.push(tokio::spawn(Self::run_program(
                self.ws_url.clone(),
                dex,
                program,
                self.programs.clone(),
                Arc::clone(&self.fabric),
                Arc::clone(&self.stopped),
                events.clone(),
                signals.clone(),
            )));
        }
        Ok(())
    }

    async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
    }
}
