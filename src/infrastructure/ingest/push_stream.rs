//! Push-stream ingest driver.
//!
//! Opens a duplex websocket to a transaction push endpoint, subscribes
//! with a program-id filter and decodes every delivered transaction
//! locally. Liveness is kept with a 30-second ping; a dropped stream
//! reconnects with doubling backoff up to a fixed attempt budget.

use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::domain::errors::SniperError;
use crate::domain::events::{Dex, PoolCreated, SourceSignal};
use crate::domain::ports::{PoolSource, RawInstruction, RawTransaction};
use crate::infrastructure::ingest::decoder::{decode_pool_transaction, DexPrograms};

const PING_INTERVAL: Duration = Duration::from_secs(30);
const MAX_RECONNECT_ATTEMPTS: u32 = 10;
const MAX_BACKOFF: Duration = Duration::from_secs(512);

#[derive(Debug, Deserialize)]
struct PushFrame {
    #[serde(rename = "type")]
    kind: String,
    signature: Option<String>,
    slot: Option<u64>,
    transaction: Option<String>,
}

pub struct PushStreamSource {
    endpoint: String,
    token: String,
    programs: DexPrograms,
    stopped: Arc<AtomicBool>,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl PushStreamSource {
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>, programs: DexPrograms) -> Self {
        Self {
            endpoint: endpoint.into(),
            token: token.into(),
            programs,
            stopped: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        }
    }

    async fn run(
        endpoint: String,
        token: String,
        programs: DexPrograms,
        stopped: Arc<AtomicBool>,
        events: mpsc::Sender<PoolCreated>,
        signals: mpsc::Sender<SourceSignal>,
    ) {
        let mut attempt: u32 = 0;

        while !stopped.load(Ordering::SeqCst) {
            match Self::connect_and_stream(&endpoint, &token, &programs, &stopped, &events, &signals)
                .await
            {
                Ok(()) => {
                    // Graceful close; reconnect fresh.
                    attempt = 0;
                    let _ = signals
                        .send(SourceSignal::Disconnected {
                            reason: "stream closed".into(),
                        })
                        .await;
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= MAX_RECONNECT_ATTEMPTS {
                        error!("push stream: giving up after {attempt} attempts: {e}");
                        let _ = signals
                            .send(SourceSignal::Error {
                                message: format!("reconnect budget exhausted: {e}"),
                            })
                            .await;
                        return;
                    }
                    let backoff =
                        Duration::from_secs(1u64 << (attempt - 1).min(9)).min(MAX_BACKOFF);
                    warn!("push stream: error ({e}), reconnecting in {backoff:?}");
                    let _ = signals
                        .send(SourceSignal::Disconnected {
                            reason: e.to_string(),
                        })
                        .await;
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    async fn connect_and_stream(
        endpoint: &str,
        token: &str,
        programs: &DexPrograms,
        stopped: &Arc<AtomicBool>,
        events: &mpsc::Sender<PoolCreated>,
        signals: &mpsc::Sender<SourceSignal>,
    ) -> Result<(), SniperError> {
        let (ws, _) = connect_async(endpoint)
            .await
            .map_err(|e| SniperError::Network(format!("push connect: {e}")))?;
        let (mut write, mut read) = ws.split();

        let subscribe = json!({
            "op": "subscribe",
            "token": token,
            "programs": programs
                .all()
                .iter()
                .map(|(_, id)| id.to_string())
                .collect::<Vec<_>>(),
        });
        write
            .send(Message::Text(subscribe.to_string()))
            .await
            .map_err(|e| SniperError::Network(format!("push subscribe: {e}")))?;

        info!("push stream connected to {endpoint}");
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
                        .map_err(|e| SniperError::Network(format!("push ping: {e}")))?;
                }
                frame = read.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(event) = Self::parse_frame(&text, programs) {
                                if events.send(event).await.is_err() {
                                    return Ok(());
                                }
                            }
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            let _ = write.send(Message::Pong(payload)).await;
                        }
                        Some(Ok(Message::Close(_))) | None => return Ok(()),
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            return Err(SniperError::Network(format!("push read: {e}")));
                        }
                    }
                }
            }
        }
    }

    /// Parse one pushed frame into a pool event. Malformed frames and
    /// non-pool transactions are dropped, never retried.
    fn parse_frame(text: &str, programs: &DexPrograms) -> Option<PoolCreated> {
        let frame: PushFrame = match serde_json::from_str(text) {
            Ok(f) => f,
            Err(e) => {
                debug!("push stream: unparseable frame dropped: {e}");
                return None;
            }
        };
        if frame.kind != "transaction" {
            return None;
        }

        let signature = Signature::from_str(frame.signature.as_deref()?).ok()?;
        let slot = frame.slot.unwrap_or(0);
        let raw = frame.transaction?;

        let bytes = base64::engine::general_purpose::STANDARD.decode(raw).ok()?;
        let tx: VersionedTransaction = bincode::deserialize(&bytes).ok()?;

        let raw_tx = RawTransaction {
            signature,
            slot,
            account_keys: tx.message.static_account_keys().to_vec(),
            instructions: tx
                .message
                .instructions()
                .iter()
                .map(|ix| RawInstruction {
                    program_id_index: ix.program_id_index,
                    accounts: ix.accounts.clone(),
                    data: ix.data.clone(),
                })
                .collect(),
        };

        let decoded = decode_pool_transaction(&raw_tx, programs)?;
        debug!(
            "push stream: {} pool {} detected",
            decoded.dex, decoded.pool_address
        );
        Some(PoolCreated {
            signature,
            slot,
            timestamp: Utc::now(),
            dex: decoded.dex,
            pool_address: decoded.pool_address,
            base_mint: decoded.base_mint,
            quote_mint: decoded.quote_mint,
            initial_liquidity: decoded.initial_liquidity,
            creator: decoded.creator,
            anti_sniper: None,
        })
    }
}

#[async_trait]
impl PoolSource for PushStreamSource {
    fn name(&self) -> &str {
        "push_stream"
    }

    async fn start(
        &self,
        events: mpsc::Sender<PoolCreated>,
        signals: mpsc::Sender<SourceSignal>,
    ) -> Result<(), SniperError> {
        self.stopped.store(false, Ordering::SeqCst);
        let handle = tokio::spawn(Self::run(
            self.endpoint.clone(),
            self.token.clone(),
            self.programs.clone(),
            Arc::clone(&self.stopped),
            events,
            signals,
        ));
        *self.task.lock().await = Some(handle);
        Ok(())
    }

    async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
        }
    }
}
