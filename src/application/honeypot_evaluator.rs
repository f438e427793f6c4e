//! Honeypot evaluation: ordered provider fallback with caching.
//!
//! Providers run behind their own breakers and deadlines; this service
//! owns the chain order, the combination rule and the result cache.
//! One cached entry per mint also keeps concurrent checks for the same
//! token from racing duplicate provider chains.

use futures::future::join_all;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::errors::SniperError;
use crate::domain::honeypot::{HoneypotResult, ProviderLayer, DEFAULT_HIGH_RISK_THRESHOLD};
use crate::domain::ports::{HoneypotProvider, TtlCache};
use crate::infrastructure::cache::keys;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackMode {
    /// Return the first provider that answers.
    StopOnFirstSuccess,
    /// Combine up to `max_providers` answers (max score, flag union).
    Aggregate { max_providers: usize },
}

#[derive(Debug, Clone, Copy)]
pub struct HoneypotEvaluatorConfig {
    pub mode: FallbackMode,
    pub high_threshold: f64,
    pub cache_ttl_secs: u64,
}

impl Default for HoneypotEvaluatorConfig {
    fn default() -> Self {
        Self {
            mode: FallbackMode::StopOnFirstSuccess,
            high_threshold: DEFAULT_HIGH_RISK_THRESHOLD,
            cache_ttl_secs: 3_600,
        }
    }
}

pub struct HoneypotEvaluator {
    providers: Vec<Arc<dyn HoneypotProvider>>,
    cache: Arc<dyn TtlCache>,
    config: HoneypotEvaluatorConfig,
}

impl HoneypotEvaluator {
    pub fn new(
        providers: Vec<Arc<dyn HoneypotProvider>>,
        cache: Arc<dyn TtlCache>,
        config: HoneypotEvaluatorConfig,
    ) -> Self {
        Self {
            providers,
            cache,
            config,
        }
    }

    /// Evaluate a token, serving from cache when fresh.
    pub async fn evaluate(&self, token_mint: &Pubkey) -> Result<HoneypotResult, SniperError> {
        let key = keys::honeypot(token_mint);
        if let Ok(Some(cached)) = self.cache.get(&key).await {
            match serde_json::from_str::<HoneypotResult>(&cached) {
                Ok(result) => {
                    debug!("honeypot cache hit for {token_mint}");
                    return Ok(result);
                }
                Err(e) => warn!("honeypot cache entry for {token_mint} corrupt: {e}"),
            }
        }

        let layers = self.run_chain(token_mint).await?;
        let result =
            HoneypotResult::from_layers(*token_mint, layers, self.config.high_threshold);

        if let Ok(serialized) = serde_json::to_string(&result) {
            let _ = self
                .cache
                .set_ex(&key, &serialized, self.config.cache_ttl_secs)
                .await;
        }
        Ok(result)
    }

    async fn run_chain(
        &self,
        token_mint: &Pubkey,
    ) -> Result<HashMap<String, ProviderLayer>, SniperError> {
        if self.providers.is_empty() {
            return Err(SniperError::Unknown("no honeypot providers configured".into()));
        }

        match self.config.mode {
            FallbackMode::StopOnFirstSuccess => {
                let mut last_error = None;
                for provider in &self.providers {
                    match provider.check(token_mint).await {
                        Ok(layer) => {
                            let mut layers = HashMap::new();
                            layers.insert(provider.name().to_string(), layer);
                            return Ok(layers);
                        }
                        Err(e) => {
                            warn!(
                                "honeypot provider [{}] failed for {token_mint}: {e}",
                                provider.name()
                            );
                            last_error = Some(e);
                        }
                    }
                }
                Err(last_error.unwrap_or_else(|| {
                    SniperError::Unknown("provider chain produced nothing".into())
                }))
            }
            FallbackMode::Aggregate { max_providers } => {
                let selected: Vec<_> =
                    self.providers.iter().take(max_providers.max(1)).collect();
                let checks = selected.iter().map(|p| p.check(token_mint));
                let outcomes = join_all(checks).await;

                let mut layers = HashMap::new();
                let mut last_error = None;
                for (provider, outcome) in selected.iter().zip(outcomes) {
                    match outcome {
                        Ok(layer) => {
                            layers.insert(provider.name().to_string(), layer);
                        }
                        Err(e) => {
                            warn!(
                                "honeypot provider [{}] failed for {token_mint}: {e}",
                                provider.name()
                            );
                            last_error = Some(e);
                        }
                    }
                }
                if layers.is_empty() {
                    return Err(last_error.unwrap_or_else(|| {
                        SniperError::Unknown("provider chain produced nothing".into())
                    }));
                }
                Ok(layers)
            }
        }
    }
}
