//! HTTP reputation provider.
//!
//! Queries an external token-reputation service. Typical responses are
//! well under three seconds; the deadline counts as a breaker failure
//! when exceeded.

use async_trait::async_trait;
use serde::Deserialize;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashSet;
use std::time::{Duration, Instant};

use crate::domain::errors::SniperError;
use crate::domain::honeypot::{HoneypotFlag, ProviderLayer};
use crate::domain::ports::HoneypotProvider;
use crate::infrastructure::core::{CircuitBreaker, CircuitBreakerConfig};

const REQUEST_DEADLINE: Duration = Duration::from_secs(3);

#[derive(Debug, Deserialize)]
struct ReputationReport {
    score: f64,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    flags: Vec<String>,
    #[serde(default)]
    sell_tax_pct: Option<f64>,
    #[serde(default)]
    is_honeypot: Option<bool>,
}

pub struct HttpReputationProvider {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
    breaker: CircuitBreaker,
}

impl HttpReputationProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_DEADLINE)
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            http,
            breaker: CircuitBreaker::new("honeypot.reputation", CircuitBreakerConfig::default()),
        }
    }

    fn map_flag(raw: &str) -> Option<HoneypotFlag> {
        match raw {
            "mint_authority" => Some(HoneypotFlag::MintAuthorityActive),
            "freeze_authority" => Some(HoneypotFlag::FreezeAuthorityActive),
            "ownership_reclaimable" => Some(HoneypotFlag::OwnershipReclaimable),
            "high_sell_tax" => Some(HoneypotFlag::HighSellTax),
            "concentrated_holders" => Some(HoneypotFlag::ConcentratedTopHolders),
            "whale_holder" => Some(HoneypotFlag::SingleWhaleHolder),
            "no_metadata" => Some(HoneypotFlag::MetadataMissing),
            "honeypot" => Some(HoneypotFlag::ExplicitHoneypot),
            _ => None,
        }
    }

    async fn fetch(&self, token_mint: &Pubkey) -> Result<ProviderLayer, SniperError> {
        let started = Instant::now();
        let url = format!("{}/v1/tokens/{}/report", self.base_url, token_mint);

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SniperError::Timeout(REQUEST_DEADLINE.as_millis() as u64)
                } else {
                    SniperError::Network(format!("reputation fetch: {e}"))
                }
            })?;

        if !response.status().is_success() {
            return Err(SniperError::Network(format!(
                "reputation service returned {}",
                response.status()
            )));
        }

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SniperError::Network(format!("reputation body: {e}")))?;
        let report: ReputationReport = serde_json::from_value(raw.clone())
            .map_err(|e| SniperError::Network(format!("reputation schema: {e}")))?;

        let mut flags: HashSet<HoneypotFlag> = report
            .flags
            .iter()
            .filter_map(|f| Self::map_flag(f))
            .collect();
        if report.sell_tax_pct.is_some_and(|t| t > 50.0) {
            flags.insert(HoneypotFlag::HighSellTax);
        }

        // An explicit verdict from the service forces the ceiling.
        let score = if report.is_honeypot == Some(true) {
            flags.insert(HoneypotFlag::ExplicitHoneypot);
            100.0
        } else {
            report.score.clamp(0.0, 100.0)
        };

        Ok(ProviderLayer {
            score,
            confidence: report.confidence.unwrap_or(80.0).clamp(0.0, 100.0),
            flags,
            latency_ms: started.elapsed().as_millis() as u64,
            raw_data: raw,
        })
    }
}

#[async_trait]
impl HoneypotProvider for HttpReputationProvider {
    fn name(&self) -> &str {
        "reputation"
    }

    async fn check(&self, token_mint: &Pubkey) -> Result<ProviderLayer, SniperError> {
        self.breaker.call(self.fetch(token_mint)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_mapping_covers_known_names() {
        assert_eq!(
            HttpReputationProvider::map_flag("mint_authority"),
            Some(HoneypotFlag::MintAuthorityActive)
        );
        assert_eq!(
            HttpReputationProvider::map_flag("honeypot"),
            Some(HoneypotFlag::ExplicitHoneypot)
        );
        assert_eq!(HttpReputationProvider::map_flag("something_else"), None);
    }

    #[test]
    fn test_report_schema_tolerates_missing_fields() {
        let report: ReputationReport =
            serde_json::from_value(serde_json::json!({ "score": 35.0 })).unwrap();
        assert_eq!(report.score, 35.0);
        assert!(report.flags.is_empty());
        assert!(report.confidence.is_none());
        assert!(report.is_honeypot.is_none());
    }
}
