//! MEV bundle submission.
//!
//! Sends signed transactions through a private bundle relay instead of
//! the public mempool. The tip is decided by the privacy layer; this
//! client only ships the bundle.

use async_trait::async_trait;
use serde_json::json;
use solana_sdk::signature::Signature;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::errors::SniperError;
use crate::domain::ports::MevSubmitter;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct HttpBundleClient {
    relay_url: String,
    http: reqwest::Client,
}

impl HttpBundleClient {
    pub fn new(relay_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            relay_url: relay_url.into(),
            http,
        }
    }
}

#[async_trait]
impl MevSubmitter for HttpBundleClient {
    async fn submit_bundle(
        &self,
        tx_base64: &str,
        tip_lamports: u64,
    ) -> Result<Signature, SniperError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "sendBundle",
            "params": [[tx_base64], { "encoding": "base64", "tipLamports": tip_lamports }]
        });

        let response = self
            .http
            .post(&self.relay_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SniperError::Timeout(REQUEST_TIMEOUT.as_millis() as u64)
                } else {
                    SniperError::Network(format!("bundle submit: {e}"))
                }
            })?;

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SniperError::Network(format!("bundle response: {e}")))?;

        if let Some(error) = value.get("error") {
            return Err(SniperError::Network(format!("bundle rejected: {error}")));
        }

        let signature = value
            .get("result")
            .and_then(|r| r.as_str())
            .ok_or_else(|| SniperError::Network("bundle response missing result".into()))?;
        Signature::from_str(signature)
            .map_err(|e| SniperError::Network(format!("bundle signature: {e}")))
    }
}
