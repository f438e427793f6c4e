//! HTTP swap-aggregator client.
//!
//! Speaks the aggregator's REST contract: `GET /quote` for pricing and
//! `POST /swap` for a signed-transaction build. The builder internals
//! are the aggregator's concern; this client only owns the wire calls
//! and error classification.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use solana_sdk::pubkey::Pubkey;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::errors::SniperError;
use crate::domain::ports::{Quote, SwapAggregator, SwapParams, SwapTransaction};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteResponse {
    out_amount: String,
    #[serde(default)]
    price_impact_pct: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapResponse {
    swap_transaction: String,
    #[serde(default)]
    last_valid_block_height: u64,
}

pub struct HttpAggregatorClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpAggregatorClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into(),
            http,
        }
    }

    fn classify_error(mint: &Pubkey, status: reqwest::StatusCode, body: &str) -> SniperError {
        if body.contains("COULD_NOT_FIND_ANY_ROUTE") || body.contains("NO_ROUTE") {
            return SniperError::NoRoute {
                mint: mint.to_string(),
            };
        }
        if body.contains("INSUFFICIENT") && body.contains("BALANCE") {
            return SniperError::InsufficientBalance {
                need: 0,
                available: 0,
            };
        }
        SniperError::QuoteFailed(format!("aggregator returned {status}: {body}"))
    }
}

#[async_trait]
impl SwapAggregator for HttpAggregatorClient {
    async fn quote(
        &self,
        input_mint: &Pubkey,
        output_mint: &Pubkey,
        amount_in: u64,
        slippage_bps: u16,
    ) -> Result<Quote, SniperError> {
        let url = format!(
            "{}/quote?inputMint={}&outputMint={}&amount={}&slippageBps={}",
            self.base_url, input_mint, output_mint, amount_in, slippage_bps
        );
        let response = self.http.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                SniperError::Timeout(REQUEST_TIMEOUT.as_millis() as u64)
            } else {
                SniperError::Network(format!("quote: {e}"))
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SniperError::Network(format!("quote body: {e}")))?;
        if !status.is_success() {
            return Err(Self::classify_error(output_mint, status, &body));
        }

        let raw: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| SniperError::QuoteFailed(format!("quote parse: {e}")))?;
        let parsed: QuoteResponse = serde_json::from_value(raw.clone())
            .map_err(|e| SniperError::QuoteFailed(format!("quote schema: {e}")))?;

        let expected_out = parsed
            .out_amount
            .parse::<u64>()
            .map_err(|e| SniperError::QuoteFailed(format!("bad outAmount: {e}")))?;
        let price_impact_pct = parsed
            .price_impact_pct
            .as_deref()
            .and_then(|p| p.parse::<f64>().ok())
            .unwrap_or(0.0);

        Ok(Quote {
            quote_id: Uuid::new_v4().to_string(),
            input_mint: *input_mint,
            output_mint: *output_mint,
            amount_in,
            expected_out,
            price_impact_pct,
            raw,
        })
    }

    async fn swap(
        &self,
        quote: &Quote,
        params: &SwapParams,
    ) -> Result<SwapTransaction, SniperError> {
        let mut body = json!({
            "quoteResponse": quote.raw,
            "userPublicKey": params.user.to_string(),
            "computeUnitPriceMicroLamports": params.compute_unit_price,
            "wrapAndUnwrapSol": true,
        });
        if let Some(tip) = params.mev_tip_lamports {
            body["prioritizationFeeLamports"] = json!({ "jitoTipLamports": tip });
        }
        if let Some(memo) = &params.memo {
            body["memo"] = json!(memo);
        }

        let url = format!("{}/swap", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SniperError::Timeout(REQUEST_TIMEOUT.as_millis() as u64)
                } else {
                    SniperError::Network(format!("swap: {e}"))
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| SniperError::Network(format!("swap body: {e}")))?;
        if !status.is_success() {
            return Err(Self::classify_error(&quote.output_mint, status, &text));
        }

        let parsed: SwapResponse = serde_json::from_str(&text)
            .map_err(|e| SniperError::QuoteFailed(format!("swap schema: {e}")))?;
        Ok(SwapTransaction {
            tx_base64: parsed.swap_transaction,
            last_valid_block_height: parsed.last_valid_block_height,
        })
    }
}
