//! Filter validation service.
//!
//! Wraps the pure policy check in `domain::filters` with the on-chain
//! auxiliary lookups it needs: liquidity-lock status and the facts
//! already gathered by the honeypot layers.

use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use tracing::warn;

use crate::domain::errors::SniperError;
use crate::domain::filters::{
    self, FilterCheck, FilterPreset, FilterValidation, LockStatus, SniperFilters,
    TokenFilterData,
};
use crate::domain::honeypot::HoneypotResult;
use crate::infrastructure::lock_registry::LockRegistry;

pub struct FilterValidator {
    lock_registry: Arc<LockRegistry>,
}

impl FilterValidator {
    pub fn new(lock_registry: Arc<LockRegistry>) -> Self {
        Self { lock_registry }
    }

    /// Structural validation; advisory warnings included.
    pub fn validate(&self, filters: &SniperFilters) -> FilterValidation {
        filters::validate(filters)
    }

    /// Apply a preset (or custom filters) against a token. `lp_mint`
    /// absent keeps the historical behavior of assuming a full lock.
    pub async fn check(
        &self,
        honeypot: &HoneypotResult,
        preset: FilterPreset,
        custom: Option<SniperFilters>,
        lp_mint: Option<&Pubkey>,
        liquidity_hint: Option<u64>,
    ) -> Result<FilterCheck, SniperError> {
        let filters = SniperFilters::for_preset(preset, custom);
        let mut data = TokenFilterData::from_honeypot(honeypot);
        data.liquidity_lamports = liquidity_hint;

        Self::enrich_from_layers(&mut data, honeypot);

        data.lock_status = match lp_mint {
            Some(lp) => match self.lock_registry.lock_status(lp).await {
                Ok(status) => status,
                Err(e) => {
                    warn!("lock lookup for {lp} failed: {e}");
                    LockStatus::Unknown
                }
            },
            None => LockStatus::Locked { pct: 100.0 },
        };

        Ok(filters::check(&honeypot.token_mint, &data, &filters))
    }

    /// Pull holder, tax and metadata facts out of whatever the
    /// provider layers reported.
    fn enrich_from_layers(data: &mut TokenFilterData, honeypot: &HoneypotResult) {
        for layer in honeypot.layers.values() {
            let raw = &layer.raw_data;
            if let Some(v) = raw.get("top10_pct").and_then(|v| v.as_f64()) {
                data.top10_holder_pct = Some(v);
            }
            if let Some(v) = raw.get("single_holder_pct").and_then(|v| v.as_f64()) {
                data.single_holder_pct = Some(v);
            }
            if let Some(v) = raw.get("dev_holding_pct").and_then(|v| v.as_f64()) {
                data.dev_holding_pct = Some(v);
            }
            if let Some(v) = raw.get("holders").and_then(|v| v.as_u64()) {
                data.holder_count = Some(v as u32);
            }
            if let Some(v) = raw.get("buy_tax_pct").and_then(|v| v.as_f64()) {
                data.buy_tax_pct = Some(v);
            }
            if let Some(v) = raw.get("sell_tax_pct").and_then(|v| v.as_f64()) {
                data.sell_tax_pct = Some(v);
            }
            if let Some(v) = raw.get("pool_supply_pct").and_then(|v| v.as_f64()) {
                data.pool_supply_pct = Some(v);
            }
            if let Some(v) = raw.get("has_socials").and_then(|v| v.as_bool()) {
                data.has_socials = v;
            }
            if let Some(v) = raw.get("sell_probe_ok").and_then(|v| v.as_bool()) {
                data.sell_simulation_ok = Some(v);
            }
        }
    }
}
