//! Meteora DLMM activation decoding.
//!
//! Every Meteora pool detection is followed by an `lb_pair` account
//! read to learn the pool's activation configuration, from which the
//! anti-sniper suite is derived. Decoding failures fall back to the
//! conservative defaults rather than dropping the event.

use chrono::{DateTime, TimeZone, Utc};
use solana_sdk::pubkey::Pubkey;
use tracing::warn;

use crate::domain::errors::SniperError;
use crate::domain::events::{AlphaVault, AntiSniperConfig, FeeScheduler, RateLimiter};
use crate::infrastructure::rpc::RpcFabric;

// lb_pair field offsets, counted from the account data start
// (8-byte discriminator included).
const PRE_ACTIVATION_SWAP_ADDRESS_OFFSET: usize = 832;
const ACTIVATION_TYPE_OFFSET: usize = 864;
const ACTIVATION_POINT_OFFSET: usize = 872;
const PRE_ACTIVATION_DURATION_OFFSET: usize = 880;
const MIN_LB_PAIR_LEN: usize = 888;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationType {
    Slot,
    Timestamp,
}

#[derive(Debug, Clone)]
pub struct ActivationInfo {
    pub activation_type: ActivationType,
    pub activation_point: u64,
    pub pre_activation_duration: u64,
    pub pre_activation_swap_address: Pubkey,
}

fn read_u64(data: &[u8], offset: usize) -> Option<u64> {
    data.get(offset..offset + 8)
        .and_then(|b| b.try_into().ok())
        .map(u64::from_le_bytes)
}

fn read_pubkey(data: &[u8], offset: usize) -> Option<Pubkey> {
    data.get(offset..offset + 32)
        .and_then(|b| <[u8; 32]>::try_from(b).ok())
        .map(Pubkey::from)
}

/// Decode the activation fields out of a raw lb_pair account.
pub fn decode_activation(data: &[u8]) -> Result<ActivationInfo, SniperError> {
    if data.len() < MIN_LB_PAIR_LEN {
        return Err(SniperError::Validation(format!(
            "lb_pair account too short: {} bytes",
            data.len()
        )));
    }
    let activation_type = match data[ACTIVATION_TYPE_OFFSET] {
        0 => ActivationType::Slot,
        1 => ActivationType::Timestamp,
        other => {
            return Err(SniperError::Validation(format!(
                "unknown activation type {other}"
            )))
        }
    };
    Ok(ActivationInfo {
        activation_type,
        activation_point: read_u64(data, ACTIVATION_POINT_OFFSET)
            .ok_or_else(|| SniperError::Validation("truncated activation point".into()))?,
        pre_activation_duration: read_u64(data, PRE_ACTIVATION_DURATION_OFFSET)
            .ok_or_else(|| SniperError::Validation("truncated pre-activation duration".into()))?,
        pre_activation_swap_address: read_pubkey(data, PRE_ACTIVATION_SWAP_ADDRESS_OFFSET)
            .ok_or_else(|| SniperError::Validation("truncated swap address".into()))?,
    })
}

/// Derive the anti-sniper suite from decoded activation state.
pub fn derive_anti_sniper(info: &ActivationInfo, now: DateTime<Utc>) -> AntiSniperConfig {
    // Timestamp activations carry their own launch time; slot
    // activations count in slots, so the wall-clock launch is "now".
    let launch_time = match info.activation_type {
        ActivationType::Timestamp => Utc
            .timestamp_opt(info.activation_point as i64, 0)
            .single()
            .unwrap_or(now),
        ActivationType::Slot => now,
    };

    let alpha_vault = if info.pre_activation_swap_address != Pubkey::default() {
        match info.activation_type {
            ActivationType::Timestamp => {
                let window_start = launch_time
                    - chrono::Duration::seconds(info.pre_activation_duration as i64);
                if now >= window_start && now < launch_time {
                    Some(AlphaVault {
                        vault: info.pre_activation_swap_address,
                        window_start,
                        window_end: launch_time,
                    })
                } else {
                    None
                }
            }
            // No slot clock available here; a configured swap address
            // with a live pre-activation phase is treated as active.
            ActivationType::Slot if info.pre_activation_duration > 0 => Some(AlphaVault {
                vault: info.pre_activation_swap_address,
                window_start: now,
                window_end: now,
            }),
            ActivationType::Slot => None,
        }
    } else {
        None
    };

    AntiSniperConfig {
        fee_scheduler: Some(FeeScheduler {
            cliff_fee_bps: 9_900,
            number_of_periods: 10,
            period_secs: 30,
            reduction_factor: 1_000,
            launch_time,
        }),
        rate_limiter: Some(RateLimiter { base_fee_bps: 100 }),
        alpha_vault,
    }
}

/// Fetch the lb_pair account and derive the anti-sniper suite. Any
/// failure along the way degrades to the conservative defaults.
pub async fn fetch_anti_sniper_config(fabric: &RpcFabric, lb_pair: &Pubkey) -> AntiSniperConfig {
    let now = Utc::now();
    match fabric.get_account(lb_pair).await {
        Ok(account) => match decode_activation(&account.data) {
            Ok(info) => derive_anti_sniper(&info, now),
            Err(e) => {
                warn!("meteora: lb_pair {lb_pair} activation decode failed: {e}");
                AntiSniperConfig::conservative(now)
            }
        },
        Err(e) => {
            warn!("meteora: lb_pair {lb_pair} fetch failed: {e}");
            AntiSniperConfig::conservative(now)
        }
    }
}
