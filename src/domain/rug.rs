use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::fmt;

/// Mint and freeze authority of a token at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct AuthorityState {
    pub mint_authority: Option<Pubkey>,
    pub freeze_authority: Option<Pubkey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SupplySnapshot {
    pub supply: u64,
    pub decimals: u8,
    pub taken_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LiquiditySnapshot {
    /// Base-unit reserves attributable to the pool.
    pub base_reserve: u64,
    pub taken_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopHolder {
    pub address: Pubkey,
    pub balance: u64,
    pub pct_of_supply: f64,
}

/// One full observation of a token's degradable state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RugObservation {
    pub authorities: AuthorityState,
    pub liquidity: LiquiditySnapshot,
    pub supply: SupplySnapshot,
    pub top_holders: Vec<TopHolder>,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RugType {
    LiquidityRemoval,
    AuthorityReenabled,
    SupplyManipulation,
    HolderDump,
    Multiple,
}

impl fmt::Display for RugType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RugType::LiquidityRemoval => "LIQUIDITY_REMOVAL",
            RugType::AuthorityReenabled => "AUTHORITY_REENABLED",
            RugType::SupplyManipulation => "SUPPLY_MANIPULATION",
            RugType::HolderDump => "HOLDER_DUMP",
            RugType::Multiple => "MULTIPLE",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RugSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitRecommendation {
    Hold,
    ExitPartial,
    ExitFull,
    ExitEmergency,
}

/// A single degradation finding with its derived action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RugDetection {
    pub rug_type: RugType,
    pub severity: RugSeverity,
    pub confidence: f64,
    pub evidence: String,
    pub recommendation: ExitRecommendation,
}

/// Detection thresholds; all percentages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RugThresholds {
    /// Liquidity drop that counts as removal (positive number).
    pub liquidity_drop_pct: f64,
    /// Supply increase that counts as manipulation.
    pub supply_increase_pct: f64,
    /// Per-holder balance drop that counts as a dump.
    pub holder_dump_pct: f64,
}

impl Default for RugThresholds {
    fn default() -> Self {
        Self {
            liquidity_drop_pct: 50.0,
            supply_increase_pct: 10.0,
            holder_dump_pct: 30.0,
        }
    }
}

/// Signed percent change from `baseline` to `latest`.
pub fn percent_change(baseline: u64, latest: u64) -> f64 {
    if baseline == 0 {
        return if latest == 0 { 0.0 } else { 100.0 };
    }
    (latest as f64 - baseline as f64) * 100.0 / baseline as f64
}

fn liquidity_severity(drop_pct: f64) -> RugSeverity {
    if drop_pct >= 90.0 {
        RugSeverity::Critical
    } else if drop_pct >= 75.0 {
        RugSeverity::High
    } else {
        RugSeverity::Medium
    }
}

fn supply_severity(increase_pct: f64) -> RugSeverity {
    if increase_pct >= 100.0 {
        RugSeverity::Critical
    } else if increase_pct >= 50.0 {
        RugSeverity::High
    } else {
        RugSeverity::Medium
    }
}

fn holder_severity(affected_market_pct: f64) -> RugSeverity {
    if affected_market_pct >= 30.0 {
        RugSeverity::Critical
    } else if affected_market_pct >= 15.0 {
        RugSeverity::High
    } else if affected_market_pct >= 5.0 {
        RugSeverity::Medium
    } else {
        RugSeverity::Low
    }
}

/// Map a finding's severity and confidence to an action.
pub fn recommend(severity: RugSeverity, confidence: f64) -> ExitRecommendation {
    match severity {
        RugSeverity::Critical if confidence >= 90.0 => ExitRecommendation::ExitEmergency,
        RugSeverity::Critical => ExitRecommendation::ExitFull,
        RugSeverity::High if confidence >= 80.0 => ExitRecommendation::ExitFull,
        RugSeverity::High => ExitRecommendation::ExitPartial,
        RugSeverity::Medium if confidence >= 70.0 => ExitRecommendation::ExitPartial,
        _ => ExitRecommendation::Hold,
    }
}

fn detection(
    rug_type: RugType,
    severity: RugSeverity,
    confidence: f64,
    evidence: String,
) -> RugDetection {
    let confidence = confidence.clamp(0.0, 100.0);
    RugDetection {
        rug_type,
        severity,
        confidence,
        evidence,
        recommendation: recommend(severity, confidence),
    }
}

/// Compare an observation against its baseline. Pure: identical inputs
/// always produce identical detections.
pub fn detect(
    baseline: &RugObservation,
    latest: &RugObservation,
    thresholds: &RugThresholds,
) -> Vec<RugDetection> {
    let mut detections = Vec::new();

    // Liquidity removal.
    let liq_change = percent_change(
        baseline.liquidity.base_reserve,
        latest.liquidity.base_reserve,
    );
    if liq_change <= -thresholds.liquidity_drop_pct {
        let drop = -liq_change;
        detections.push(detection(
            RugType::LiquidityRemoval,
            liquidity_severity(drop),
            50.0 + drop,
            format!(
                "pool liquidity dropped {:.1}% ({} -> {})",
                drop, baseline.liquidity.base_reserve, latest.liquidity.base_reserve
            ),
        ));
    }

    // Authority re-enabled: null in baseline, present now.
    let mint_reenabled =
        baseline.authorities.mint_authority.is_none() && latest.authorities.mint_authority.is_some();
    let freeze_reenabled = baseline.authorities.freeze_authority.is_none()
        && latest.authorities.freeze_authority.is_some();
    if mint_reenabled || freeze_reenabled {
        let which = match (mint_reenabled, freeze_reenabled) {
            (true, true) => "mint and freeze authorities",
            (true, false) => "mint authority",
            _ => "freeze authority",
        };
        detections.push(detection(
            RugType::AuthorityReenabled,
            RugSeverity::Critical,
            95.0,
            format!("{which} re-enabled after being null at entry"),
        ));
    }

    // Supply manipulation.
    let supply_change = percent_change(baseline.supply.supply, latest.supply.supply);
    if supply_change >= thresholds.supply_increase_pct {
        detections.push(detection(
            RugType::SupplyManipulation,
            supply_severity(supply_change),
            60.0 + 2.0 * supply_change,
            format!(
                "supply inflated {:.1}% ({} -> {})",
                supply_change, baseline.supply.supply, latest.supply.supply
            ),
        ));
    }

    // Top-holder dumps: a missing baseline holder is a full exit.
    let mut dumped = Vec::new();
    let mut affected_market_pct = 0.0;
    for holder in &baseline.top_holders {
        let now = latest
            .top_holders
            .iter()
            .find(|h| h.address == holder.address)
            .map(|h| h.balance)
            .unwrap_or(0);
        let drop = -percent_change(holder.balance, now);
        if drop >= thresholds.holder_dump_pct {
            affected_market_pct += holder.pct_of_supply;
            dumped.push((holder.address, drop));
        }
    }
    if !dumped.is_empty() {
        let worst = dumped
            .iter()
            .map(|(_, d)| *d)
            .fold(0.0_f64, f64::max);
        detections.push(detection(
            RugType::HolderDump,
            holder_severity(affected_market_pct),
            50.0 + 3.0 * affected_market_pct,
            format!(
                "{} top holder(s) dumped (worst {:.1}%, {:.1}% of supply affected)",
                dumped.len(),
                worst,
                affected_market_pct
            ),
        ));
    }

    // Compound finding when several independent indicators fire.
    if detections.len() >= 2 {
        let severity = detections
            .iter()
            .map(|d| d.severity)
            .max()
            .unwrap_or(RugSeverity::Medium);
        let kinds = detections
            .iter()
            .map(|d| d.rug_type.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        detections.push(detection(
            RugType::Multiple,
            severity,
            98.0,
            format!("multiple rug indicators fired: {kinds}"),
        ));
    }

    detections
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation(
        liquidity: u64,
        supply: u64,
        authorities: AuthorityState,
        top_holders: Vec<TopHolder>,
    ) -> RugObservation {
        let now = Utc::now();
        RugObservation {
            authorities,
            liquidity: LiquiditySnapshot {
                base_reserve: liquidity,
                taken_at: now,
            },
            supply: SupplySnapshot {
                supply,
                decimals: 9,
                taken_at: now,
            },
            top_holders,
            captured_at: now,
        }
    }

    fn holder(balance: u64, pct: f64) -> TopHolder {
        TopHolder {
            address: Pubkey::new_unique(),
            balance,
            pct_of_supply: pct,
        }
    }

    #[test]
    fn test_percent_change_signs() {
        assert_eq!(percent_change(100, 40), -60.0);
        assert_eq!(percent_change(100, 110), 10.0);
        assert_eq!(percent_change(0, 0), 0.0);
        assert_eq!(percent_change(0, 5), 100.0);
    }

    #[test]
    fn test_liquidity_drop_sixty_percent() {
        let base = observation(100, 1_000, AuthorityState::default(), vec![]);
        let now = observation(40, 1_000, AuthorityState::default(), vec![]);

        let detections = detect(&base, &now, &RugThresholds::default());
        assert_eq!(detections.len(), 1);
        let d = &detections[0];
        assert_eq!(d.rug_type, RugType::LiquidityRemoval);
        assert_eq!(d.severity, RugSeverity::Medium);
        assert_eq!(d.confidence, 100.0); // 50 + 60, clamped
        assert_eq!(d.recommendation, ExitRecommendation::ExitPartial);
    }

    #[test]
    fn test_liquidity_drain_is_emergency() {
        let base = observation(100, 1_000, AuthorityState::default(), vec![]);
        let now = observation(5, 1_000, AuthorityState::default(), vec![]);

        let detections = detect(&base, &now, &RugThresholds::default());
        let d = &detections[0];
        assert_eq!(d.severity, RugSeverity::Critical);
        assert_eq!(d.recommendation, ExitRecommendation::ExitEmergency);
    }

    #[test]
    fn test_small_dip_is_quiet() {
        let base = observation(100, 1_000, AuthorityState::default(), vec![]);
        let now = observation(70, 1_000, AuthorityState::default(), vec![]);
        assert!(detect(&base, &now, &RugThresholds::default()).is_empty());
    }

    #[test]
    fn test_authority_reenabled_is_always_critical() {
        let base = observation(100, 1_000, AuthorityState::default(), vec![]);
        let now = observation(
            100,
            1_000,
            AuthorityState {
                mint_authority: Some(Pubkey::new_unique()),
                freeze_authority: None,
            },
            vec![],
        );

        let detections = detect(&base, &now, &RugThresholds::default());
        assert_eq!(detections.len(), 1);
        let d = &detections[0];
        assert_eq!(d.rug_type, RugType::AuthorityReenabled);
        assert_eq!(d.severity, RugSeverity::Critical);
        assert_eq!(d.confidence, 95.0);
        assert_eq!(d.recommendation, ExitRecommendation::ExitEmergency);
    }

    #[test]
    fn test_authority_present_at_baseline_is_not_reenabling() {
        let authority = AuthorityState {
            mint_authority: Some(Pubkey::new_unique()),
            freeze_authority: None,
        };
        let base = observation(100, 1_000, authority, vec![]);
        let now = observation(100, 1_000, authority, vec![]);
        assert!(detect(&base, &now, &RugThresholds::default()).is_empty());
    }

    #[test]
    fn test_supply_inflation() {
        let base = observation(100, 1_000, AuthorityState::default(), vec![]);
        let now = observation(100, 1_200, AuthorityState::default(), vec![]);

        let detections = detect(&base, &now, &RugThresholds::default());
        let d = &detections[0];
        assert_eq!(d.rug_type, RugType::SupplyManipulation);
        assert_eq!(d.severity, RugSeverity::Medium);
        assert_eq!(d.confidence, 100.0); // 60 + 2*20
    }

    #[test]
    fn test_missing_holder_counts_as_full_dump() {
        let whale = holder(500, 25.0);
        let base = observation(100, 1_000, AuthorityState::default(), vec![whale]);
        let now = observation(100, 1_000, AuthorityState::default(), vec![]);

        let detections = detect(&base, &now, &RugThresholds::default());
        let d = &detections[0];
        assert_eq!(d.rug_type, RugType::HolderDump);
        assert_eq!(d.severity, RugSeverity::High); // 25% of supply affected
        assert_eq!(d.confidence, 100.0); // 50 + 3*25, clamped
    }

    #[test]
    fn test_partial_dump_below_threshold_ignored() {
        let addr = Pubkey::new_unique();
        let before = TopHolder {
            address: addr,
            balance: 1_000,
            pct_of_supply: 10.0,
        };
        let after = TopHolder {
            address: addr,
            balance: 800,
            pct_of_supply: 8.0,
        };
        let base = observation(100, 1_000, AuthorityState::default(), vec![before]);
        let now = observation(100, 1_000, AuthorityState::default(), vec![after]);
        assert!(detect(&base, &now, &RugThresholds::default()).is_empty());
    }

    #[test]
    fn test_compound_detections_add_multiple() {
        let base = observation(100, 1_000, AuthorityState::default(), vec![]);
        let now = observation(
            30,
            1_500,
            AuthorityState {
                mint_authority: Some(Pubkey::new_unique()),
                freeze_authority: None,
            },
            vec![],
        );

        let detections = detect(&base, &now, &RugThresholds::default());
        let multiple = detections
            .iter()
            .find(|d| d.rug_type == RugType::Multiple)
            .expect("compound detection");
        assert_eq!(multiple.confidence, 98.0);
        assert_eq!(multiple.severity, RugSeverity::Critical);
        assert_eq!(multiple.recommendation, ExitRecommendation::ExitEmergency);
    }

    #[test]
    fn test_detect_is_pure() {
        let base = observation(100, 1_000, AuthorityState::default(), vec![]);
        let now = observation(40, 1_000, AuthorityState::default(), vec![]);
        let thresholds = RugThresholds::default();

        let a = detect(&base, &now, &thresholds);
        let b = detect(&base, &now, &thresholds);
        assert_eq!(a, b);
    }

    #[test]
    fn test_recommendation_law() {
        use ExitRecommendation::*;
        assert_eq!(recommend(RugSeverity::Critical, 95.0), ExitEmergency);
        assert_eq!(recommend(RugSeverity::Critical, 85.0), ExitFull);
        assert_eq!(recommend(RugSeverity::High, 85.0), ExitFull);
        assert_eq!(recommend(RugSeverity::High, 70.0), ExitPartial);
        assert_eq!(recommend(RugSeverity::Medium, 75.0), ExitPartial);
        assert_eq!(recommend(RugSeverity::Medium, 60.0), Hold);
        assert_eq!(recommend(RugSeverity::Low, 99.0), Hold);
    }
}
