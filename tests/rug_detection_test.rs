//! Rug detection laws: derivations are pure functions of the
//! observation pair, with the documented severities and confidences.

use chrono::Utc;
use poolsniper::domain::rug::{
    detect, percent_change, recommend, AuthorityState, ExitRecommendation, LiquiditySnapshot,
    RugObservation, RugSeverity, RugThresholds, RugType, SupplySnapshot, TopHolder,
};
use solana_sdk::pubkey::Pubkey;

fn observation(liquidity: u64, supply: u64, authorities: AuthorityState) -> RugObservation {
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
        top_holders: vec![],
        captured_at: now,
    }
}

/// Scenario: baseline liquidity 100, latest 40. A 60% drop is MEDIUM
/// with confidence clamped at 100, recommending a (partial) exit.
#[test]
fn test_baseline_100_latest_40() {
    let base = observation(100, 1_000, AuthorityState::default());
    let now = observation(40, 1_000, AuthorityState::default());

    let detections = detect(&base, &now, &RugThresholds::default());
    assert_eq!(detections.len(), 1);
    let d = &detections[0];

    assert_eq!(d.rug_type, RugType::LiquidityRemoval);
    assert_eq!(percent_change(100, 40), -60.0);
    assert_eq!(d.severity, RugSeverity::Medium);
    assert_eq!(d.confidence, 100.0); // 50 + 60 -> clamped
    assert_ne!(d.recommendation, ExitRecommendation::Hold);
}

/// At a >= 90% drop with confidence >= 90 the recommendation escalates
/// to the emergency path.
#[test]
fn test_ninety_percent_drop_is_emergency() {
    let base = observation(100, 1_000, AuthorityState::default());
    let now = observation(10, 1_000, AuthorityState::default());

    let d = &detect(&base, &now, &RugThresholds::default())[0];
    assert_eq!(d.severity, RugSeverity::Critical);
    assert_eq!(d.recommendation, ExitRecommendation::ExitEmergency);
}

/// Severity and recommendation are functions of their inputs: two
/// identical observation pairs always derive identical detections.
#[test]
fn test_derivation_is_pure() {
    let whale = TopHolder {
        address: Pubkey::new_unique(),
        balance: 400,
        pct_of_supply: 20.0,
    };
    let mut base = observation(100, 1_000, AuthorityState::default());
    base.top_holders = vec![whale.clone()];
    let mut now = observation(30, 1_150, AuthorityState::default());
    now.top_holders = vec![TopHolder {
        balance: 100,
        ..whale
    }];

    let thresholds = RugThresholds::default();
    for _ in 0..10 {
        assert_eq!(detect(&base, &now, &thresholds), detect(&base, &now, &thresholds));
    }
}

#[test]
fn test_recommendation_table() {
    use ExitRecommendation::*;
    use RugSeverity::*;

    let table = [
        (Critical, 95.0, ExitEmergency),
        (Critical, 89.9, ExitFull),
        (High, 85.0, ExitFull),
        (High, 79.9, ExitPartial),
        (Medium, 70.0, ExitPartial),
        (Medium, 69.9, Hold),
        (Low, 100.0, Hold),
    ];
    for (severity, confidence, expected) in table {
        assert_eq!(
            recommend(severity, confidence),
            expected,
            "({severity:?}, {confidence})"
        );
    }
}

#[test]
fn test_confidence_formulas() {
    let thresholds = RugThresholds::default();

    // Liquidity: 50 + |drop|, clamped to 100. Any drop at or past the
    // default 50% threshold therefore reports full confidence.
    let base = observation(1_000, 1_000, AuthorityState::default());
    let now = observation(450, 1_000, AuthorityState::default());
    let d = &detect(&base, &now, &thresholds)[0];
    assert_eq!(d.confidence, 100.0);

    // Supply: 60 + 2 * increase.
    let base = observation(1_000, 1_000, AuthorityState::default());
    let now = observation(1_000, 1_150, AuthorityState::default());
    let d = &detect(&base, &now, &thresholds)[0];
    assert_eq!(d.confidence, 60.0 + 2.0 * 15.0);

    // Authority: always 95.
    let base = observation(1_000, 1_000, AuthorityState::default());
    let now = observation(
        1_000,
        1_000,
        AuthorityState {
            mint_authority: Some(Pubkey::new_unique()),
            freeze_authority: None,
        },
    );
    let d = &detect(&base, &now, &thresholds)[0];
    assert_eq!(d.confidence, 95.0);

    // Holder dump: 50 + 3 * affected market share.
    let whale = TopHolder {
        address: Pubkey::new_unique(),
        balance: 500,
        pct_of_supply: 10.0,
    };
    let mut base = observation(1_000, 1_000, AuthorityState::default());
    base.top_holders = vec![whale.clone()];
    let mut now = observation(1_000, 1_000, AuthorityState::default());
    now.top_holders = vec![TopHolder {
        balance: 0,
        ..whale
    }];
    let d = &detect(&base, &now, &thresholds)[0];
    assert_eq!(d.rug_type, RugType::HolderDump);
    assert_eq!(d.confidence, 50.0 + 3.0 * 10.0);

    // Compound: the MULTIPLE entry carries 98.
    let base = observation(1_000, 1_000, AuthorityState::default());
    let now = observation(
        100,
        1_500,
        AuthorityState {
            mint_authority: Some(Pubkey::new_unique()),
            freeze_authority: None,
        },
    );
    let detections = detect(&base, &now, &thresholds);
    let multiple = detections
        .iter()
        .find(|d| d.rug_type == RugType::Multiple)
        .unwrap();
    assert_eq!(multiple.confidence, 98.0);
}
