//! Cross-cutting properties: fee monotonicity over the mode order and
//! privacy-delay bounds under arbitrary settings.

use poolsniper::domain::fees::{optimize, FeeMarketSample};
use poolsniper::domain::orders::PriorityFeeMode;
use poolsniper::domain::privacy::{compute_delay, DelaySettings};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// P4: holding market data fixed, the chosen CU price never decreases
/// along NONE < LOW < MEDIUM < HIGH < TURBO < ULTRA.
#[test]
fn test_fee_monotonicity_across_many_markets() {
    let mut rng = StdRng::seed_from_u64(1234);

    for _ in 0..200 {
        let count = rng.random_range(10..200);
        let fees: Vec<u64> = (0..count)
            .map(|_| rng.random_range(1..2_000_000u64))
            .collect();
        let sample = FeeMarketSample::from_recent_fees(fees).unwrap();

        let prices: Vec<u64> = PriorityFeeMode::ALL
            .iter()
            .map(|mode| optimize(*mode, &sample, None, None).compute_unit_price)
            .collect();
        for pair in prices.windows(2) {
            assert!(
                pair[0] <= pair[1],
                "monotonicity broken: {prices:?} on congestion {}",
                sample.congestion
            );
        }
    }
}

#[test]
fn test_congestion_is_always_a_probability() {
    let mut rng = StdRng::seed_from_u64(99);
    for _ in 0..200 {
        let fees: Vec<u64> = (0..50).map(|_| rng.random_range(1..5_000_000u64)).collect();
        let sample = FeeMarketSample::from_recent_fees(fees).unwrap();
        assert!((0.0..=1.0).contains(&sample.congestion));
    }
}

/// P5: with delays enabled, the computed delay always lands in
/// [min, max], whatever the base and jitter say.
#[test]
fn test_privacy_delay_bounds_hold_for_arbitrary_settings() {
    let mut rng = StdRng::seed_from_u64(4321);

    for _ in 0..500 {
        let min_ms = rng.random_range(0..2_000);
        let max_ms = min_ms + rng.random_range(1..10_000);
        let settings = DelaySettings {
            enabled: true,
            base_ms: rng.random_range(0..20_000),
            jitter_pct: rng.random_range(0.0..1.0),
            min_ms,
            max_ms,
        };
        let delay = compute_delay(&settings, &mut rng);
        assert!(
            (settings.min_ms..=settings.max_ms).contains(&delay),
            "delay {delay} outside [{min_ms}, {max_ms}]"
        );
    }
}

#[test]
fn test_cap_dominates_boost() {
    let sample = FeeMarketSample::from_recent_fees((1..=20).map(|i| i * 10_000).collect()).unwrap();
    let fee = optimize(PriorityFeeMode::Ultra, &sample, Some(123_456), Some(10.0));
    assert!(fee.was_capped);
    assert_eq!(fee.compute_unit_price, 123_456);
    assert_eq!(fee.total_fee_lamports, 123_456 * 200_000 / 1_000_000);
}
