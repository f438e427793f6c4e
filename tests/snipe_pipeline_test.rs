//! End-to-end pipeline scenarios against the mock infrastructure:
//! clean snipe, filter rejection, and transient quote recovery.

use poolsniper::application::fee_optimizer::FeeOptimizer;
use poolsniper::application::filter_validator::FilterValidator;
use poolsniper::application::honeypot_evaluator::{
    FallbackMode, HoneypotEvaluator, HoneypotEvaluatorConfig,
};
use poolsniper::application::order_engine::{ExecutionContext, OrderEngine};
use poolsniper::domain::errors::SniperError;
use poolsniper::domain::filters::FilterPreset;
use poolsniper::domain::honeypot::{HoneypotFlag, ProviderLayer};
use poolsniper::domain::orders::{Order, OrderConfig, OrderState};
use poolsniper::domain::ports::{RawTransaction, TtlCache};
use poolsniper::domain::repositories::{OrderRepository, PositionRepository};
use poolsniper::infrastructure::cache::InMemoryTtlCache;
use poolsniper::infrastructure::core::CircuitBreakerConfig;
use poolsniper::infrastructure::lock_registry::LockRegistry;
use poolsniper::infrastructure::mock::{
    InMemoryOrderRepository, InMemoryPositionRepository, MockAggregator, MockChainClient,
    MockHoneypotProvider, MockMevSubmitter,
};
use poolsniper::infrastructure::rpc::RpcFabric;
use serde_json::json;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use std::collections::HashSet;
use std::sync::Arc;

struct Pipeline {
    engine: OrderEngine,
    orders: Arc<InMemoryOrderRepository>,
    positions: Arc<InMemoryPositionRepository>,
    aggregator: Arc<MockAggregator>,
    chain: Arc<MockChainClient>,
}

fn clean_token_layer(score: f64, flags: &[HoneypotFlag]) -> ProviderLayer {
    ProviderLayer {
        score,
        confidence: 90.0,
        flags: flags.iter().copied().collect::<HashSet<_>>(),
        latency_ms: 2,
        raw_data: json!({
            "top10_pct": 45.0,
            "single_holder_pct": 12.0,
            "dev_holding_pct": 8.0,
            "holders": 150,
            "buy_tax_pct": 3.0,
            "sell_tax_pct": 5.0,
            "sell_probe_ok": true,
        }),
    }
}

async fn pipeline(layer: ProviderLayer) -> Pipeline {
    let chain = Arc::new(MockChainClient::new());
    chain.put_fees((1..=20).map(|i| i * 1_000).collect()).await;
    chain
        .put_transaction(RawTransaction {
            signature: Signature::from([7u8; 64]),
            slot: 99,
            account_keys: vec![],
            instructions: vec![],
        })
        .await;

    let fabric = Arc::new(RpcFabric::new(
        Arc::clone(&chain) as Arc<dyn poolsniper::domain::ports::ChainClient>,
        CircuitBreakerConfig::default(),
    ));
    let cache: Arc<dyn TtlCache> = Arc::new(InMemoryTtlCache::new());

    let evaluator = Arc::new(HoneypotEvaluator::new(
        vec![Arc::new(MockHoneypotProvider::succeeding("mock", layer))],
        Arc::clone(&cache),
        HoneypotEvaluatorConfig {
            mode: FallbackMode::StopOnFirstSuccess,
            ..Default::default()
        },
    ));
    let filter_validator = Arc::new(FilterValidator::new(Arc::new(LockRegistry::new(
        Arc::clone(&fabric),
        Arc::clone(&cache),
    ))));
    let fee_optimizer = Arc::new(FeeOptimizer::new(Arc::clone(&fabric), Arc::clone(&cache), 10));

    let orders = Arc::new(InMemoryOrderRepository::new());
    let positions = Arc::new(InMemoryPositionRepository::new());
    let aggregator = Arc::new(MockAggregator::new());

    let engine = OrderEngine::new(
        Arc::clone(&orders) as Arc<dyn OrderRepository>,
        Arc::clone(&positions) as Arc<dyn PositionRepository>,
        cache,
        evaluator,
        filter_validator,
        fee_optimizer,
        Arc::clone(&aggregator) as Arc<dyn poolsniper::domain::ports::SwapAggregator>,
        fabric,
        Arc::new(MockMevSubmitter::new()),
        30,
    );
    Pipeline {
        engine,
        orders,
        positions,
        aggregator,
        chain: Arc::clone(&chain),
    }
}

/// Scenario: conservative preset, score 20, confidence 90, clean
/// holder distribution, 1 base unit in. The order walks the full DAG
/// and leaves a position behind.
#[tokio::test]
async fn test_clean_snipe_full_walk() {
    let p = pipeline(clean_token_layer(20.0, &[])).await;
    let mint = Pubkey::new_unique();
    p.aggregator
        .script_failures_then_success(mint, 0, 4_000_000)
        .await;

    let mut config = OrderConfig::new(mint, 1);
    config.take_profit_pct = Some(50.0);
    config.stop_loss_pct = Some(20.0);
    let order = Order::new("user-1", config);
    p.orders.create(&order).await.unwrap();

    let ctx = ExecutionContext {
        liquidity_hint: Some(50_000_000_000),
        ..ExecutionContext::new(Pubkey::new_unique(), FilterPreset::Conservative)
    };
    let done = p.engine.execute(order.id, &ctx).await.unwrap();

    assert_eq!(done.state, OrderState::Confirmed);
    assert_eq!(done.fill.as_ref().unwrap().slot, 99);
    let position = p
        .positions
        .get_by_order(order.id)
        .await
        .unwrap()
        .expect("position exists iff order confirmed");
    assert_eq!(position.amount_out, 4_000_000);
    assert!(position.wants_price_monitoring());
}

/// Scenario: score 20 but the mint authority is live under
/// CONSERVATIVE. One high-severity violation, no retries, no position.
#[tokio::test]
async fn test_filter_rejection_names_the_predicate() {
    let p = pipeline(clean_token_layer(
        20.0,
        &[HoneypotFlag::MintAuthorityActive],
    ))
    .await;
    let mint = Pubkey::new_unique();
    p.aggregator
        .script_failures_then_success(mint, 0, 4_000_000)
        .await;

    let order = Order::new("user-1", OrderConfig::new(mint, 1));
    p.orders.create(&order).await.unwrap();

    let ctx = ExecutionContext {
        liquidity_hint: Some(50_000_000_000),
        ..ExecutionContext::new(Pubkey::new_unique(), FilterPreset::Conservative)
    };
    let err = p.engine.execute(order.id, &ctx).await.unwrap_err();

    match err {
        SniperError::FilterRejected(violations) => {
            assert!(violations.iter().any(|v| v.filter == "requireMintDisabled"));
        }
        other => panic!("expected FILTER_REJECTED, got {other}"),
    }

    let stored = p.orders.get(order.id).await.unwrap().unwrap();
    assert_eq!(stored.state, OrderState::Failed);
    assert_eq!(stored.retry_count, 0);
    assert!(p.positions.get_by_order(order.id).await.unwrap().is_none());
    assert_eq!(p.aggregator.quote_calls(), 0);
    assert_eq!(p.chain.submit_calls(), 0);
}

/// Scenario: the quote endpoint fails twice with a network error and
/// then recovers; the in-attempt retry policy (200 -> 400 ms, +/-10%)
/// absorbs both failures.
#[tokio::test]
async fn test_transient_quote_failure_recovers() {
    let p = pipeline(clean_token_layer(20.0, &[])).await;
    let mint = Pubkey::new_unique();
    p.aggregator
        .script_failures_then_success(mint, 2, 4_000_000)
        .await;

    let order = Order::new("user-1", OrderConfig::new(mint, 1));
    p.orders.create(&order).await.unwrap();

    let ctx = ExecutionContext {
        liquidity_hint: Some(50_000_000_000),
        ..ExecutionContext::new(Pubkey::new_unique(), FilterPreset::Aggressive)
    };

    let started = std::time::Instant::now();
    let done = p.engine.execute(order.id, &ctx).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(done.state, OrderState::Confirmed);
    assert_eq!(p.aggregator.quote_calls(), 3);
    // Two backoffs of ~200ms and ~400ms land inside the run.
    assert!(elapsed.as_millis() >= 500, "elapsed {elapsed:?}");
    // The pipeline itself never looped: in-attempt retries only.
    assert_eq!(done.retry_count, 0);
}
