//! Staleness-policy tests for the price oracle: `strict` fails fast when
//! the upstream is unreachable, `fallback` serves the last recorded
//! snapshot. The upstream URL points at a closed local port so the fetch
//! fails immediately without any network dependency.

mod common;

use rust_decimal_macros::dec;
use std::sync::Arc;

use airpesa_backend::config::{PriceConfig, PriceMode};
use airpesa_backend::services::order_store::RateStore;
use airpesa_backend::services::price_oracle::{
    PriceError, PriceOracleService, RateOracle, STABLECOIN,
};
use airpesa_backend::services::saga::{SagaCoordinator, SagaError};

use crate::common::{InMemoryStore, MockChain, MockOracle, MockProvider, TEST_PHONE, TEST_WALLET};

fn unreachable_config(mode: PriceMode) -> PriceConfig {
    PriceConfig {
        base_url: "http://127.0.0.1:1".to_string(),
        mode,
        cache_ttl_secs: 300,
    }
}

#[tokio::test]
async fn test_strict_mode_fails_when_upstream_is_down() {
    let store = Arc::new(InMemoryStore::new());
    let oracle = PriceOracleService::new(&unreachable_config(PriceMode::Strict), store);

    let err = oracle.usdc_rate("KES").await.unwrap_err();
    assert!(matches!(err, PriceError::Unavailable(_)));
}

#[tokio::test]
async fn test_fallback_mode_serves_last_recorded_snapshot() {
    let store = Arc::new(InMemoryStore::new());
    store
        .record_rate(STABLECOIN, "KES", dec!(128.5))
        .await
        .unwrap();

    let oracle = PriceOracleService::new(&unreachable_config(PriceMode::Fallback), store);

    let quote = oracle.usdc_rate("KES").await.unwrap();
    assert_eq!(quote.rate, dec!(128.5));
    assert!(quote.from_fallback);
}

#[tokio::test]
async fn test_fallback_mode_without_snapshot_is_unavailable() {
    let store = Arc::new(InMemoryStore::new());
    let oracle = PriceOracleService::new(&unreachable_config(PriceMode::Fallback), store);

    let err = oracle.usdc_rate("KES").await.unwrap_err();
    assert!(matches!(err, PriceError::Unavailable(_)));
}

#[tokio::test]
async fn test_order_creation_blocked_when_price_unavailable() {
    let store = Arc::new(InMemoryStore::new());
    let saga = SagaCoordinator::new(
        store,
        Arc::new(MockOracle::unavailable()),
        Arc::new(MockChain::new()),
        Arc::new(MockProvider::new()),
        dec!(0.05),
    );

    let err = saga
        .create_order(TEST_PHONE, dec!(100), TEST_WALLET)
        .await
        .unwrap_err();
    assert!(matches!(err, SagaError::PriceUnavailable(_)));
}
