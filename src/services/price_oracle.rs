//! Stablecoin price oracle
//!
//! Fetches the USDC -> local currency rate from CoinGecko, caches it for
//! the configured freshness tolerance, and records every served rate as a
//! snapshot row. When the upstream fetch fails the configured staleness
//! policy decides between failing and serving the last recorded snapshot.

use async_trait::async_trait;
use chrono::Utc;
use moka::future::Cache;
use reqwest::Client;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{PriceConfig, PriceMode};
use crate::models::price::RateQuote;
use crate::services::order_store::RateStore;

/// Upstream request budget; a slow oracle must not stall order creation
const FETCH_TIMEOUT_SECS: u64 = 5;

/// CoinGecko id for the stablecoin side of every pair
const USDC_COIN_ID: &str = "usd-coin";

pub const STABLECOIN: &str = "USDC";

#[derive(Debug)]
pub enum PriceError {
    /// No fresh rate and no usable fallback
    Unavailable(String),
    Upstream(String),
    Store(String),
}

impl std::fmt::Display for PriceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PriceError::Unavailable(msg) => write!(f, "Price unavailable: {}", msg),
            PriceError::Upstream(msg) => write!(f, "Price upstream error: {}", msg),
            PriceError::Store(msg) => write!(f, "Price store error: {}", msg),
        }
    }
}

impl std::error::Error for PriceError {}

#[async_trait]
pub trait RateOracle: Send + Sync {
    /// Current USDC -> `currency` rate within the freshness tolerance.
    async fn usdc_rate(&self, currency: &str) -> Result<RateQuote, PriceError>;
}

#[derive(Clone)]
pub struct PriceOracleService {
    client: Client,
    base_url: String,
    mode: PriceMode,
    cache: Cache<String, RateQuote>,
    rates: Arc<dyn RateStore>,
}

impl PriceOracleService {
    pub fn new(config: &PriceConfig, rates: Arc<dyn RateStore>) -> Self {
        let cache = Cache::builder()
            .max_capacity(32)
            .time_to_live(Duration::from_secs(config.cache_ttl_secs))
            .build();

        let client = Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: config.base_url.clone(),
            mode: config.mode,
            cache,
            rates,
        }
    }

    async fn fetch_upstream(&self, currency: &str) -> Result<Decimal, PriceError> {
        let url = format!("{}/simple/price", self.base_url);
        let vs = currency.to_lowercase();

        let response = self
            .client
            .get(&url)
            .header("accept", "application/json")
            .query(&[("ids", USDC_COIN_ID), ("vs_currencies", vs.as_str())])
            .send()
            .await
            .map_err(|e| PriceError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(PriceError::Upstream(format!(
                "CoinGecko returned {}",
                status
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PriceError::Upstream(e.to_string()))?;

        let rate = body
            .get(USDC_COIN_ID)
            .and_then(|coin| coin.get(&vs))
            .and_then(|v| v.as_f64())
            .ok_or_else(|| {
                PriceError::Upstream(format!("no {} rate in CoinGecko response", currency))
            })?;

        Decimal::try_from(rate)
            .map(|d| d.round_dp(6))
            .map_err(|e| PriceError::Upstream(format!("unusable rate {}: {}", rate, e)))
    }

    async fn fallback_rate(&self, currency: &str, cause: &str) -> Result<RateQuote, PriceError> {
        let snapshot = self
            .rates
            .latest_rate(STABLECOIN, currency)
            .await
            .map_err(|e| PriceError::Store(e.to_string()))?
            .ok_or_else(|| {
                PriceError::Unavailable(format!(
                    "upstream failed ({}) and no recorded {} rate exists",
                    cause, currency
                ))
            })?;

        warn!(
            currency = %currency,
            rate = %snapshot.rate,
            recorded_at = %snapshot.created_at,
            "Serving last recorded rate as fallback"
        );

        Ok(RateQuote {
            rate: snapshot.rate,
            as_of: snapshot.created_at.with_timezone(&Utc),
            from_fallback: true,
        })
    }
}

#[async_trait]
impl RateOracle for PriceOracleService {
    async fn usdc_rate(&self, currency: &str) -> Result<RateQuote, PriceError> {
        let cache_key = currency.to_uppercase();

        if let Some(cached) = self.cache.get(&cache_key).await {
            debug!(currency = %cache_key, rate = %cached.rate, "Price cache hit");
            return Ok(cached);
        }

        match self.fetch_upstream(&cache_key).await {
            Ok(rate) => {
                // Recording is best-effort; the quote stands even if the
                // snapshot insert fails.
                if let Err(e) = self.rates.record_rate(STABLECOIN, &cache_key, rate).await {
                    warn!(error = %e, "Failed to record price snapshot");
                }

                let quote = RateQuote {
                    rate,
                    as_of: Utc::now(),
                    from_fallback: false,
                };
                self.cache.insert(cache_key, quote.clone()).await;
                Ok(quote)
            }
            Err(e) => match self.mode {
                PriceMode::Strict => Err(PriceError::Unavailable(e.to_string())),
                PriceMode::Fallback => self.fallback_rate(&cache_key, &e.to_string()).await,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_error_display() {
        let err = PriceError::Unavailable("no rate".to_string());
        assert!(err.to_string().contains("Price unavailable"));

        let err = PriceError::Upstream("CoinGecko returned 429".to_string());
        assert!(err.to_string().contains("429"));
    }
}
