use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single exchange-rate observation: 1 token = `rate` units of `currency`.
#[derive(Debug, Clone, PartialEq)]
pub struct RateQuote {
    pub rate: Decimal,
    pub as_of: DateTime<Utc>,
    /// True when the quote came from the recorded-snapshot fallback rather
    /// than the upstream oracle
    pub from_fallback: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceResponse {
    pub success: bool,
    pub token: String,
    pub currency: String,
    pub rate: Decimal,
    pub as_of: DateTime<Utc>,
    pub from_fallback: bool,
}
