//! Exchange-rate endpoint
//!
//! GET /api/prices/{currency} serves the current USDC rate within the
//! oracle freshness tolerance and records the served snapshot.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::models::order::ErrorResponse;
use crate::models::price::PriceResponse;
use crate::services::price_oracle::{PriceError, STABLECOIN};
use crate::AppState;

pub async fn get_price(
    State(state): State<AppState>,
    Path(currency): Path<String>,
) -> Result<Json<PriceResponse>, (StatusCode, Json<ErrorResponse>)> {
    let currency = currency.to_uppercase();
    let quote = state
        .rates
        .usdc_rate(&currency)
        .await
        .map_err(map_price_error)?;

    Ok(Json(PriceResponse {
        success: true,
        token: STABLECOIN.to_string(),
        currency,
        rate: quote.rate,
        as_of: quote.as_of,
        from_fallback: quote.from_fallback,
    }))
}

fn map_price_error(err: PriceError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &err {
        PriceError::Unavailable(_) | PriceError::Upstream(_) => StatusCode::SERVICE_UNAVAILABLE,
        PriceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}
