//! Order creation and polling endpoints
//!
//! POST /api/orders and GET /api/orders/{order_ref}.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::error;

use crate::models::order::{CreateOrderRequest, CreateOrderResponse, ErrorResponse, OrderView};
use crate::services::saga::SagaError;
use crate::AppState;

pub async fn create_order(
    State(state): State<AppState>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Json<CreateOrderResponse>, (StatusCode, Json<ErrorResponse>)> {
    let order = state
        .saga
        .create_order(&payload.phone_number, payload.amount, &payload.wallet_address)
        .await
        .map_err(map_saga_error)?;

    Ok(Json(CreateOrderResponse {
        order_id: order.id,
        order_ref: order.order_ref,
        currency: order.currency,
        face_value: order.face_value,
        service_fee_usdc: order.service_fee_usdc,
        total_usdc: order.total_usdc,
        rate: order.rate,
    }))
}

pub async fn get_order_status(
    State(state): State<AppState>,
    Path(order_ref): Path<String>,
) -> Result<Json<OrderView>, (StatusCode, Json<ErrorResponse>)> {
    let order = state
        .saga
        .order_status(&order_ref)
        .await
        .map_err(map_saga_error)?;

    Ok(Json(OrderView::from(order)))
}

/// Map saga errors onto the HTTP surface. Shared by every endpoint that
/// fronts the coordinator.
pub fn map_saga_error(err: SagaError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &err {
        SagaError::InvalidPhone(_)
        | SagaError::UnsupportedCountry(_)
        | SagaError::InvalidAmount { .. }
        | SagaError::InvalidWallet(_)
        | SagaError::InvalidCallback(_) => StatusCode::BAD_REQUEST,
        SagaError::OrderNotFound(_) | SagaError::TransactionNotFound(_) => StatusCode::NOT_FOUND,
        SagaError::OrderNotPending { .. } | SagaError::DepositMismatch { .. } => {
            StatusCode::CONFLICT
        }
        SagaError::Conflict(_) => StatusCode::CONFLICT,
        SagaError::VerificationFailed(_) => StatusCode::BAD_REQUEST,
        SagaError::NotYetConfirmed(_) => StatusCode::GATEWAY_TIMEOUT,
        SagaError::PriceUnavailable(_) | SagaError::ExternalUnavailable(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        SagaError::CompensationFailed { .. } | SagaError::Storage(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    if status.is_server_error() {
        error!(error = %err, "Request failed");
    }

    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}
