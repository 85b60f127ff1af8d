//! Payment submission endpoint
//!
//! POST /api/airtime/send: the client reports its deposit transaction and
//! the coordinator verifies it and dispatches airtime. Safe to retry.

use axum::{extract::State, http::StatusCode, Json};

use crate::handlers::order::map_saga_error;
use crate::models::airtime::{SubmitPaymentRequest, SubmitPaymentResponse};
use crate::models::order::ErrorResponse;
use crate::services::saga::SubmitOutcome;
use crate::AppState;

pub async fn submit_payment(
    State(state): State<AppState>,
    Json(payload): Json<SubmitPaymentRequest>,
) -> Result<Json<SubmitPaymentResponse>, (StatusCode, Json<ErrorResponse>)> {
    let outcome = state
        .saga
        .submit_payment(&payload.order_ref, &payload.tx_hash)
        .await
        .map_err(map_saga_error)?;

    Ok(Json(match outcome {
        SubmitOutcome::Dispatched {
            provider_request_id,
        } => SubmitPaymentResponse {
            success: true,
            status: "dispatched".to_string(),
            request_id: provider_request_id,
            refund_tx_hash: None,
            message: None,
        },
        SubmitOutcome::AlreadyDispatched {
            provider_request_id,
        } => SubmitPaymentResponse {
            success: true,
            status: "dispatched".to_string(),
            request_id: provider_request_id,
            refund_tx_hash: None,
            message: Some("airtime dispatch already in flight".to_string()),
        },
        SubmitOutcome::AlreadyFulfilled => SubmitPaymentResponse {
            success: true,
            status: "fulfilled".to_string(),
            request_id: None,
            refund_tx_hash: None,
            message: Some("airtime was already delivered for this order".to_string()),
        },
        SubmitOutcome::AlreadyRefunded { refund_tx_hash } => SubmitPaymentResponse {
            success: false,
            status: "refunded".to_string(),
            request_id: None,
            refund_tx_hash,
            message: Some(
                "this order was refunded; create a new order to try again".to_string(),
            ),
        },
        SubmitOutcome::RefundedAfterRejection {
            refund_tx_hash,
            provider_error,
        } => SubmitPaymentResponse {
            success: false,
            status: "refunded".to_string(),
            request_id: None,
            refund_tx_hash,
            message: Some(format!("airtime dispatch rejected: {}", provider_error)),
        },
    }))
}
