//! Provider callback endpoints
//!
//! POST /api/airtime/status receives the delivery report (form-encoded,
//! the provider's transport) and POST /api/airtime/validate answers the
//! provider's pre-dispatch validation probe.
//!
//! Source-IP trust for the validation callback is a security control: it
//! is enforced whenever a trusted list is configured, and an empty list is
//! announced loudly at startup rather than silently bypassed.

use axum::{
    extract::{Form, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::handlers::order::map_saga_error;
use crate::models::airtime::{CallbackAck, DeliveryCallback, ValidationAck, ValidationCallback};
use crate::models::order::ErrorResponse;
use crate::services::saga::CallbackOutcome;
use crate::AppState;

pub async fn delivery_status(
    State(state): State<AppState>,
    Form(payload): Form<DeliveryCallback>,
) -> Result<Json<CallbackAck>, (StatusCode, Json<ErrorResponse>)> {
    let outcome = state
        .saga
        .handle_provider_callback(
            &payload.request_id,
            &payload.status,
            payload.error_message.as_deref(),
        )
        .await
        .map_err(map_saga_error)?;

    let status = match outcome {
        CallbackOutcome::Fulfilled => "fulfilled",
        CallbackOutcome::Refunded { .. } => "refunded",
        CallbackOutcome::AlreadyFinal { status } => status.as_str(),
        CallbackOutcome::DuplicateInFlight | CallbackOutcome::Acknowledged => "acknowledged",
    };

    Ok(Json(CallbackAck {
        success: true,
        status: status.to_string(),
    }))
}

pub async fn validate(
    State(state): State<AppState>,
    Json(payload): Json<ValidationCallback>,
) -> (StatusCode, Json<ValidationAck>) {
    let trusted = &state.config.callback_trusted_ips;
    if !trusted.is_empty() && !trusted.iter().any(|ip| ip == &payload.source_ip_address) {
        warn!(
            source_ip = %payload.source_ip_address,
            transaction_id = %payload.transaction_id,
            "Validation callback from untrusted source"
        );
        return (StatusCode::FORBIDDEN, Json(ValidationAck { status: "Failed" }));
    }

    let amount = match payload.amount.parse::<Decimal>() {
        Ok(amount) => amount,
        Err(_) => {
            warn!(amount = %payload.amount, "Unparseable amount in validation callback");
            return (
                StatusCode::BAD_REQUEST,
                Json(ValidationAck { status: "Failed" }),
            );
        }
    };

    let order = match state
        .store
        .find_pending_order_for_validation(&payload.phone_number, amount)
        .await
    {
        Ok(Some(order)) => order,
        Ok(None) => {
            warn!(
                phone = %payload.phone_number,
                amount = %amount,
                "No pending order matches validation callback"
            );
            return (
                StatusCode::NOT_FOUND,
                Json(ValidationAck { status: "Failed" }),
            );
        }
        Err(e) => {
            warn!(error = %e, "Validation callback lookup failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ValidationAck { status: "Failed" }),
            );
        }
    };

    if order.currency != payload.currency_code {
        warn!(
            order_ref = %order.order_ref,
            expected = %order.currency,
            received = %payload.currency_code,
            "Currency mismatch in validation callback"
        );
        return (
            StatusCode::BAD_REQUEST,
            Json(ValidationAck { status: "Failed" }),
        );
    }

    info!(
        order_ref = %order.order_ref,
        transaction_id = %payload.transaction_id,
        "Validation callback approved"
    );
    (StatusCode::OK, Json(ValidationAck { status: "Validated" }))
}
