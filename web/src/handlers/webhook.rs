//! Payment gateway webhook.

use crate::error::AppError;
use crate::extractors::WebhookSignature;
use crate::state::AppState;
use axum::{Json, body::Bytes, extract::State};
use enrollment_core::{EnrollmentError, GatewayError};
use enrollment_core::types::GatewayEvent;
use serde_json::{Value, json};

/// Receive a settlement notification from the payment gateway.
///
/// ```text
/// POST /payment/webhook
/// Stripe-Signature: t=...,v1=...
/// ```
///
/// Once the delivery is authenticated and parsed, every settlement outcome is
/// answered `200 OK`. That includes unknown and already-settled reservations,
/// which are no-ops.
///
/// # Errors
///
/// `400 Bad Request` when the signature is missing or wrong, or the payload
/// cannot be parsed. `500 Internal Server Error` when settlement could not be
/// recorded, so the gateway redelivers; settlement is idempotent.
pub async fn payment_webhook(
    State(state): State<AppState>,
    WebhookSignature(signature): WebhookSignature,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let event = state
        .engine
        .gateway()
        .parse_webhook(&body, &signature)
        .map_err(|e| {
            tracing::warn!(error = %e, "Rejected webhook delivery");
            match e {
                GatewayError::InvalidSignature(_) => {
                    AppError::from(EnrollmentError::InvalidWebhookSignature)
                }
                _ => AppError::bad_request("Malformed webhook payload"),
            }
        })?;

    let GatewayEvent::Settlement {
        reservation_number,
        status,
        payment_reference,
    } = event
    else {
        return Ok(Json(json!({ "received": true })));
    };

    match state
        .engine
        .settle_payment(&reservation_number, status, &payment_reference)
        .await
    {
        Ok(outcome) => Ok(Json(json!({ "received": true, "outcome": outcome.label() }))),
        Err(e) => {
            tracing::error!(
                reservation_number = %reservation_number,
                error = %e,
                "Settlement could not be recorded, asking gateway to redeliver"
            );
            Err(AppError::from(e))
        }
    }
}
