//! Custom Axum extractors.

use crate::error::AppError;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

/// Header carrying the gateway's webhook signature.
pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

/// The raw webhook signature header.
///
/// Rejects with `400 Bad Request` when the header is missing or not ASCII.
#[derive(Debug, Clone)]
pub struct WebhookSignature(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for WebhookSignature
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| Self(s.to_string()))
            .ok_or_else(|| {
                AppError::new(
                    axum::http::StatusCode::BAD_REQUEST,
                    format!("Missing {SIGNATURE_HEADER} header"),
                    "INVALID_SIGNATURE",
                )
            })
    }
}
