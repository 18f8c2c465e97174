//! Payment gateway port.

use crate::error::GatewayResult;
use crate::types::{CheckoutRequest, GatewayEvent};
use async_trait::async_trait;

/// Narrow adapter over the external payment gateway.
///
/// Implementations talk to the gateway's HTTP API; the engine bounds every
/// async call with its own timeout, so implementations need not.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a hosted checkout session and return its URL.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`](crate::error::GatewayError) if the gateway
    /// call fails.
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> GatewayResult<String>;

    /// Refund the full charge behind `payment_reference`.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`](crate::error::GatewayError) if the refund is
    /// not accepted.
    async fn refund(&self, payment_reference: &str) -> GatewayResult<()>;

    /// Verify a webhook delivery and parse it.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidSignature`](crate::error::GatewayError::InvalidSignature)
    /// when the signature does not verify, or
    /// [`GatewayError::MalformedPayload`](crate::error::GatewayError::MalformedPayload)
    /// when an authentic payload cannot be parsed.
    fn parse_webhook(&self, payload: &[u8], signature: &str) -> GatewayResult<GatewayEvent>;
}
