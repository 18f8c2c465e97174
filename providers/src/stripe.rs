//! Stripe Checkout gateway.

use crate::signature;
use async_trait::async_trait;
use enrollment_core::environment::{Clock, SystemClock};
use enrollment_core::gateway::PaymentGateway;
use enrollment_core::types::{CheckoutRequest, GatewayEvent, GatewayStatus, ReservationNumber};
use enrollment_core::{GatewayError, GatewayResult};
use reqwest::{Client, Response};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Stripe account and checkout settings
#[derive(Clone, Debug)]
pub struct StripeConfig {
    /// API base URL
    pub api_base: String,
    /// Secret API key (`sk_...`)
    pub secret_key: String,
    /// Webhook signing secret (`whsec_...`)
    pub webhook_secret: String,
    /// Where checkout redirects after payment
    pub success_url: String,
    /// Where checkout redirects when the payer backs out
    pub cancel_url: String,
    /// ISO currency code
    pub currency: String,
    /// Maximum age of a webhook signature
    pub webhook_tolerance: Duration,
    /// Per-request HTTP timeout
    pub request_timeout: Duration,
}

impl Default for StripeConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.stripe.com".to_string(),
            secret_key: String::new(),
            webhook_secret: String::new(),
            success_url: "http://localhost:8080/enrollment/success".to_string(),
            cancel_url: "http://localhost:8080/enrollment/cancel".to_string(),
            currency: "usd".to_string(),
            webhook_tolerance: Duration::from_secs(300),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// [`PaymentGateway`] backed by Stripe Checkout and the Refunds API.
#[derive(Clone)]
pub struct StripeGateway {
    client: Client,
    config: StripeConfig,
    clock: Arc<dyn Clock>,
}

#[derive(Deserialize)]
struct CheckoutSession {
    url: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    message: Option<String>,
}

#[derive(Deserialize)]
struct WebhookEnvelope {
    #[serde(rename = "type")]
    event_type: String,
    data: WebhookData,
}

#[derive(Deserialize)]
struct WebhookData {
    object: SessionObject,
}

#[derive(Deserialize)]
struct SessionObject {
    id: String,
    client_reference_id: Option<String>,
    payment_intent: Option<String>,
    payment_status: Option<String>,
}

impl StripeGateway {
    /// Build a gateway using the system clock for signature freshness.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Http`] if the HTTP client cannot be built.
    pub fn new(config: StripeConfig) -> GatewayResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build a gateway with an explicit clock.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Http`] if the HTTP client cannot be built.
    pub fn with_clock(config: StripeConfig, clock: Arc<dyn Clock>) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| GatewayError::Http(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            clock,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v1/{path}", self.config.api_base.trim_end_matches('/'))
    }

    async fn post_form(&self, path: &str, form: &[(String, String)]) -> GatewayResult<Response> {
        let response = self
            .client
            .post(self.endpoint(path))
            .bearer_auth(&self.config.secret_key)
            .form(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout(self.config.request_timeout)
                } else {
                    GatewayError::Http(e.to_string())
                }
            })?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .ok()
            .and_then(|b| b.error.message)
            .unwrap_or(body);
        Err(GatewayError::Rejected { status, message })
    }

    fn checkout_form(&self, request: &CheckoutRequest) -> Vec<(String, String)> {
        let mut form = vec![
            ("mode".to_string(), "payment".to_string()),
            (
                "client_reference_id".to_string(),
                request.reservation_number.to_string(),
            ),
            ("customer_email".to_string(), request.email.clone()),
            (
                "success_url".to_string(),
                format!(
                    "{}?reservationNumber={}",
                    self.config.success_url, request.reservation_number
                ),
            ),
            ("cancel_url".to_string(), self.config.cancel_url.clone()),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            (
                "line_items[0][price_data][currency]".to_string(),
                self.config.currency.clone(),
            ),
            (
                "line_items[0][price_data][unit_amount]".to_string(),
                request.amount.cents().to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]".to_string(),
                request.title.clone(),
            ),
            (
                "metadata[reservation_number]".to_string(),
                request.reservation_number.to_string(),
            ),
        ];
        if let Some(image) = &request.image_url {
            form.push((
                "line_items[0][price_data][product_data][images][0]".to_string(),
                image.clone(),
            ));
        }
        form
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> GatewayResult<String> {
        let response = self
            .post_form("checkout/sessions", &self.checkout_form(request))
            .await?;

        let session: CheckoutSession = response
            .json()
            .await
            .map_err(|e| GatewayError::Http(format!("Invalid checkout session response: {e}")))?;

        let url = session.url.ok_or_else(|| {
            GatewayError::Http("Checkout session response carried no url".to_string())
        })?;

        tracing::debug!(
            reservation_number = %request.reservation_number,
            "Created checkout session"
        );
        Ok(url)
    }

    async fn refund(&self, payment_reference: &str) -> GatewayResult<()> {
        let form = [("payment_intent".to_string(), payment_reference.to_string())];
        self.post_form("refunds", &form).await?;

        tracing::info!(payment_reference, "Refund issued");
        Ok(())
    }

    fn parse_webhook(&self, payload: &[u8], signature: &str) -> GatewayResult<GatewayEvent> {
        signature::verify(
            signature,
            payload,
            &self.config.webhook_secret,
            self.clock.now(),
            self.config.webhook_tolerance,
        )?;

        parse_event(payload)
    }
}

fn parse_event(payload: &[u8]) -> GatewayResult<GatewayEvent> {
    let envelope: WebhookEnvelope = serde_json::from_slice(payload)
        .map_err(|e| GatewayError::MalformedPayload(e.to_string()))?;

    // A completed session paid by an async method (bank debit, vouchers) is
    // still `unpaid`; its outcome arrives as `async_payment_succeeded`/`failed`.
    let session_paid = envelope.data.object.payment_status.as_deref() == Some("paid");
    let status = match envelope.event_type.as_str() {
        "checkout.session.completed" if session_paid => GatewayStatus::Confirmed,
        "checkout.session.async_payment_succeeded" => GatewayStatus::Confirmed,
        "checkout.session.async_payment_failed" => GatewayStatus::Failed,
        "checkout.session.expired" => GatewayStatus::Canceled,
        _ => {
            return Ok(GatewayEvent::Ignored {
                event_type: envelope.event_type,
            });
        }
    };

    let session = envelope.data.object;
    let reservation_number = session.client_reference_id.ok_or_else(|| {
        GatewayError::MalformedPayload("checkout session without client_reference_id".to_string())
    })?;

    Ok(GatewayEvent::Settlement {
        reservation_number: ReservationNumber::new(reservation_number),
        status,
        payment_reference: session.payment_intent.unwrap_or(session.id),
    })
}
