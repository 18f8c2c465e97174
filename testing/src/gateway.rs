//! Mock payment gateway.

use async_trait::async_trait;
use enrollment_core::gateway::PaymentGateway;
use enrollment_core::types::{CheckoutRequest, GatewayEvent, GatewayStatus, ReservationNumber};
use enrollment_core::{GatewayError, GatewayResult};
use serde::Deserialize;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Signature the mock accepts on webhook deliveries
pub const MOCK_WEBHOOK_SIGNATURE: &str = "mock-signature";

/// Webhook body understood by the mock:
/// `{"type": "...", "reservationNumber": "...", "paymentReference": "..."}`
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MockWebhook {
    #[serde(rename = "type")]
    event_type: String,
    reservation_number: Option<String>,
    payment_reference: Option<String>,
}

/// Payment gateway double.
///
/// Records every checkout and refund, can be told to fail the next N calls,
/// and can be slowed down to exercise timeouts.
#[derive(Default)]
pub struct MockPaymentGateway {
    checkouts: Mutex<Vec<CheckoutRequest>>,
    refunds: Mutex<Vec<String>>,
    refund_attempts: AtomicU32,
    checkout_failures: AtomicU32,
    refund_failures: AtomicU32,
    delay: Mutex<Option<Duration>>,
}

impl MockPaymentGateway {
    /// Gateway that succeeds at everything
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` checkout calls
    pub fn fail_next_checkouts(&self, n: u32) {
        self.checkout_failures.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` refund calls
    pub fn fail_next_refunds(&self, n: u32) {
        self.refund_failures.store(n, Ordering::SeqCst);
    }

    /// Sleep this long inside every async call
    pub fn set_delay(&self, delay: Option<Duration>) {
        if let Ok(mut guard) = self.delay.lock() {
            *guard = delay;
        }
    }

    /// Checkout requests received so far
    #[must_use]
    pub fn checkouts(&self) -> Vec<CheckoutRequest> {
        self.checkouts.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Payment references successfully refunded so far
    #[must_use]
    pub fn refunds(&self) -> Vec<String> {
        self.refunds.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Refund calls made so far, successful or not
    #[must_use]
    pub fn refund_attempts(&self) -> u32 {
        self.refund_attempts.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        let delay = self.delay.lock().ok().and_then(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> GatewayResult<String> {
        self.simulate_latency().await;

        if Self::take_failure(&self.checkout_failures) {
            return Err(GatewayError::Rejected {
                status: 503,
                message: "mock checkout failure".to_string(),
            });
        }

        if let Ok(mut checkouts) = self.checkouts.lock() {
            checkouts.push(request.clone());
        }

        let url = format!(
            "https://checkout.example.com/pay/{}",
            request.reservation_number
        );
        tracing::info!(
            reservation_number = %request.reservation_number,
            amount = request.amount.cents(),
            "Mock checkout session created"
        );
        Ok(url)
    }

    async fn refund(&self, payment_reference: &str) -> GatewayResult<()> {
        self.refund_attempts.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if Self::take_failure(&self.refund_failures) {
            return Err(GatewayError::Http("mock refund failure".to_string()));
        }

        if let Ok(mut refunds) = self.refunds.lock() {
            refunds.push(payment_reference.to_string());
        }
        tracing::info!(payment_reference, "Mock refund processed");
        Ok(())
    }

    fn parse_webhook(&self, payload: &[u8], signature: &str) -> GatewayResult<GatewayEvent> {
        if signature != MOCK_WEBHOOK_SIGNATURE {
            return Err(GatewayError::InvalidSignature(
                "signature mismatch".to_string(),
            ));
        }

        let webhook: MockWebhook = serde_json::from_slice(payload)
            .map_err(|e| GatewayError::MalformedPayload(e.to_string()))?;

        let status = match webhook.event_type.as_str() {
            "payment.confirmed" => GatewayStatus::Confirmed,
            "payment.failed" => GatewayStatus::Failed,
            "payment.canceled" => GatewayStatus::Canceled,
            other => {
                return Ok(GatewayEvent::Ignored {
                    event_type: other.to_string(),
                });
            }
        };

        let reservation_number = webhook
            .reservation_number
            .ok_or_else(|| {
                GatewayError::MalformedPayload("missing reservationNumber".to_string())
            })?;
        let payment_reference = webhook
            .payment_reference
            .ok_or_else(|| GatewayError::MalformedPayload("missing paymentReference".to_string()))?;

        Ok(GatewayEvent::Settlement {
            reservation_number: ReservationNumber::new(reservation_number),
            status,
            payment_reference,
        })
    }
}
