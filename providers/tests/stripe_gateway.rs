//! `StripeGateway` against a local stand-in for the Stripe API.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use axum::extract::{Form, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use enrollment_core::gateway::PaymentGateway;
use enrollment_core::types::{CheckoutRequest, GatewayEvent, GatewayStatus, Money, ReservationNumber};
use enrollment_core::GatewayError;
use enrollment_providers::{StripeConfig, StripeGateway, signature};
use enrollment_testing::{FixedClock, epoch};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Recorded = Arc<Mutex<Vec<(String, HashMap<String, String>)>>>;

async fn checkout(
    State(recorded): State<Recorded>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> (StatusCode, Json<serde_json::Value>) {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    recorded.lock().unwrap().push((auth, form));
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "id": "cs_test_1",
            "url": "https://checkout.stripe.test/c/pay/cs_test_1"
        })),
    )
}

async fn refund(Form(form): Form<HashMap<String, String>>) -> (StatusCode, Json<serde_json::Value>) {
    match form.get("payment_intent").map(String::as_str) {
        Some("pi_ok") => (StatusCode::OK, Json(serde_json::json!({ "id": "re_1" }))),
        Some("pi_slow") => {
            tokio::time::sleep(Duration::from_secs(2)).await;
            (StatusCode::OK, Json(serde_json::json!({ "id": "re_2" })))
        }
        _ => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": { "message": "No such payment_intent" } })),
        ),
    }
}

async fn start_fake_stripe() -> (String, Recorded) {
    let recorded = Recorded::default();
    let app = Router::new()
        .route("/v1/checkout/sessions", post(checkout))
        .route("/v1/refunds", post(refund))
        .with_state(Arc::clone(&recorded));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("fake stripe server");
    });

    (format!("http://{addr}"), recorded)
}

fn gateway(api_base: String) -> StripeGateway {
    StripeGateway::with_clock(
        StripeConfig {
            api_base,
            secret_key: "sk_test_123".to_string(),
            webhook_secret: "whsec_test".to_string(),
            request_timeout: Duration::from_millis(500),
            ..StripeConfig::default()
        },
        Arc::new(FixedClock::new(epoch())),
    )
    .unwrap()
}

#[tokio::test]
async fn checkout_session_posts_form_with_bearer_auth() {
    let (base, recorded) = start_fake_stripe().await;
    let gateway = gateway(base);

    let url = gateway
        .create_checkout_session(&CheckoutRequest {
            reservation_number: ReservationNumber::new("20250101120000-ABCDEFGH"),
            email: "ada@example.com".to_string(),
            title: "Rust Workshop".to_string(),
            amount: Money::from_cents(2599),
            image_url: None,
        })
        .await
        .unwrap();

    assert_eq!(url, "https://checkout.stripe.test/c/pay/cs_test_1");
    let recorded = recorded.lock().unwrap();
    let (auth, form) = &recorded[0];
    assert_eq!(auth, "Bearer sk_test_123");
    assert_eq!(form["client_reference_id"], "20250101120000-ABCDEFGH");
    assert_eq!(form["customer_email"], "ada@example.com");
    assert_eq!(form["line_items[0][price_data][unit_amount]"], "2599");
    assert_eq!(form["line_items[0][price_data][currency]"], "usd");
}

#[tokio::test]
async fn refund_success_and_rejection() {
    let (base, _) = start_fake_stripe().await;
    let gateway = gateway(base);

    gateway.refund("pi_ok").await.unwrap();

    let err = gateway.refund("pi_missing").await.unwrap_err();
    assert_eq!(
        err,
        GatewayError::Rejected {
            status: 400,
            message: "No such payment_intent".to_string()
        }
    );
}

#[tokio::test]
async fn slow_gateway_times_out() {
    let (base, _) = start_fake_stripe().await;
    let gateway = gateway(base);

    assert!(matches!(
        gateway.refund("pi_slow").await,
        Err(GatewayError::Timeout(_))
    ));
}

#[tokio::test]
async fn unreachable_gateway_is_an_http_error() {
    let gateway = gateway("http://127.0.0.1:9".to_string());
    assert!(matches!(
        gateway.refund("pi_ok").await,
        Err(GatewayError::Http(_) | GatewayError::Timeout(_))
    ));
}

#[test]
fn webhook_is_verified_then_parsed() {
    let gateway = gateway("http://unused".to_string());
    let payload = serde_json::json!({
        "type": "checkout.session.completed",
        "data": { "object": {
            "id": "cs_test_1",
            "client_reference_id": "20250101120000-ABCDEFGH",
            "payment_intent": "pi_123",
            "payment_status": "paid"
        }}
    })
    .to_string();
    let header = signature::header("whsec_test", epoch().timestamp(), payload.as_bytes()).unwrap();

    assert_eq!(
        gateway.parse_webhook(payload.as_bytes(), &header).unwrap(),
        GatewayEvent::Settlement {
            reservation_number: ReservationNumber::new("20250101120000-ABCDEFGH"),
            status: GatewayStatus::Confirmed,
            payment_reference: "pi_123".to_string(),
        }
    );

    assert!(matches!(
        gateway.parse_webhook(payload.as_bytes(), "t=1,v1=00"),
        Err(GatewayError::InvalidSignature(_))
    ));
}

#[test]
fn unconfigured_webhook_secret_rejects_every_signature() {
    let clock = Arc::new(FixedClock::new(epoch()));
    let gateway = StripeGateway::with_clock(StripeConfig::default(), clock).unwrap();
    let payload = serde_json::json!({
        "type": "checkout.session.completed",
        "data": { "object": {
            "id": "cs_test_1",
            "client_reference_id": "20250101000000-ABCDEFGH",
            "payment_intent": "pi_forged",
            "payment_status": "paid"
        }}
    })
    .to_string();
    let forged = format!(
        "t={},v1={}",
        epoch().timestamp(),
        signature::compute("guess", epoch().timestamp(), payload.as_bytes()).unwrap()
    );

    assert!(matches!(
        gateway.parse_webhook(payload.as_bytes(), &forged),
        Err(GatewayError::InvalidSignature(_))
    ));
}
