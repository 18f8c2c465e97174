//! Integration tests for reservation creation and payment settlement.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

mod common;

use common::Harness;
use enrollment_core::EnrollmentError;
use enrollment_core::store::InventoryStore;
use enrollment_core::types::{
    EventId, GatewayStatus, NotificationTemplate, OutboxPayload, OutboxStatus, PaymentStatus,
    ReservationNumber,
};
use enrollment_runtime::{EngineConfig, IgnoreReason, OutboxConfig, SettlementOutcome};
use enrollment_testing::fixtures::{free_event, paid_event};
use std::time::Duration;

// ============================================================================
// Free path
// ============================================================================

#[tokio::test]
async fn free_enrollment_confirms_immediately() {
    let h = Harness::new();
    let event = h.seed(free_event(10)).await;

    let receipt = h
        .engine
        .create_reservation(event.id, "  Ada@Example.com ", "Ada", "Lovelace")
        .await
        .unwrap();

    assert_eq!(receipt.status, PaymentStatus::Confirmed);
    assert_eq!(receipt.email, "ada@example.com");
    assert!(receipt.checkout_url.is_none());
    assert_eq!(h.slots(&event).await, 9);

    let stored = h.store.reservation(&receipt.reservation_number).await.unwrap();
    assert_eq!(stored.payment_status, PaymentStatus::Confirmed);

    let sent = h.sender.sent_with(NotificationTemplate::EnrollmentConfirmed);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient, "ada@example.com");
    assert_eq!(
        sent[0].model["reservationNumber"],
        receipt.reservation_number.as_str()
    );
}

#[tokio::test]
async fn concurrent_free_enrollments_never_oversell() {
    let h = Harness::new();
    let event = h.seed(free_event(3)).await;
    let event_id = event.id;

    let tasks: Vec<_> = (0..25)
        .map(|i| {
            let engine = h.engine.clone();
            tokio::spawn(async move {
                engine
                    .create_reservation(event_id, &format!("user{i}@example.com"), "User", "Number")
                    .await
            })
        })
        .collect();

    let mut confirmed = 0;
    let mut sold_out = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(receipt) => {
                assert_eq!(receipt.status, PaymentStatus::Confirmed);
                confirmed += 1;
            }
            Err(EnrollmentError::EventSoldOut(_)) => sold_out += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(confirmed, 3);
    assert_eq!(sold_out, 22);
    assert_eq!(h.slots(&event).await, 0);

    let confirmed_rows = h
        .store
        .reservations_for(event.id)
        .await
        .into_iter()
        .filter(|r| r.payment_status == PaymentStatus::Confirmed)
        .count();
    assert_eq!(confirmed_rows, 3);
}

#[tokio::test]
async fn second_enrollment_with_same_email_is_duplicate() {
    let h = Harness::new();
    let event = h.seed(free_event(10)).await;

    h.engine
        .create_reservation(event.id, "grace@example.com", "Grace", "Hopper")
        .await
        .unwrap();
    let err = h
        .engine
        .create_reservation(event.id, "GRACE@example.com", "Grace", "Hopper")
        .await
        .unwrap_err();

    assert!(matches!(err, EnrollmentError::DuplicateResource(_)));
    assert_eq!(h.slots(&event).await, 9);
}

#[tokio::test]
async fn sold_out_event_is_rejected_before_any_write() {
    let h = Harness::new();
    let event = h.seed(free_event(0)).await;

    let err = h
        .engine
        .create_reservation(event.id, "late@example.com", "Late", "Comer")
        .await
        .unwrap_err();

    assert!(matches!(err, EnrollmentError::EventSoldOut(_)));
    assert!(h.store.reservations_for(event.id).await.is_empty());
}

#[tokio::test]
async fn unknown_event_is_not_found() {
    let h = Harness::new();

    let err = h
        .engine
        .create_reservation(EventId::new(), "a@example.com", "A", "B")
        .await
        .unwrap_err();

    assert!(matches!(err, EnrollmentError::NotFound { resource: "Event", .. }));
}

#[tokio::test]
async fn invalid_input_is_rejected() {
    let h = Harness::new();
    let event = h.seed(free_event(1)).await;

    let err = h
        .engine
        .create_reservation(event.id, "not-an-email", "A", "B")
        .await
        .unwrap_err();

    assert!(matches!(err, EnrollmentError::Validation(_)));
    assert_eq!(h.slots(&event).await, 1);
}

#[tokio::test]
async fn failed_insert_gives_the_slot_back() {
    let h = Harness::new();
    let event = h.seed(free_event(2)).await;
    h.store.fail_reservation_inserts(true);

    let err = h
        .engine
        .create_reservation(event.id, "a@example.com", "A", "B")
        .await
        .unwrap_err();

    assert!(matches!(err, EnrollmentError::Store(_)));
    assert_eq!(h.slots(&event).await, 2);
    assert!(h.sender.sent().is_empty());
}

#[tokio::test]
async fn notification_failure_does_not_fail_enrollment() {
    let h = Harness::new();
    let event = h.seed(free_event(5)).await;
    h.sender.fail_next(1);

    let receipt = h
        .engine
        .create_reservation(event.id, "a@example.com", "A", "B")
        .await
        .unwrap();
    assert_eq!(receipt.status, PaymentStatus::Confirmed);

    let entries = h.store.outbox_entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, OutboxStatus::Failed);
    assert_eq!(entries[0].retry_attempts, 1);
    assert!(matches!(entries[0].payload, OutboxPayload::Notification(_)));
}

// ============================================================================
// Paid path
// ============================================================================

#[tokio::test]
async fn paid_enrollment_returns_checkout_url_without_taking_a_slot() {
    let h = Harness::new();
    let event = h.seed(paid_event(5, 2500)).await;

    let receipt = h
        .engine
        .create_reservation(event.id, "a@example.com", "A", "B")
        .await
        .unwrap();

    assert_eq!(receipt.status, PaymentStatus::PendingPayment);
    assert!(receipt.checkout_url.unwrap().contains(receipt.reservation_number.as_str()));
    assert_eq!(h.slots(&event).await, 5);

    let checkouts = h.gateway.checkouts();
    assert_eq!(checkouts.len(), 1);
    assert_eq!(checkouts[0].amount.cents(), 2500);
    assert_eq!(checkouts[0].title, event.title);
    assert!(h.sender.sent().is_empty());
}

#[tokio::test]
async fn checkout_failure_marks_reservation_failed() {
    let h = Harness::new();
    let event = h.seed(paid_event(5, 2500)).await;
    h.gateway.fail_next_checkouts(1);

    let err = h
        .engine
        .create_reservation(event.id, "a@example.com", "A", "B")
        .await
        .unwrap_err();
    assert!(matches!(err, EnrollmentError::ExternalServiceFailure(_)));

    let rows = h.store.reservations_for(event.id).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].payment_status, PaymentStatus::Failed);
    assert_eq!(h.slots(&event).await, 5);
}

#[tokio::test]
async fn slow_checkout_times_out() {
    let h = Harness::with_config(
        EngineConfig {
            gateway_timeout: Duration::from_millis(50),
            ..EngineConfig::default()
        },
        OutboxConfig::default(),
    );
    let event = h.seed(paid_event(5, 2500)).await;
    h.gateway.set_delay(Some(Duration::from_millis(500)));

    let err = h
        .engine
        .create_reservation(event.id, "a@example.com", "A", "B")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        EnrollmentError::ExternalServiceFailure(enrollment_core::GatewayError::Timeout(_))
    ));
}

// ============================================================================
// Settlement
// ============================================================================

#[tokio::test]
async fn confirmed_webhook_takes_slot_and_notifies() {
    let h = Harness::new();
    let event = h.seed(paid_event(5, 2500)).await;
    let number = h.pending(&event, "a@example.com").await;

    let outcome = h.settle(&number, GatewayStatus::Confirmed, "pi_1").await;

    assert_eq!(outcome, SettlementOutcome::Confirmed);
    assert_eq!(h.slots(&event).await, 4);
    let stored = h.store.reservation(&number).await.unwrap();
    assert_eq!(stored.payment_status, PaymentStatus::Confirmed);
    assert_eq!(stored.payment_reference.as_deref(), Some("pi_1"));
    assert_eq!(h.sender.sent_with(NotificationTemplate::EnrollmentConfirmed).len(), 1);
}

#[tokio::test]
async fn duplicate_webhook_is_idempotent() {
    let h = Harness::new();
    let event = h.seed(paid_event(5, 2500)).await;
    let number = h.pending(&event, "a@example.com").await;

    h.settle(&number, GatewayStatus::Confirmed, "pi_1").await;
    let replay = h.settle(&number, GatewayStatus::Confirmed, "pi_1").await;

    assert_eq!(
        replay,
        SettlementOutcome::Ignored(IgnoreReason::AlreadySettled(PaymentStatus::Confirmed))
    );
    assert_eq!(h.slots(&event).await, 4);
    assert_eq!(h.sender.sent_with(NotificationTemplate::EnrollmentConfirmed).len(), 1);
}

#[tokio::test]
async fn concurrent_duplicate_webhooks_confirm_once() {
    let h = Harness::new();
    let event = h.seed(paid_event(5, 2500)).await;
    let number = h.pending(&event, "a@example.com").await;

    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let engine = h.engine.clone();
            let number = number.clone();
            tokio::spawn(async move {
                engine
                    .settle_payment(&number, GatewayStatus::Confirmed, "pi_1")
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut confirmed = 0;
    for task in tasks {
        match task.await.unwrap() {
            SettlementOutcome::Confirmed => confirmed += 1,
            SettlementOutcome::Ignored(_) => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    assert_eq!(confirmed, 1);
    assert_eq!(h.slots(&event).await, 4);
    assert_eq!(h.sender.sent_with(NotificationTemplate::EnrollmentConfirmed).len(), 1);
    assert_eq!(h.gateway.refund_attempts(), 0);
}

#[tokio::test]
async fn payment_after_sell_out_is_refunded() {
    let h = Harness::new();
    let event = h.seed(paid_event(1, 2500)).await;
    let first = h.pending(&event, "first@example.com").await;
    let second = h.pending(&event, "second@example.com").await;

    assert_eq!(
        h.settle(&first, GatewayStatus::Confirmed, "pi_first").await,
        SettlementOutcome::Confirmed
    );
    let outcome = h.settle(&second, GatewayStatus::Confirmed, "pi_second").await;

    assert_eq!(outcome, SettlementOutcome::Refunded { refund_issued: true });
    assert_eq!(h.slots(&event).await, 0);
    assert_eq!(h.gateway.refunds(), vec!["pi_second".to_string()]);

    let refunded = h.store.reservation(&second).await.unwrap();
    assert_eq!(refunded.payment_status, PaymentStatus::Refunded);
    assert_eq!(refunded.payment_reference.as_deref(), Some("pi_second"));

    let refund_mails = h.sender.sent_with(NotificationTemplate::EnrollmentRefunded);
    assert_eq!(refund_mails.len(), 1);
    assert_eq!(refund_mails[0].recipient, "second@example.com");

    // Replaying the compensated webhook does not refund twice.
    h.settle(&second, GatewayStatus::Confirmed, "pi_second").await;
    assert_eq!(h.gateway.refund_attempts(), 1);
}

#[tokio::test]
async fn free_enrollment_racing_a_payment_never_exceeds_capacity() {
    let h = Harness::new();
    let event = h.seed(paid_event(1, 2500)).await;
    let number = h.pending(&event, "payer@example.com").await;

    // Another attendee takes the last slot before the webhook lands.
    assert_eq!(h.store.decrement_if_available(event.id).await.unwrap(), 1);

    let outcome = h.settle(&number, GatewayStatus::Confirmed, "pi_late").await;

    assert_eq!(outcome, SettlementOutcome::Refunded { refund_issued: true });
    assert_eq!(h.slots(&event).await, 0);
    assert_eq!(h.gateway.refund_attempts(), 1);
}

#[tokio::test]
async fn failed_refund_is_queued_and_retried() {
    let h = Harness::new();
    let event = h.seed(paid_event(1, 2500)).await;
    let number = h.pending(&event, "a@example.com").await;
    h.store.decrement_if_available(event.id).await.unwrap();
    h.gateway.fail_next_refunds(1);

    let outcome = h.settle(&number, GatewayStatus::Confirmed, "pi_1").await;
    assert_eq!(outcome, SettlementOutcome::Refunded { refund_issued: false });

    let entries = h.store.outbox_entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(
        entries[0].payload,
        OutboxPayload::Refund {
            reservation_number: number.clone(),
            payment_reference: "pi_1".to_string(),
        }
    );
    assert_eq!(entries[0].status, OutboxStatus::Failed);

    h.clock.advance(chrono::Duration::minutes(1));
    let report = h.outbox.process_due().await.unwrap();

    assert_eq!(report.sent, 1);
    assert_eq!(h.gateway.refunds(), vec!["pi_1".to_string()]);
    let entry = h.store.outbox_entries().await.remove(0);
    assert_eq!(entry.status, OutboxStatus::Sent);
}

#[tokio::test]
async fn attendee_paying_twice_is_refunded_for_the_second_charge() {
    let h = Harness::new();
    let event = h.seed(paid_event(5, 2500)).await;
    let first = h.pending(&event, "twice@example.com").await;
    let second = h.pending(&event, "twice@example.com").await;

    h.settle(&first, GatewayStatus::Confirmed, "pi_a").await;
    let outcome = h.settle(&second, GatewayStatus::Confirmed, "pi_b").await;

    assert_eq!(outcome, SettlementOutcome::Refunded { refund_issued: true });
    assert_eq!(h.slots(&event).await, 4);
    assert_eq!(h.gateway.refunds(), vec!["pi_b".to_string()]);
}

#[tokio::test]
async fn failed_and_canceled_webhooks_close_the_reservation() {
    let h = Harness::new();
    let event = h.seed(paid_event(5, 2500)).await;
    let failed = h.pending(&event, "a@example.com").await;
    let canceled = h.pending(&event, "b@example.com").await;

    assert_eq!(
        h.settle(&failed, GatewayStatus::Failed, "pi_f").await,
        SettlementOutcome::MarkedFailed
    );
    assert_eq!(
        h.settle(&canceled, GatewayStatus::Canceled, "cs_c").await,
        SettlementOutcome::MarkedCanceled
    );

    assert_eq!(
        h.store.reservation(&failed).await.unwrap().payment_status,
        PaymentStatus::Failed
    );
    assert_eq!(
        h.store.reservation(&canceled).await.unwrap().payment_status,
        PaymentStatus::Canceled
    );
    assert_eq!(h.slots(&event).await, 5);
    assert!(h.sender.sent().is_empty());

    // A late confirmation for a closed reservation is ignored.
    assert_eq!(
        h.settle(&failed, GatewayStatus::Confirmed, "pi_f").await,
        SettlementOutcome::Ignored(IgnoreReason::AlreadySettled(PaymentStatus::Failed))
    );
    assert_eq!(h.slots(&event).await, 5);
}

#[tokio::test]
async fn webhook_for_unknown_reservation_is_ignored() {
    let h = Harness::new();

    let outcome = h
        .settle(
            &ReservationNumber::new("20250101000000-NOPE2345"),
            GatewayStatus::Confirmed,
            "pi_x",
        )
        .await;

    assert_eq!(outcome, SettlementOutcome::Ignored(IgnoreReason::UnknownReservation));
}

#[tokio::test]
async fn find_reservation_reports_missing_numbers() {
    let h = Harness::new();
    let event = h.seed(paid_event(5, 2500)).await;
    let number = h.pending(&event, "a@example.com").await;

    let found = h.engine.find_reservation(&number).await.unwrap();
    assert_eq!(found.payment_status, PaymentStatus::PendingPayment);

    let err = h
        .engine
        .find_reservation(&ReservationNumber::new("missing"))
        .await
        .unwrap_err();
    assert!(matches!(err, EnrollmentError::NotFound { resource: "Reservation", .. }));
}
